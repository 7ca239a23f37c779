//! Error types for Packweight

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("actor not found: {0}")]
    UnknownActor(String),

    #[error("actor already joined: {0}")]
    ActorExists(String),

    #[error("actor worker closed: {0}")]
    ActorClosed(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unknown_actor(actor: impl std::fmt::Display) -> Self {
        Self::UnknownActor(actor.to_string())
    }

    pub fn actor_closed(actor: impl std::fmt::Display) -> Self {
        Self::ActorClosed(actor.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
