//! Packweight Core - inventory model, collaborator traits, config, and sync protocol

pub mod catalog;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use catalog::*;
pub use config::*;
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;
