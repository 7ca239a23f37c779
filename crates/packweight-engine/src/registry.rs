//! Registry of live actors: id → queue sender and teardown handles.

use crate::actor::ActorEvent;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use packweight_core::{ActorId, Error, Result, SharedInventory};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct ActorHandle {
    pub tx: mpsc::UnboundedSender<ActorEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
    pub inventory: SharedInventory,
}

/// Touched on join/leave and for sender lookup; per-mutation work happens
/// on the actor's own task.
pub(crate) struct ActorRegistry {
    actors: DashMap<ActorId, ActorHandle>,
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self {
            actors: DashMap::new(),
        }
    }

    /// Insert a handle built by `make`. `make` only runs if the id is free.
    pub fn insert_with(&self, id: &ActorId, make: impl FnOnce() -> ActorHandle) -> Result<()> {
        match self.actors.entry(id.clone()) {
            Entry::Occupied(_) => Err(Error::ActorExists(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(make());
                Ok(())
            }
        }
    }

    pub fn remove(&self, id: &ActorId) -> Option<ActorHandle> {
        self.actors.remove(id).map(|(_, handle)| handle)
    }

    pub fn sender(&self, id: &ActorId) -> Option<mpsc::UnboundedSender<ActorEvent>> {
        self.actors.get(id).map(|h| h.tx.clone())
    }

    pub fn inventory(&self, id: &ActorId) -> Option<SharedInventory> {
        self.actors.get(id).map(|h| h.inventory.clone())
    }

    pub fn senders(&self) -> Vec<(ActorId, mpsc::UnboundedSender<ActorEvent>)> {
        self.actors
            .iter()
            .map(|e| (e.key().clone(), e.tx.clone()))
            .collect()
    }

    pub fn list(&self) -> Vec<ActorId> {
        self.actors.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.actors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Remove every handle.
    pub fn drain(&self) -> Vec<(ActorId, ActorHandle)> {
        let ids = self.list();
        ids.into_iter()
            .filter_map(|id| self.actors.remove(&id))
            .collect()
    }
}
