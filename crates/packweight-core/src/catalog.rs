//! Collaborator traits: the item catalog and the actor stat system.

use crate::types::ActorId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static attributes the host declares for an item code.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemInfo {
    /// Declared per-unit mass; wins over every configured rule.
    pub mass: Option<f64>,
    /// Load-reduction multiplier when this item is equipped as a bag.
    pub bag_effectiveness: Option<f64>,
    /// Liquid units per unit of volume (and therefore per unit of mass).
    pub units_per_volume: Option<f64>,
    /// Item class used by the class fallback table (e.g. "tool", "block").
    pub class: Option<String>,
}

/// Item catalog lookup, implemented by the host.
pub trait ItemCatalog: Send + Sync {
    fn lookup(&self, code: &str) -> Option<ItemInfo>;
}

/// In-memory catalog, used by the CLI scenarios and tests.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog {
    items: HashMap<String, ItemInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, info: ItemInfo) -> &mut Self {
        self.items.insert(code.into(), info);
        self
    }

    pub fn with(mut self, code: impl Into<String>, info: ItemInfo) -> Self {
        self.insert(code, info);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ItemCatalog for StaticCatalog {
    fn lookup(&self, code: &str) -> Option<ItemInfo> {
        self.items.get(code).cloned()
    }
}

/// Actor stat system. `blended` returns the stat's multiplicative blend;
/// 1.0 means the stat has no effect.
pub trait StatSource: Send + Sync {
    fn blended(&self, actor: &ActorId, key: &str) -> f64;
}

/// A stat source where nothing has an effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStats;

impl StatSource for NoStats {
    fn blended(&self, _actor: &ActorId, _key: &str) -> f64 {
        1.0
    }
}

/// Mutable per-actor stat table. Safe to update while actors are running;
/// call `WeightManager::notify_stats_changed` afterwards.
#[derive(Debug, Default)]
pub struct StaticStats {
    values: DashMap<(ActorId, String), f64>,
}

impl StaticStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, actor: &ActorId, key: impl Into<String>, blend: f64) {
        self.values.insert((actor.clone(), key.into()), blend);
    }

    pub fn clear(&self, actor: &ActorId, key: &str) {
        self.values.remove(&(actor.clone(), key.to_string()));
    }
}

impl StatSource for StaticStats {
    fn blended(&self, actor: &ActorId, key: &str) -> f64 {
        self.values
            .get(&(actor.clone(), key.to_string()))
            .map(|v| *v)
            .unwrap_or(1.0)
    }
}
