//! Rate-limited publishing of per-actor outputs to the sync boundary.

use packweight_core::{
    ActorId, EncumbranceConfig, SyncConfig, SyncEvent, SyncKey, MOVEMENT_MODIFIER_ID,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Values produced by one recompute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outputs {
    pub raw_mass: f64,
    pub effective_mass: f64,
    pub multiplier: f64,
    pub start_mass: f64,
    pub cap_mass: f64,
    pub trait_modifiers: usize,
}

impl Outputs {
    /// Outputs for a disabled system: no mass, no penalty.
    pub fn neutral(curve: &EncumbranceConfig) -> Self {
        Self {
            raw_mass: 0.0,
            effective_mass: 0.0,
            multiplier: 1.0,
            start_mass: curve.start_mass,
            cap_mass: curve.cap_mass,
            trait_modifiers: 0,
        }
    }

    pub fn encumbrance_fraction(&self) -> f64 {
        (1.0 - self.multiplier).clamp(0.0, 1.0)
    }

    pub fn value(&self, key: SyncKey) -> f64 {
        match key {
            SyncKey::RawMass => self.raw_mass,
            SyncKey::EffectiveMass => self.effective_mass,
            SyncKey::EncumbranceFraction => self.encumbrance_fraction(),
            SyncKey::MovementMultiplier => self.multiplier,
            SyncKey::StartMass => self.start_mass,
            SyncKey::CapMass => self.cap_mass,
            SyncKey::TraitModifierCount => self.trait_modifiers as f64,
        }
    }
}

/// Result of one publish pass.
#[derive(Debug, Default)]
pub struct PublishResult {
    pub events: Vec<SyncEvent>,
    /// Set when a changed dynamic value was held back; publish again after this long.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
struct Published {
    value: f64,
    at: Instant,
}

/// Tracks what was last published for one actor.
#[derive(Debug)]
pub struct Publisher {
    sync: SyncConfig,
    last: HashMap<SyncKey, Published>,
}

impl Publisher {
    pub fn new(sync: SyncConfig) -> Self {
        Self {
            sync,
            last: HashMap::new(),
        }
    }

    pub fn set_sync(&mut self, sync: SyncConfig) {
        self.sync = sync;
    }

    /// Forget everything published, so the next pass publishes every key.
    pub fn reset(&mut self) {
        self.last.clear();
    }

    pub fn last_value(&self, key: SyncKey) -> Option<f64> {
        self.last.get(&key).map(|p| p.value)
    }

    fn epsilon(&self, key: SyncKey) -> f64 {
        match key {
            SyncKey::RawMass | SyncKey::EffectiveMass => self.sync.mass_epsilon,
            _ => self.sync.fraction_epsilon,
        }
    }

    pub fn publish(&mut self, actor: &ActorId, outputs: &Outputs, now: Instant) -> PublishResult {
        let min_interval = Duration::from_millis(self.sync.min_interval_ms);
        let mut result = PublishResult::default();

        for key in SyncKey::ALL {
            let value = outputs.value(key);
            let send = match self.last.get(&key) {
                None => true,
                Some(prev) if prev.value == value => false,
                Some(_) if key.is_static() => true,
                Some(prev) => {
                    let elapsed = now.saturating_duration_since(prev.at);
                    if (value - prev.value).abs() > self.epsilon(key) || elapsed >= min_interval {
                        true
                    } else {
                        let wait = min_interval - elapsed;
                        result.retry_after =
                            Some(result.retry_after.map_or(wait, |r: Duration| r.min(wait)));
                        false
                    }
                }
            };

            if !send {
                continue;
            }
            self.last.insert(key, Published { value, at: now });
            result.events.push(SyncEvent::Value {
                actor: actor.clone(),
                key,
                value,
            });
            if key == SyncKey::MovementMultiplier {
                result.events.push(SyncEvent::MovementModifier {
                    actor: actor.clone(),
                    id: MOVEMENT_MODIFIER_ID.to_string(),
                    value: value - 1.0,
                });
            }
        }

        result
    }
}
