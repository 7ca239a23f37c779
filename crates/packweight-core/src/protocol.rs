//! Sync protocol: values published for the presentation layer

use crate::types::ActorId;
use serde::{Deserialize, Serialize};

/// Identifier of the movement-speed modifier written for every actor.
pub const MOVEMENT_MODIFIER_ID: &str = "packweight:encumbrance";

/// Published keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKey {
    RawMass,
    EffectiveMass,
    /// `1 - multiplier`, clamped to [0, 1].
    EncumbranceFraction,
    MovementMultiplier,
    StartMass,
    CapMass,
    TraitModifierCount,
}

impl SyncKey {
    pub const ALL: [SyncKey; 7] = [
        SyncKey::RawMass,
        SyncKey::EffectiveMass,
        SyncKey::EncumbranceFraction,
        SyncKey::MovementMultiplier,
        SyncKey::StartMass,
        SyncKey::CapMass,
        SyncKey::TraitModifierCount,
    ];

    /// Static keys change rarely and are always published immediately.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            SyncKey::StartMass | SyncKey::CapMass | SyncKey::TraitModifierCount
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncKey::RawMass => "packweight:rawMass",
            SyncKey::EffectiveMass => "packweight:effectiveMass",
            SyncKey::EncumbranceFraction => "packweight:encumbranceFraction",
            SyncKey::MovementMultiplier => "packweight:moveMultiplier",
            SyncKey::StartMass => "packweight:startMass",
            SyncKey::CapMass => "packweight:capMass",
            SyncKey::TraitModifierCount => "packweight:traitModifiers",
        }
    }
}

impl std::fmt::Display for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted to every subscriber of the sync boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A key/value output changed.
    Value {
        actor: ActorId,
        key: SyncKey,
        value: f64,
    },
    /// Movement speed modifier (`multiplier - 1`).
    MovementModifier {
        actor: ActorId,
        id: String,
        value: f64,
    },
}

impl SyncEvent {
    pub fn actor(&self) -> &ActorId {
        match self {
            SyncEvent::Value { actor, .. } | SyncEvent::MovementModifier { actor, .. } => actor,
        }
    }
}
