//! Weight tracking configuration
//!
//! All tunable parameters in one place. The core only ever sees an
//! already-parsed value; anything missing falls back to the defaults below.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Gap enforced between `start_mass` and `cap_mass`.
pub const CAP_EPSILON: f64 = 1e-3;

/// Top-level weight configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Master switch. When off, actors publish neutral values and ignore mutations.
    pub enabled: bool,
    /// Per-unit mass for items no rule matches.
    pub default_mass: f64,
    /// Per-item mass rules.
    pub weight_rules: WeightRules,
    /// How bag wear erodes load reduction.
    pub bag_degrade: BagDegradeConfig,
    /// Mass to movement multiplier curve.
    pub encumbrance: EncumbranceConfig,
    /// Quiet window after the last relevant mutation before recomputing.
    pub debounce_ms: u64,
    /// Publish rate limiting.
    pub sync: SyncConfig,
    /// Emit periodic debug counters.
    pub debug: bool,
    /// Debug counter reporting interval in seconds.
    pub debug_report_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightRules {
    /// Exact item code → per-unit mass.
    pub exact: HashMap<String, f64>,
    /// Case-insensitive substring rules, first match wins.
    pub wildcard: Vec<WildcardRule>,
    /// Item class → per-unit mass.
    pub class_fallback: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardRule {
    pub pattern: String,
    pub mass: f64,
}

impl WildcardRule {
    pub fn new(pattern: impl Into<String>, mass: f64) -> Self {
        Self {
            pattern: pattern.into(),
            mass,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BagDegradeConfig {
    /// Effectiveness of a fully worn bag. 1.0 = no reduction left.
    pub broken_effectiveness: f64,
    /// Exponent applied to wear. >1 keeps bags useful longer.
    pub curve_power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncumbranceConfig {
    pub enabled: bool,
    /// Mass at which the penalty starts.
    pub start_mass: f64,
    /// Mass at which the penalty reaches `max_penalty`.
    pub cap_mass: f64,
    /// Penalty applied just past `start_mass` (0.0 - 1.0).
    pub start_penalty: f64,
    /// Penalty at and beyond `cap_mass` (0.0 - 1.0).
    pub max_penalty: f64,
}

/// Publish throttling for dynamic values (masses, multiplier, fraction).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum time between publishes of a dynamic value.
    pub min_interval_ms: u64,
    /// Mass change that bypasses the interval.
    pub mass_epsilon: f64,
    /// Multiplier/fraction change that bypasses the interval.
    pub fraction_epsilon: f64,
}

// ============================================================
// Defaults
// ============================================================

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_mass: 0.1,
            weight_rules: WeightRules::default(),
            bag_degrade: BagDegradeConfig::default(),
            encumbrance: EncumbranceConfig::default(),
            debounce_ms: 125,
            sync: SyncConfig::default(),
            debug: false,
            debug_report_secs: 10,
        }
    }
}

impl Default for BagDegradeConfig {
    fn default() -> Self {
        Self {
            broken_effectiveness: 1.0,
            curve_power: 2.0,
        }
    }
}

impl Default for EncumbranceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_mass: 30.0,
            cap_mass: 90.0,
            start_penalty: 0.05,
            max_penalty: 0.35,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 250,
            mass_epsilon: 0.5,
            fraction_epsilon: 0.01,
        }
    }
}

// ============================================================
// Loading and sanitizing
// ============================================================

impl WeightConfig {
    /// Accept an upstream-parsed config value. Absent or malformed input
    /// yields the defaults; the system stays enabled either way.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(v) => match Self::try_from_value(v) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Malformed weight config ({}), using defaults", e);
                    Self::default()
                }
            },
            None => {
                tracing::info!("No weight config supplied, using defaults");
                Self::default()
            }
        }
    }

    /// Strict variant of `from_value`: reports why a value was rejected.
    pub fn try_from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::config("weight config must be an object"));
        }
        let config: WeightConfig = serde_json::from_value(value.clone())?;
        Ok(config.sanitized())
    }

    /// Clamp every numeric field into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.default_mass = non_negative(self.default_mass);
        self.weight_rules = self.weight_rules.sanitized();
        self.bag_degrade = self.bag_degrade.sanitized();
        self.encumbrance = self.encumbrance.sanitized();
        self.debounce_ms = self.debounce_ms.clamp(1, 5_000);
        self.sync = self.sync.sanitized();
        self.debug_report_secs = self.debug_report_secs.max(1);
        self
    }
}

impl WeightRules {
    /// Lowercase wildcard patterns and strip surrounding `*`; drop empty ones.
    pub fn sanitized(mut self) -> Self {
        self.exact.values_mut().for_each(|m| *m = non_negative(*m));
        self.class_fallback
            .values_mut()
            .for_each(|m| *m = non_negative(*m));
        self.wildcard = self
            .wildcard
            .into_iter()
            .filter_map(|rule| {
                let pattern = rule.pattern.trim_matches('*').to_ascii_lowercase();
                if pattern.is_empty() {
                    None
                } else {
                    Some(WildcardRule {
                        pattern,
                        mass: non_negative(rule.mass),
                    })
                }
            })
            .collect();
        self
    }
}

impl BagDegradeConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            broken_effectiveness: if self.broken_effectiveness.is_finite() {
                self.broken_effectiveness.clamp(0.0, 10.0)
            } else {
                defaults.broken_effectiveness
            },
            curve_power: if self.curve_power.is_finite() && self.curve_power > 0.0 {
                self.curve_power
            } else {
                defaults.curve_power
            },
        }
    }
}

impl EncumbranceConfig {
    /// Penalties in [0, 1], `max_penalty >= start_penalty`,
    /// `cap_mass > start_mass`.
    pub fn sanitized(self) -> Self {
        let start_mass = if self.start_mass.is_finite() {
            self.start_mass
        } else {
            Self::default().start_mass
        };
        let cap_mass = if self.cap_mass.is_finite() {
            self.cap_mass.max(start_mass + CAP_EPSILON)
        } else {
            start_mass + CAP_EPSILON
        };
        let start_penalty = unit(self.start_penalty);
        let max_penalty = unit(self.max_penalty).max(start_penalty);
        Self {
            enabled: self.enabled,
            start_mass,
            cap_mass,
            start_penalty,
            max_penalty,
        }
    }
}

impl SyncConfig {
    pub fn sanitized(self) -> Self {
        Self {
            min_interval_ms: self.min_interval_ms,
            mass_epsilon: non_negative(self.mass_epsilon),
            fraction_epsilon: non_negative(self.fraction_epsilon),
        }
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
