//! Encumbrance curve: effective mass → movement multiplier.

use packweight_core::{ActorId, EncumbranceConfig, StatSource};

/// Stat key whose blend shifts `start_mass`.
pub const START_MASS_STAT: &str = "packweight:startMass";
/// Stat key whose blend shifts `cap_mass`.
pub const CAP_MASS_STAT: &str = "packweight:capMass";

/// Movement multiplier for `mass`, in `[1 - max_penalty, 1]`.
///
/// Linear between `(start_mass, 1 - start_penalty)` and
/// `(cap_mass, 1 - max_penalty)`; 1 at or below `start_mass`.
pub fn multiplier(mass: f64, config: &EncumbranceConfig) -> f64 {
    if !config.enabled {
        return 1.0;
    }
    let c = config.sanitized();
    if !mass.is_finite() || mass <= c.start_mass {
        return 1.0;
    }
    let t = ((mass - c.start_mass) / (c.cap_mass - c.start_mass)).clamp(0.0, 1.0);
    let penalty = c.start_penalty + t * (c.max_penalty - c.start_penalty);
    (1.0 - penalty).clamp(1.0 - c.max_penalty, 1.0)
}

/// Additive trait adjustments to the curve bounds, in mass units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TraitDeltas {
    pub start_mass: f64,
    pub cap_mass: f64,
}

impl TraitDeltas {
    /// Read blends from the stat system; `delta = blend - 1`.
    pub fn read(stats: &dyn StatSource, actor: &ActorId) -> Self {
        Self {
            start_mass: delta(stats.blended(actor, START_MASS_STAT)),
            cap_mass: delta(stats.blended(actor, CAP_MASS_STAT)),
        }
    }

    /// Number of stats that actually adjust the curve.
    pub fn count(&self) -> usize {
        [self.start_mass, self.cap_mass]
            .iter()
            .filter(|d| **d != 0.0)
            .count()
    }
}

fn delta(blend: f64) -> f64 {
    if blend.is_finite() {
        blend - 1.0
    } else {
        0.0
    }
}

/// Caches the trait-adjusted curve; recomputes only when the base config or
/// the deltas change by value.
#[derive(Debug)]
pub struct EncumbranceCurve {
    base: Option<EncumbranceConfig>,
    deltas: TraitDeltas,
    adjusted: EncumbranceConfig,
    recomputes: u64,
}

impl Default for EncumbranceCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl EncumbranceCurve {
    pub fn new() -> Self {
        Self {
            base: None,
            deltas: TraitDeltas::default(),
            adjusted: EncumbranceConfig::default().sanitized(),
            recomputes: 0,
        }
    }

    pub fn adjusted(&mut self, base: &EncumbranceConfig, deltas: TraitDeltas) -> EncumbranceConfig {
        if self.base.as_ref() != Some(base) || self.deltas != deltas {
            self.adjusted = EncumbranceConfig {
                start_mass: base.start_mass + deltas.start_mass,
                cap_mass: base.cap_mass + deltas.cap_mass,
                ..*base
            }
            .sanitized();
            self.base = Some(*base);
            self.deltas = deltas;
            self.recomputes += 1;
        }
        self.adjusted
    }

    pub fn multiplier(&mut self, mass: f64, base: &EncumbranceConfig, deltas: TraitDeltas) -> f64 {
        let adjusted = self.adjusted(base, deltas);
        multiplier(mass, &adjusted)
    }

    /// How many times the adjusted config was rebuilt.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }
}
