//! Bag effectiveness: how much an equipped bag reduces the mass of its contents.

use packweight_core::{BagDegradeConfig, ItemStack};

/// Upper bound for a declared effectiveness.
pub const MAX_BASE_EFFECTIVENESS: f64 = 10.0;

/// Resolve the load multiplier applied to a bag's content slots.
///
/// `declared` is the catalog's bag-effectiveness attribute for the bag's
/// code. An empty bag slot reduces nothing. A bag without a durability
/// ceiling keeps its declared effectiveness; otherwise wear moves it toward
/// `curve.broken_effectiveness` along `wear^curve_power`.
pub fn resolve(bag: Option<&ItemStack>, declared: Option<f64>, curve: &BagDegradeConfig) -> f64 {
    let Some(bag) = bag else {
        return 1.0;
    };

    let base = declared
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, MAX_BASE_EFFECTIVENESS))
        .unwrap_or(1.0);

    let Some(durability) = bag.durability.filter(|d| d.max > 0) else {
        return base;
    };

    let condition = (durability.remaining as f64 / durability.max as f64).clamp(0.0, 1.0);
    let wear = 1.0 - condition;
    let penalty = wear.powf(curve.curve_power);
    let broken = curve.broken_effectiveness;
    let eff = base + (broken - base) * penalty;

    let lo = base.min(broken);
    let hi = base.max(broken);
    if eff.is_finite() {
        eff.clamp(lo, hi)
    } else {
        base
    }
}
