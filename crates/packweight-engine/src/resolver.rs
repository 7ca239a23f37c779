//! Per-unit and liquid mass resolution
//!
//! Resolution order for a stack's per-unit mass, first match wins:
//! stack override, catalog-declared mass, exact rule, wildcard rules in
//! declared order, class fallback, configured default.
//!
//! Per-code results are memoized. The owning cache clears the memo on a full
//! rebuild only, so a config or catalog change becomes visible at the next
//! rebuild.

use packweight_core::{ItemCatalog, ItemStack, WeightConfig};
use std::collections::HashMap;
use std::sync::Arc;

pub struct WeightResolver {
    catalog: Arc<dyn ItemCatalog>,
    mass_memo: HashMap<String, f64>,
    volume_memo: HashMap<String, Option<f64>>,
}

impl WeightResolver {
    pub fn new(catalog: Arc<dyn ItemCatalog>) -> Self {
        Self {
            catalog,
            mass_memo: HashMap::new(),
            volume_memo: HashMap::new(),
        }
    }

    pub fn clear_memo(&mut self) {
        self.mass_memo.clear();
        self.volume_memo.clear();
    }

    /// Number of memoized codes (mass and volume tables combined).
    pub fn memo_len(&self) -> usize {
        self.mass_memo.len() + self.volume_memo.len()
    }

    /// Total mass of a stack: `per_unit * size + liquid`.
    pub fn stack_mass(&mut self, stack: &ItemStack, config: &WeightConfig) -> f64 {
        let per_unit = self.per_unit_mass(stack, config);
        per_unit * stack.size as f64 + self.liquid_mass(stack)
    }

    pub fn per_unit_mass(&mut self, stack: &ItemStack, config: &WeightConfig) -> f64 {
        if let Some(mass) = stack.mass_override() {
            return non_negative(mass);
        }
        if let Some(mass) = self.mass_memo.get(&stack.code) {
            return *mass;
        }
        let mass = self.resolve_code(&stack.code, config);
        self.mass_memo.insert(stack.code.clone(), mass);
        mass
    }

    fn resolve_code(&self, code: &str, config: &WeightConfig) -> f64 {
        let info = self.catalog.lookup(code);
        if let Some(mass) = info.as_ref().and_then(|i| i.mass) {
            return non_negative(mass);
        }

        let rules = &config.weight_rules;
        if let Some(mass) = rules.exact.get(code) {
            return non_negative(*mass);
        }

        if !rules.wildcard.is_empty() {
            let lower = code.to_ascii_lowercase();
            if let Some(rule) = rules
                .wildcard
                .iter()
                .find(|r| lower.contains(&r.pattern.to_ascii_lowercase()))
            {
                return non_negative(rule.mass);
            }
        }

        if let Some(mass) = info
            .as_ref()
            .and_then(|i| i.class.as_deref())
            .and_then(|class| rules.class_fallback.get(class))
        {
            return non_negative(*mass);
        }

        non_negative(config.default_mass)
    }

    /// Mass contributed by a stack's nested liquid contents. Entries that are
    /// unresolved, unknown to the catalog, or lack a positive
    /// units-per-volume contribute nothing.
    pub fn liquid_mass(&mut self, stack: &ItemStack) -> f64 {
        let mut total = 0.0;
        for entry in stack.liquid_contents() {
            let Some(code) = entry.code.as_deref() else {
                continue;
            };
            if !(entry.amount.is_finite() && entry.amount > 0.0) {
                continue;
            }
            if let Some(per_volume) = self.units_per_volume(code) {
                total += entry.amount / per_volume;
            }
        }
        total
    }

    fn units_per_volume(&mut self, code: &str) -> Option<f64> {
        if let Some(cached) = self.volume_memo.get(code) {
            return *cached;
        }
        let resolved = self
            .catalog
            .lookup(code)
            .and_then(|i| i.units_per_volume)
            .filter(|v| v.is_finite() && *v > 0.0);
        self.volume_memo.insert(code.to_string(), resolved);
        resolved
    }

    /// Declared bag effectiveness for an item code, if any.
    pub fn declared_bag_effectiveness(&self, code: &str) -> Option<f64> {
        self.catalog.lookup(code).and_then(|i| i.bag_effectiveness)
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}
