//! Incremental weight cache
//!
//! Keeps per-slot raw and effective masses for both containers of one actor,
//! plus running aggregates. Single-slot mutations are filtered by signature
//! and patched in O(1); a bag change re-patches only that bag's content
//! slots; anything structural falls back to a full O(n) rebuild.
//!
//! State machine:
//!
//! ```text
//! Uninitialized ──rebuild──► Consistent ◄──patch── PartiallyDirty
//!                               │   ▲                  ▲
//!                               │   └──────rebuild─────┼── RebuildPending
//!                               └──mark dirty──────────┘
//! ```
//!
//! After `ensure_up_to_date` returns, for each container
//! `sum(raw) == raw_total` and `sum(effective) == effective_total`.

use crate::bag;
use crate::resolver::WeightResolver;
use crate::signature::slot_signature;
use packweight_core::{
    ContainerKind, Inventory, ItemCatalog, Mutation, SlotRole, SlotTarget, WeightConfig,
};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Uninitialized,
    Consistent,
    PartiallyDirty,
    RebuildPending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightTotals {
    pub raw: f64,
    pub effective: f64,
}

/// What `ensure_up_to_date` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Unchanged,
    Patched { slots: usize, bags: usize },
    Rebuilt { slots: usize },
}

/// Per-container arrays and aggregates.
#[derive(Debug, Default)]
struct ContainerCache {
    raw: Vec<f64>,
    effective: Vec<f64>,
    signatures: Vec<u64>,
    raw_total: f64,
    effective_total: f64,
    dirty: Vec<usize>,
    dirty_flag: Vec<bool>,
}

impl ContainerCache {
    fn reset(&mut self, len: usize) {
        self.raw.clear();
        self.raw.resize(len, 0.0);
        self.effective.clear();
        self.effective.resize(len, 0.0);
        self.signatures.clear();
        self.signatures.resize(len, 0);
        self.dirty.clear();
        self.dirty_flag.clear();
        self.dirty_flag.resize(len, false);
        self.raw_total = 0.0;
        self.effective_total = 0.0;
    }

    fn is_sized(&self, len: usize) -> bool {
        self.raw.len() == len
            && self.effective.len() == len
            && self.signatures.len() == len
            && self.dirty_flag.len() == len
    }

    fn mark(&mut self, index: usize) {
        if let Some(flag) = self.dirty_flag.get_mut(index) {
            if !*flag {
                *flag = true;
                self.dirty.push(index);
            }
        }
    }
}

/// Bag structure of the main container, as dense parallel arrays.
#[derive(Debug, Default)]
struct BagIndex {
    /// Main slot → owning bag index, for content slots whose bag exists.
    owner: Vec<Option<usize>>,
    /// Main slot → its bag index, for bag-equip slots.
    equip_bag: Vec<Option<usize>>,
    /// Bag index → bag-equip slot.
    equip_slots: Vec<usize>,
    /// Bag index → content slots.
    members: Vec<Vec<usize>>,
    /// Bag index → cached effectiveness multiplier.
    multipliers: Vec<f64>,
    dirty: Vec<usize>,
    dirty_flag: Vec<bool>,
}

impl BagIndex {
    fn rebuild(&mut self, inventory: &Inventory) {
        let slots = inventory.main.slots();
        self.owner.clear();
        self.owner.resize(slots.len(), None);
        self.equip_bag.clear();
        self.equip_bag.resize(slots.len(), None);
        self.equip_slots.clear();

        for (i, slot) in slots.iter().enumerate() {
            if slot.role == SlotRole::BagEquip {
                self.equip_bag[i] = Some(self.equip_slots.len());
                self.equip_slots.push(i);
            }
        }

        let bags = self.equip_slots.len();
        self.members.clear();
        self.members.resize_with(bags, Vec::new);
        for (i, slot) in slots.iter().enumerate() {
            if let SlotRole::Content { bag } = slot.role {
                if bag < bags {
                    self.owner[i] = Some(bag);
                    self.members[bag].push(i);
                }
            }
        }

        self.multipliers.clear();
        self.multipliers.resize(bags, 1.0);
        self.dirty.clear();
        self.dirty_flag.clear();
        self.dirty_flag.resize(bags, false);
    }

    fn is_sized(&self, main_len: usize) -> bool {
        self.owner.len() == main_len && self.equip_bag.len() == main_len
    }

    fn mark(&mut self, bag: usize) {
        if let Some(flag) = self.dirty_flag.get_mut(bag) {
            if !*flag {
                *flag = true;
                self.dirty.push(bag);
            }
        }
    }

    fn multiplier_for(&self, kind: ContainerKind, slot: usize) -> f64 {
        match kind {
            ContainerKind::FastAccess => 1.0,
            ContainerKind::Main => self
                .owner
                .get(slot)
                .copied()
                .flatten()
                .and_then(|bag| self.multipliers.get(bag).copied())
                .unwrap_or(1.0),
        }
    }
}

pub struct IncrementalWeightCache {
    resolver: WeightResolver,
    config: Arc<WeightConfig>,
    containers: [ContainerCache; 2],
    bags: BagIndex,
    state: CacheState,
}

impl IncrementalWeightCache {
    pub fn new(catalog: Arc<dyn ItemCatalog>, config: Arc<WeightConfig>) -> Self {
        Self {
            resolver: WeightResolver::new(catalog),
            config,
            containers: [ContainerCache::default(), ContainerCache::default()],
            bags: BagIndex::default(),
            state: CacheState::Uninitialized,
        }
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Swap the config. Rules may have changed, so the next update rebuilds.
    pub fn set_config(&mut self, config: Arc<WeightConfig>) {
        self.config = config;
        self.request_rebuild();
    }

    pub fn request_rebuild(&mut self) {
        if self.state != CacheState::Uninitialized {
            self.state = CacheState::RebuildPending;
        }
    }

    pub fn has_pending_work(&self) -> bool {
        match self.state {
            CacheState::Uninitialized | CacheState::RebuildPending => true,
            _ => {
                !self.bags.dirty.is_empty() || self.containers.iter().any(|c| !c.dirty.is_empty())
            }
        }
    }

    /// Record a mutation. Returns `false` when the slot's weight-relevant
    /// state is unchanged, in which case nothing is modified.
    ///
    /// The stored signature is updated immediately so a duplicate
    /// notification for the same change is filtered too.
    pub fn mark_dirty_if_relevant(&mut self, inventory: &Inventory, mutation: Mutation) -> bool {
        let index = match mutation.target {
            SlotTarget::Whole => {
                trace!("Whole-container mutation on {}", mutation.container);
                self.request_rebuild();
                return true;
            }
            SlotTarget::Slot(index) => index,
        };

        if matches!(
            self.state,
            CacheState::Uninitialized | CacheState::RebuildPending
        ) {
            return true;
        }

        let container = inventory.container(mutation.container);
        let cached = &mut self.containers[mutation.container.index()];
        if !cached.is_sized(container.len()) || index >= container.len() {
            debug!(
                "Structural mismatch on {} (slot {}, len {}, cached {}); rebuild pending",
                mutation.container,
                index,
                container.len(),
                cached.signatures.len()
            );
            self.state = CacheState::RebuildPending;
            return true;
        }

        let signature = slot_signature(container.stack(index));
        if cached.signatures[index] == signature {
            return false;
        }
        cached.signatures[index] = signature;
        cached.mark(index);

        if mutation.container == ContainerKind::Main {
            if let Some(bag) = self.bags.equip_bag.get(index).copied().flatten() {
                self.bags.mark(bag);
            }
        }

        self.state = CacheState::PartiallyDirty;
        true
    }

    /// Bring aggregates up to date. Idempotent.
    pub fn ensure_up_to_date(&mut self, inventory: &Inventory) -> UpdateOutcome {
        let structural = matches!(
            self.state,
            CacheState::Uninitialized | CacheState::RebuildPending
        ) || ContainerKind::ALL.iter().any(|kind| {
            !self.containers[kind.index()].is_sized(inventory.container(*kind).len())
        }) || !self.bags.is_sized(inventory.main.len());

        if structural {
            return self.rebuild(inventory);
        }

        if !self.has_pending_work() {
            self.state = CacheState::Consistent;
            return UpdateOutcome::Unchanged;
        }

        self.patch(inventory)
    }

    fn rebuild(&mut self, inventory: &Inventory) -> UpdateOutcome {
        let Self {
            resolver,
            config,
            containers,
            bags,
            ..
        } = self;
        let config: &WeightConfig = config;

        resolver.clear_memo();
        bags.rebuild(inventory);
        for (bag, slot) in bags.equip_slots.iter().enumerate() {
            let stack = inventory.main.stack(*slot);
            let declared = stack.and_then(|s| resolver.declared_bag_effectiveness(&s.code));
            bags.multipliers[bag] = bag::resolve(stack, declared, &config.bag_degrade);
        }

        let mut slots = 0;
        for kind in ContainerKind::ALL {
            let container = inventory.container(kind);
            let cached = &mut containers[kind.index()];
            cached.reset(container.len());
            for i in 0..container.len() {
                let stack = container.stack(i);
                let raw = stack.map_or(0.0, |s| resolver.stack_mass(s, config));
                let effective = raw * bags.multiplier_for(kind, i);
                cached.raw[i] = raw;
                cached.effective[i] = effective;
                cached.signatures[i] = slot_signature(stack);
                cached.raw_total += raw;
                cached.effective_total += effective;
            }
            slots += container.len();
        }

        self.state = CacheState::Consistent;
        debug!(
            "Full rebuild: {} slots, {} bags, raw {:.3}, effective {:.3}",
            slots,
            self.bags.equip_slots.len(),
            self.totals().raw,
            self.totals().effective
        );
        UpdateOutcome::Rebuilt { slots }
    }

    fn patch(&mut self, inventory: &Inventory) -> UpdateOutcome {
        let Self {
            resolver,
            config,
            containers,
            bags,
            ..
        } = self;
        let config: &WeightConfig = config;

        let dirty_bags = std::mem::take(&mut bags.dirty);
        let bag_count = dirty_bags.len();
        let main = &mut containers[ContainerKind::Main.index()];
        for bag in dirty_bags {
            bags.dirty_flag[bag] = false;
            let slot = bags.equip_slots[bag];
            let stack = inventory.main.stack(slot);
            let declared = stack.and_then(|s| resolver.declared_bag_effectiveness(&s.code));
            bags.multipliers[bag] = bag::resolve(stack, declared, &config.bag_degrade);
            for member in &bags.members[bag] {
                main.mark(*member);
            }
        }

        let mut slots = 0;
        for kind in ContainerKind::ALL {
            let container = inventory.container(kind);
            let cached = &mut containers[kind.index()];
            let dirty = std::mem::take(&mut cached.dirty);
            for i in dirty {
                cached.dirty_flag[i] = false;
                let stack = container.stack(i);
                let raw = stack.map_or(0.0, |s| resolver.stack_mass(s, config));
                let effective = raw * bags.multiplier_for(kind, i);
                cached.raw_total += raw - cached.raw[i];
                cached.effective_total += effective - cached.effective[i];
                cached.raw[i] = raw;
                cached.effective[i] = effective;
                cached.signatures[i] = slot_signature(stack);
                slots += 1;
            }
        }

        self.state = CacheState::Consistent;
        trace!("Patched {} slots, {} bags", slots, bag_count);
        UpdateOutcome::Patched {
            slots,
            bags: bag_count,
        }
    }

    /// Aggregate masses over both containers.
    pub fn totals(&self) -> WeightTotals {
        self.containers
            .iter()
            .fold(WeightTotals::default(), |acc, c| WeightTotals {
                raw: acc.raw + c.raw_total,
                effective: acc.effective + c.effective_total,
            })
    }

    pub fn container_totals(&self, kind: ContainerKind) -> WeightTotals {
        let c = &self.containers[kind.index()];
        WeightTotals {
            raw: c.raw_total,
            effective: c.effective_total,
        }
    }

    /// Cached per-slot raw masses.
    pub fn slot_raw(&self, kind: ContainerKind) -> &[f64] {
        &self.containers[kind.index()].raw
    }

    /// Cached per-slot effective masses.
    pub fn slot_effective(&self, kind: ContainerKind) -> &[f64] {
        &self.containers[kind.index()].effective
    }

    pub fn bag_count(&self) -> usize {
        self.bags.equip_slots.len()
    }

    pub fn bag_multiplier(&self, bag: usize) -> Option<f64> {
        self.bags.multipliers.get(bag).copied()
    }

    pub fn bag_members(&self, bag: usize) -> Option<&[usize]> {
        self.bags.members.get(bag).map(Vec::as_slice)
    }

    pub fn memoized_codes(&self) -> usize {
        self.resolver.memo_len()
    }
}
