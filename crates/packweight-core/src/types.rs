//! Core types for Packweight: actor ids and the two-container inventory model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

/// Actor identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ActorId(Arc<str>);

impl ActorId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<ActorId> for String {
    fn from(id: ActorId) -> Self {
        id.0.to_string()
    }
}

// ---------------------------------------------------------------------------
// Containers and mutation targets
// ---------------------------------------------------------------------------

/// The two containers every actor owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Flat quick-access row. Never holds bags.
    FastAccess,
    /// Main container: plain slots, bag-equip slots, and bag content slots.
    Main,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 2] = [ContainerKind::FastAccess, ContainerKind::Main];

    /// Dense index for per-container arrays.
    pub fn index(self) -> usize {
        match self {
            ContainerKind::FastAccess => 0,
            ContainerKind::Main => 1,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::FastAccess => write!(f, "fast_access"),
            ContainerKind::Main => write!(f, "main"),
        }
    }
}

/// Which part of a container a mutation touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotTarget {
    Slot(usize),
    /// Unknown extent; the cache rebuilds from scratch.
    Whole,
}

impl SlotTarget {
    /// Map a host slot index: any negative index means the whole container.
    pub fn from_raw(index: i64) -> Self {
        if index < 0 {
            SlotTarget::Whole
        } else {
            SlotTarget::Slot(index as usize)
        }
    }
}

/// A single mutation notification for one actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub container: ContainerKind,
    pub target: SlotTarget,
}

impl Mutation {
    pub fn slot(container: ContainerKind, index: usize) -> Self {
        Self {
            container,
            target: SlotTarget::Slot(index),
        }
    }

    pub fn whole(container: ContainerKind) -> Self {
        Self {
            container,
            target: SlotTarget::Whole,
        }
    }

    pub fn from_raw(container: ContainerKind, index: i64) -> Self {
        Self {
            container,
            target: SlotTarget::from_raw(index),
        }
    }
}

// ---------------------------------------------------------------------------
// Item stacks
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Durability {
    pub remaining: i32,
    pub max: i32,
}

/// One entry of a liquid container's nested contents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiquidEntry {
    /// `None` while the nested stack has not been materialized by the host.
    #[serde(default)]
    pub code: Option<String>,
    pub amount: f64,
}

/// Attribute tree carried by a stack. Only `mass` and `liquid_contents`
/// affect weight; everything else is cosmetic and lands in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub liquid_contents: Vec<LiquidEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub code: String,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durability: Option<Durability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

impl ItemStack {
    pub fn new(code: impl Into<String>, size: u32) -> Self {
        Self {
            code: code.into(),
            size,
            durability: None,
            attributes: None,
        }
    }

    pub fn with_durability(mut self, remaining: i32, max: i32) -> Self {
        self.durability = Some(Durability { remaining, max });
        self
    }

    pub fn with_mass_override(mut self, mass: f64) -> Self {
        self.attributes.get_or_insert_with(Default::default).mass = Some(mass);
        self
    }

    pub fn with_liquid(mut self, code: impl Into<String>, amount: f64) -> Self {
        self.attributes
            .get_or_insert_with(Default::default)
            .liquid_contents
            .push(LiquidEntry {
                code: Some(code.into()),
                amount,
            });
        self
    }

    /// Nested entry the host has not materialized yet.
    pub fn with_unresolved_liquid(mut self, amount: f64) -> Self {
        self.attributes
            .get_or_insert_with(Default::default)
            .liquid_contents
            .push(LiquidEntry { code: None, amount });
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes
            .get_or_insert_with(Default::default)
            .extra
            .insert(key.into(), value);
        self
    }

    pub fn liquid_contents(&self) -> &[LiquidEntry] {
        self.attributes
            .as_ref()
            .map(|a| a.liquid_contents.as_slice())
            .unwrap_or(&[])
    }

    pub fn mass_override(&self) -> Option<f64> {
        self.attributes.as_ref().and_then(|a| a.mass)
    }
}

// ---------------------------------------------------------------------------
// Slots, containers, inventory
// ---------------------------------------------------------------------------

/// Structural role of a slot. Only meaningful in the main container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SlotRole {
    #[default]
    Plain,
    /// Holds a bag. Its bag index is its ordinal among bag-equip slots.
    BagEquip,
    /// Owned by the bag with this bag index.
    Content { bag: usize },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(flatten)]
    pub role: SlotRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<ItemStack>,
}

impl Slot {
    pub fn new(role: SlotRole) -> Self {
        Self { role, stack: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container {
    slots: Vec<Slot>,
}

impl Container {
    /// A flat container of `len` plain slots.
    pub fn flat(len: usize) -> Self {
        Self {
            slots: vec![Slot::default(); len],
        }
    }

    pub fn from_slots(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn stack(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(|s| s.stack.as_ref())
    }

    /// Replace the stack in a slot, returning the previous one.
    /// Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, stack: Option<ItemStack>) -> Option<ItemStack> {
        match self.slots.get_mut(index) {
            Some(slot) => std::mem::replace(&mut slot.stack, stack),
            None => None,
        }
    }

    pub fn stack_mut(&mut self, index: usize) -> Option<&mut ItemStack> {
        self.slots.get_mut(index).and_then(|s| s.stack.as_mut())
    }

    pub fn push(&mut self, slot: Slot) {
        self.slots.push(slot);
    }

    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }
}

/// Everything one actor carries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub fast_access: Container,
    pub main: Container,
}

/// Inventory handle shared between the host (writer) and the actor worker (reader).
pub type SharedInventory = Arc<RwLock<Inventory>>;

impl Inventory {
    /// Build an inventory laid out as: `plain` plain main slots, then one
    /// bag-equip slot per entry of `bag_capacities`, then each bag's content
    /// slots in bag order.
    pub fn with_layout(fast_access: usize, plain: usize, bag_capacities: &[usize]) -> Self {
        let mut main = Vec::with_capacity(
            plain + bag_capacities.len() + bag_capacities.iter().sum::<usize>(),
        );
        main.extend((0..plain).map(|_| Slot::new(SlotRole::Plain)));
        main.extend(bag_capacities.iter().map(|_| Slot::new(SlotRole::BagEquip)));
        for (bag, capacity) in bag_capacities.iter().enumerate() {
            main.extend((0..*capacity).map(|_| Slot::new(SlotRole::Content { bag })));
        }
        Self {
            fast_access: Container::flat(fast_access),
            main: Container::from_slots(main),
        }
    }

    pub fn into_shared(self) -> SharedInventory {
        Arc::new(RwLock::new(self))
    }

    pub fn container(&self, kind: ContainerKind) -> &Container {
        match kind {
            ContainerKind::FastAccess => &self.fast_access,
            ContainerKind::Main => &self.main,
        }
    }

    pub fn container_mut(&mut self, kind: ContainerKind) -> &mut Container {
        match kind {
            ContainerKind::FastAccess => &mut self.fast_access,
            ContainerKind::Main => &mut self.main,
        }
    }

    /// Index of the `bag`-th bag-equip slot in the main container.
    pub fn bag_equip_slot(&self, bag: usize) -> Option<usize> {
        self.main
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.role == SlotRole::BagEquip)
            .map(|(i, _)| i)
            .nth(bag)
    }

    /// Indices of the main-container slots owned by `bag`.
    pub fn content_slots(&self, bag: usize) -> Vec<usize> {
        self.main
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.role == SlotRole::Content { bag })
            .map(|(i, _)| i)
            .collect()
    }
}
