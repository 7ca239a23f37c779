//! Packweight Engine - incremental weight cache, debounced recompute, per-actor workers

pub mod bag;
pub mod cache;
pub mod curve;
pub mod debounce;
pub mod manager;
pub mod publish;
pub mod resolver;
pub mod signature;
pub mod stats;

mod actor;
mod registry;

pub use actor::ActorSnapshot;
pub use cache::{CacheState, IncrementalWeightCache, UpdateOutcome, WeightTotals};
pub use curve::{EncumbranceCurve, TraitDeltas};
pub use debounce::{ArmTimer, DebounceScheduler, TimerOutcome};
pub use manager::WeightManager;
pub use publish::{Outputs, PublishResult, Publisher};
pub use resolver::WeightResolver;
pub use stats::{StatsSnapshot, WeightStats};
