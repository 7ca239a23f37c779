//! Actor worker: the single serialized path for one actor's weight state
//!
//! Every input for an actor (mutations, debounce expiries, stat and config
//! changes, snapshot queries) enters one ordered queue. A single consumer
//! loop owns the cache, scheduler, curve and publisher, so none of them
//! need locks.

use crate::cache::{CacheState, IncrementalWeightCache, UpdateOutcome, WeightTotals};
use crate::curve::{self, EncumbranceCurve, TraitDeltas};
use crate::debounce::{ArmTimer, DebounceScheduler, TimerOutcome};
use crate::publish::{Outputs, Publisher};
use crate::stats::WeightStats;
use packweight_core::{
    ActorId, Inventory, ItemCatalog, Mutation, SharedInventory, StatSource, SyncEvent,
    WeightConfig,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLockReadGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Every event that can enter an actor's queue.
#[derive(Debug)]
pub(crate) enum ActorEvent {
    Mutation(Mutation),
    /// Debounce timer expired.
    DebounceDue { generation: u64 },
    /// A held-back publish may go out now.
    FlushDue,
    StatsChanged,
    ConfigChanged(Arc<WeightConfig>),
    Snapshot(oneshot::Sender<ActorSnapshot>),
}

/// Point-in-time view of one actor's weight state.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSnapshot {
    pub actor: ActorId,
    pub totals: WeightTotals,
    pub multiplier: f64,
    pub state: CacheState,
    /// A debounced recompute is scheduled.
    pub pending_recompute: bool,
    /// Recomputes applied since join (including the initial one).
    pub recomputes: u64,
    pub last_recompute_at: Option<Instant>,
}

/// Shared collaborators handed to every worker by the manager.
#[derive(Clone)]
pub(crate) struct ActorDeps {
    pub catalog: Arc<dyn ItemCatalog>,
    pub stat_source: Arc<dyn StatSource>,
    pub output_tx: broadcast::Sender<SyncEvent>,
    pub stats: Arc<WeightStats>,
}

pub(crate) struct ActorWorker {
    id: ActorId,
    inventory: SharedInventory,
    config: Arc<WeightConfig>,
    deps: ActorDeps,
    cache: IncrementalWeightCache,
    debounce: DebounceScheduler,
    curve: EncumbranceCurve,
    publisher: Publisher,
    queue_tx: mpsc::UnboundedSender<ActorEvent>,
    queue_rx: mpsc::UnboundedReceiver<ActorEvent>,
    cancel: CancellationToken,
    timer: Option<JoinHandle<()>>,
    flush_timer: Option<JoinHandle<()>>,
    last_outputs: Option<Outputs>,
    recomputes: u64,
    last_recompute_at: Option<Instant>,
}

impl ActorWorker {
    /// Create a worker. Returns `(worker, queue_tx)`; callers submit events
    /// through `queue_tx` and run the worker on its own task.
    pub(crate) fn new(
        id: ActorId,
        inventory: SharedInventory,
        config: Arc<WeightConfig>,
        deps: ActorDeps,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedSender<ActorEvent>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let worker = Self {
            cache: IncrementalWeightCache::new(deps.catalog.clone(), config.clone()),
            debounce: DebounceScheduler::new(Duration::from_millis(config.debounce_ms)),
            curve: EncumbranceCurve::new(),
            publisher: Publisher::new(config.sync),
            id,
            inventory,
            config,
            deps,
            queue_tx: queue_tx.clone(),
            queue_rx,
            cancel,
            timer: None,
            flush_timer: None,
            last_outputs: None,
            recomputes: 0,
            last_recompute_at: None,
        };
        (worker, queue_tx)
    }

    /// Run until the actor leaves or the manager shuts down.
    pub(crate) async fn run(mut self) {
        info!("Actor {} joined", self.id);
        self.recompute_and_publish();

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.queue_rx.recv() => match event {
                    Some(e) => e,
                    None => break,
                },
            };

            match event {
                ActorEvent::Mutation(mutation) => self.on_mutation(mutation),
                ActorEvent::DebounceDue { generation } => self.on_debounce_due(generation),
                ActorEvent::FlushDue => {
                    self.flush_timer = None;
                    if let Some(outputs) = self.last_outputs {
                        self.publish(outputs);
                    }
                }
                ActorEvent::StatsChanged => {
                    if self.config.enabled {
                        self.request_recompute();
                    }
                }
                ActorEvent::ConfigChanged(config) => self.on_config_changed(config),
                ActorEvent::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        self.stop_timers();
        info!("Actor {} left", self.id);
    }

    fn on_mutation(&mut self, mutation: Mutation) {
        self.deps.stats.event_seen();
        if !self.config.enabled {
            return;
        }

        let relevant = {
            let inventory = read_inventory(&self.inventory, &mut self.cache, &self.id);
            self.cache.mark_dirty_if_relevant(&inventory, mutation)
        };
        if !relevant {
            trace!("Actor {}: irrelevant mutation {:?}", self.id, mutation);
            return;
        }

        self.deps.stats.event_relevant();
        self.request_recompute();
    }

    fn request_recompute(&mut self) {
        if let Some(arm) = self.debounce.bump(Instant::now()) {
            self.deps.stats.recompute_queued();
            self.arm_timer(arm);
        }
    }

    fn arm_timer(&mut self, arm: ArmTimer) {
        if let Some(old) = self.timer.take() {
            old.abort();
        }
        let tx = self.queue_tx.clone();
        let cancel = self.cancel.child_token();
        self.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(arm.delay) => {
                    // Closed queue means the actor already left.
                    let _ = tx.send(ActorEvent::DebounceDue { generation: arm.generation });
                }
                _ = cancel.cancelled() => {}
            }
        }));
    }

    fn on_debounce_due(&mut self, generation: u64) {
        match self.debounce.on_timer(Instant::now(), generation) {
            TimerOutcome::Fire => {
                self.timer = None;
                self.recompute_and_publish();
            }
            TimerOutcome::Reschedule(arm) => {
                trace!("Actor {}: deadline moved, re-arming for {:?}", self.id, arm.delay);
                self.arm_timer(arm);
            }
            TimerOutcome::Idle => {}
        }
    }

    fn on_config_changed(&mut self, config: Arc<WeightConfig>) {
        info!("Actor {}: config updated (enabled: {})", self.id, config.enabled);
        self.cache.set_config(config.clone());
        self.debounce.set_window(Duration::from_millis(config.debounce_ms));
        self.publisher.set_sync(config.sync);
        self.publisher.reset();
        self.config = config;
        self.recompute_and_publish();
    }

    /// Recompute and publish. A panic is absorbed: the cycle is skipped and
    /// the next one starts from a full rebuild.
    fn recompute_and_publish(&mut self) {
        if !self.config.enabled {
            self.debounce.cancel();
            self.stop_timers();
            let outputs = Outputs::neutral(&self.config.encumbrance);
            self.last_outputs = Some(outputs);
            self.publish(outputs);
            return;
        }

        match catch_unwind(AssertUnwindSafe(|| self.recompute())) {
            Ok(outputs) => {
                self.last_outputs = Some(outputs);
                self.publish(outputs);
            }
            Err(_) => {
                warn!("Actor {}: recompute panicked; forcing rebuild", self.id);
                self.cache.request_rebuild();
            }
        }
    }

    fn recompute(&mut self) -> Outputs {
        let outcome = {
            let inventory = read_inventory(&self.inventory, &mut self.cache, &self.id);
            self.cache.ensure_up_to_date(&inventory)
        };

        let stats = &self.deps.stats;
        stats.recompute_applied();
        match outcome {
            UpdateOutcome::Rebuilt { .. } => stats.full_rebuild(),
            UpdateOutcome::Patched { slots, .. } => stats.slots_recomputed(slots),
            UpdateOutcome::Unchanged => {}
        }
        self.recomputes += 1;
        self.last_recompute_at = Some(Instant::now());

        let totals = self.cache.totals();
        let deltas = TraitDeltas::read(self.deps.stat_source.as_ref(), &self.id);
        let adjusted = self.curve.adjusted(&self.config.encumbrance, deltas);
        let multiplier = curve::multiplier(totals.effective, &adjusted);

        debug!(
            "Actor {}: {:?}, raw {:.3}, effective {:.3}, multiplier {:.3}",
            self.id, outcome, totals.raw, totals.effective, multiplier
        );

        Outputs {
            raw_mass: totals.raw,
            effective_mass: totals.effective,
            multiplier,
            start_mass: adjusted.start_mass,
            cap_mass: adjusted.cap_mass,
            trait_modifiers: deltas.count(),
        }
    }

    fn publish(&mut self, outputs: Outputs) {
        if self.cancel.is_cancelled() {
            return;
        }
        let result = self.publisher.publish(&self.id, &outputs, Instant::now());
        if !result.events.is_empty() {
            debug!("Actor {}: publishing {} events", self.id, result.events.len());
        }
        for event in result.events {
            // No subscribers is fine.
            let _ = self.deps.output_tx.send(event);
        }
        if let Some(wait) = result.retry_after {
            if self.flush_timer.is_none() {
                let tx = self.queue_tx.clone();
                let cancel = self.cancel.child_token();
                self.flush_timer = Some(tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            let _ = tx.send(ActorEvent::FlushDue);
                        }
                        _ = cancel.cancelled() => {}
                    }
                }));
            }
        }
    }

    fn stop_timers(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
    }

    fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            actor: self.id.clone(),
            totals: self.cache.totals(),
            multiplier: self.last_outputs.map_or(1.0, |o| o.multiplier),
            state: self.cache.state(),
            pending_recompute: self.debounce.is_pending(),
            recomputes: self.recomputes,
            last_recompute_at: self.last_recompute_at,
        }
    }
}

/// Read-lock the inventory. A poisoned lock means a host writer panicked
/// mid-update: the data is read anyway, the poison is cleared, and the cache
/// is told to rebuild since its signatures may not match a partial write.
fn read_inventory<'a>(
    inventory: &'a SharedInventory,
    cache: &mut IncrementalWeightCache,
    actor: &ActorId,
) -> RwLockReadGuard<'a, Inventory> {
    match inventory.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Inventory lock poisoned for actor {}; forcing rebuild", actor);
            inventory.clear_poison();
            cache.request_rebuild();
            poisoned.into_inner()
        }
    }
}
