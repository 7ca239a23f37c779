//! Top-level weight manager: owns the actor registry and hands every actor
//! worker its collaborators explicitly.

use crate::actor::{ActorDeps, ActorEvent, ActorSnapshot, ActorWorker};
use crate::registry::{ActorHandle, ActorRegistry};
use crate::stats::{self, StatsSnapshot, WeightStats};
use packweight_core::{
    ActorId, ContainerKind, Error, ItemCatalog, Mutation, Result, SharedInventory, StatSource,
    SyncEvent, WeightConfig,
};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const OUTPUT_CAPACITY: usize = 1024;

pub struct WeightManager {
    registry: ActorRegistry,
    config: RwLock<Arc<WeightConfig>>,
    deps: ActorDeps,
    shutdown: CancellationToken,
    reporter: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl WeightManager {
    /// Create a manager. Must be called inside a tokio runtime when
    /// `config.debug` is set, since the counter reporter is spawned here.
    pub fn new(
        config: WeightConfig,
        catalog: Arc<dyn ItemCatalog>,
        stat_source: Arc<dyn StatSource>,
    ) -> Self {
        let (output_tx, _) = broadcast::channel(OUTPUT_CAPACITY);
        let manager = Self {
            registry: ActorRegistry::new(),
            config: RwLock::new(Arc::new(config.sanitized())),
            deps: ActorDeps {
                catalog,
                stat_source,
                output_tx,
                stats: Arc::new(WeightStats::new()),
            },
            shutdown: CancellationToken::new(),
            reporter: Mutex::new(None),
        };
        manager.sync_reporter();
        manager
    }

    /// Subscribe to published values.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.deps.output_tx.subscribe()
    }

    pub fn config(&self) -> Arc<WeightConfig> {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Start tracking an actor. Its state is built immediately and the
    /// first values are published without waiting for the debounce window.
    pub fn join(&self, actor: ActorId, inventory: SharedInventory) -> Result<()> {
        let config = self.config();
        self.registry.insert_with(&actor, || {
            let cancel = self.shutdown.child_token();
            let (worker, tx) = ActorWorker::new(
                actor.clone(),
                inventory.clone(),
                config,
                self.deps.clone(),
                cancel.clone(),
            );
            let join = tokio::spawn(worker.run());
            ActorHandle {
                tx,
                cancel,
                join,
                inventory,
            }
        })
    }

    /// Stop tracking an actor. Any scheduled recompute is cancelled and
    /// nothing more is published for it. Returns `false` if it was unknown.
    pub fn leave(&self, actor: &ActorId) -> bool {
        match self.registry.remove(actor) {
            Some(handle) => {
                handle.cancel.cancel();
                debug!("Actor {} removed from registry", actor);
                true
            }
            None => false,
        }
    }

    /// Deliver a mutation notification. Never fails; returns whether it
    /// reached a live actor.
    pub fn notify(&self, actor: &ActorId, mutation: Mutation) -> bool {
        self.send(actor, ActorEvent::Mutation(mutation))
    }

    /// Host-style notification where a negative slot index means the whole container.
    pub fn notify_raw(&self, actor: &ActorId, container: ContainerKind, slot: i64) -> bool {
        self.notify(actor, Mutation::from_raw(container, slot))
    }

    /// Trait stats for `actor` changed; re-read them on the next recompute.
    pub fn notify_stats_changed(&self, actor: &ActorId) -> bool {
        self.send(actor, ActorEvent::StatsChanged)
    }

    /// Replace the config for every live actor.
    pub fn set_config(&self, config: WeightConfig) {
        let config = Arc::new(config.sanitized());
        match self.config.write() {
            Ok(mut current) => *current = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        info!(
            "Weight config updated (enabled: {}, debug: {})",
            config.enabled, config.debug
        );
        for (actor, tx) in self.registry.senders() {
            if tx.send(ActorEvent::ConfigChanged(config.clone())).is_err() {
                debug!("Actor {} gone before config update", actor);
            }
        }
        self.sync_reporter();
    }

    pub async fn snapshot(&self, actor: &ActorId) -> Result<ActorSnapshot> {
        let tx = self
            .registry
            .sender(actor)
            .ok_or_else(|| Error::unknown_actor(actor))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ActorEvent::Snapshot(reply_tx))
            .map_err(|_| Error::actor_closed(actor))?;
        reply_rx.await.map_err(|_| Error::actor_closed(actor))
    }

    pub fn inventory(&self, actor: &ActorId) -> Option<SharedInventory> {
        self.registry.inventory(actor)
    }

    pub fn actors(&self) -> Vec<ActorId> {
        self.registry.list()
    }

    pub fn contains(&self, actor: &ActorId) -> bool {
        self.registry.contains(actor)
    }

    pub fn actor_count(&self) -> usize {
        self.registry.len()
    }

    /// Current debug counters, without resetting them.
    pub fn stats(&self) -> StatsSnapshot {
        self.deps.stats.snapshot()
    }

    /// Cancel every actor and wait for their workers to exit.
    pub async fn shutdown(&self) {
        info!("Weight manager shutting down ({} actors)", self.registry.len());
        self.shutdown.cancel();
        for (actor, handle) in self.registry.drain() {
            if let Err(e) = handle.join.await {
                warn!("Actor {} worker ended abnormally: {}", actor, e);
            }
        }
        self.stop_reporter();
    }

    fn send(&self, actor: &ActorId, event: ActorEvent) -> bool {
        match self.registry.sender(actor) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                debug!("Dropping event for unknown actor {}", actor);
                false
            }
        }
    }

    /// Start or stop the debug counter reporter to match the current config.
    fn sync_reporter(&self) {
        let config = self.config();
        if !config.debug {
            self.stop_reporter();
            return;
        }
        let Ok(mut reporter) = self.reporter.lock() else {
            return;
        };
        if let Some((cancel, _)) = reporter.take() {
            cancel.cancel();
        }
        let cancel = self.shutdown.child_token();
        let handle = stats::spawn_reporter(
            self.deps.stats.clone(),
            Duration::from_secs(config.debug_report_secs),
            cancel.clone(),
        );
        *reporter = Some((cancel, handle));
    }

    fn stop_reporter(&self) {
        if let Ok(mut reporter) = self.reporter.lock() {
            if let Some((cancel, _)) = reporter.take() {
                cancel.cancel();
            }
        }
    }
}

impl Drop for WeightManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
