//! Scripted scenarios: a catalog, some actors, and timed inventory changes.
//!
//! A scenario drives a live `WeightManager` in (tokio) real time and
//! collects every published sync event, so a config can be tried out
//! without a host.
//!
//! ```json
//! {
//!   "catalog": { "backpack": { "bag_effectiveness": 0.5 } },
//!   "actors": [
//!     { "id": "alice", "layout": { "bags": [4] },
//!       "main": [ { "slot": 16, "code": "backpack", "size": 1 } ] }
//!   ],
//!   "steps": [
//!     { "at_ms": 100, "actor": 0, "action": "set", "container": "main",
//!       "slot": 17, "stack": { "code": "ingot-iron", "size": 20 } }
//!   ]
//! }
//! ```

use anyhow::{bail, Context};
use packweight_core::{
    ActorId, ContainerKind, Inventory, ItemStack, Mutation, StaticCatalog, StaticStats,
    SyncEvent, WeightConfig,
};
use packweight_engine::WeightManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub catalog: StaticCatalog,
    pub actors: Vec<ScenarioActor>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// How long to keep running after the last step.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioActor {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub fast_access: Vec<Placed>,
    #[serde(default)]
    pub main: Vec<Placed>,
    /// Initial stat blends, keyed by stat name.
    #[serde(default)]
    pub stats: HashMap<String, f64>,
}

/// Main container shape, see `Inventory::with_layout`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub fast_access: usize,
    pub plain: usize,
    pub bags: Vec<usize>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            fast_access: 10,
            plain: 16,
            bags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Placed {
    pub slot: usize,
    #[serde(flatten)]
    pub stack: ItemStack,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    /// Index into `actors`.
    pub actor: usize,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Replace a slot's stack and notify that slot.
    Set {
        container: ContainerKind,
        slot: usize,
        #[serde(default)]
        stack: Option<ItemStack>,
    },
    /// Notify without changing anything; a negative slot means the whole container.
    Notify { container: ContainerKind, slot: i64 },
    /// Change a stat blend and notify.
    Stat { key: String, blend: f64 },
    Leave,
}

/// Final state of one actor after the scenario settles.
#[derive(Debug, Clone, Serialize)]
pub struct ActorSummary {
    pub actor: ActorId,
    pub raw_mass: f64,
    pub effective_mass: f64,
    pub multiplier: f64,
    pub recomputes: u64,
}

#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub events: Vec<SyncEvent>,
    pub actors: Vec<ActorSummary>,
}

fn default_settle_ms() -> u64 {
    500
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = serde_json::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            if step.actor >= self.actors.len() {
                bail!(
                    "step {} targets actor {} but only {} are defined",
                    i,
                    step.actor,
                    self.actors.len()
                );
            }
        }
        Ok(())
    }

    /// Run to completion and return everything that was published.
    pub async fn run(self, config: WeightConfig) -> anyhow::Result<ScenarioReport> {
        let stats = Arc::new(StaticStats::new());
        let manager = WeightManager::new(config, Arc::new(self.catalog), stats.clone());
        let mut rx = manager.subscribe();
        let collector = tokio::spawn(async move {
            let mut events = Vec::new();
            loop {
                match rx.recv().await {
                    Ok(event) => events.push(event),
                    Err(RecvError::Lagged(n)) => warn!("Scenario output lagged; {} events lost", n),
                    Err(RecvError::Closed) => break,
                }
            }
            events
        });

        let mut joined = Vec::with_capacity(self.actors.len());
        for actor in self.actors {
            let id = ActorId::new(
                actor
                    .id
                    .unwrap_or_else(|| format!("actor-{}", uuid::Uuid::new_v4())),
            );
            for (key, blend) in &actor.stats {
                stats.set(&id, key.as_str(), *blend);
            }
            let inventory = build_inventory(&actor.layout, actor.fast_access, actor.main)
                .with_context(|| format!("building inventory for {}", id))?;
            manager.join(id.clone(), inventory.into_shared())?;
            joined.push(id);
        }
        info!("Scenario started with {} actors", joined.len());

        let mut steps = self.steps;
        steps.sort_by_key(|s| s.at_ms);
        let start = Instant::now();
        for step in steps {
            sleep_until(start + Duration::from_millis(step.at_ms)).await;
            let id = &joined[step.actor];
            apply(&manager, &stats, id, step.action);
        }
        sleep(Duration::from_millis(self.settle_ms)).await;

        let mut actors = Vec::new();
        for id in &joined {
            // Actors that left have nothing to report.
            if let Ok(snap) = manager.snapshot(id).await {
                actors.push(ActorSummary {
                    actor: snap.actor,
                    raw_mass: snap.totals.raw,
                    effective_mass: snap.totals.effective,
                    multiplier: snap.multiplier,
                    recomputes: snap.recomputes,
                });
            }
        }

        manager.shutdown().await;
        drop(manager);
        let events = collector.await?;
        Ok(ScenarioReport { events, actors })
    }
}

fn build_inventory(
    layout: &Layout,
    fast_access: Vec<Placed>,
    main: Vec<Placed>,
) -> anyhow::Result<Inventory> {
    let mut inventory = Inventory::with_layout(layout.fast_access, layout.plain, &layout.bags);
    for (kind, placed) in [
        (ContainerKind::FastAccess, fast_access),
        (ContainerKind::Main, main),
    ] {
        let container = inventory.container_mut(kind);
        for p in placed {
            if p.slot >= container.len() {
                bail!(
                    "slot {} out of range for {} (len {})",
                    p.slot,
                    kind,
                    container.len()
                );
            }
            container.set(p.slot, Some(p.stack));
        }
    }
    Ok(inventory)
}

fn apply(manager: &WeightManager, stats: &StaticStats, id: &ActorId, action: Action) {
    match action {
        Action::Set {
            container,
            slot,
            stack,
        } => {
            let Some(inventory) = manager.inventory(id) else {
                debug!("Step for departed actor {} skipped", id);
                return;
            };
            match inventory.write() {
                Ok(mut inv) => {
                    inv.container_mut(container).set(slot, stack);
                }
                Err(_) => {
                    warn!("Inventory lock poisoned for {}; step skipped", id);
                    return;
                }
            }
            manager.notify(id, Mutation::slot(container, slot));
        }
        Action::Notify { container, slot } => {
            manager.notify_raw(id, container, slot);
        }
        Action::Stat { key, blend } => {
            stats.set(id, key, blend);
            manager.notify_stats_changed(id);
        }
        Action::Leave => {
            manager.leave(id);
        }
    }
}
