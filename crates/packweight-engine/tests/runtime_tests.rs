//! Runtime tests for the manager and actor workers
//!
//! All tests run on a paused clock so debounce timing is exact.

use packweight_core::*;
use packweight_engine::curve::START_MASS_STAT;
use packweight_engine::{CacheState, WeightManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

fn catalog() -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog::new().with(
        "backpack",
        ItemInfo {
            mass: Some(0.0),
            bag_effectiveness: Some(0.5),
            ..Default::default()
        },
    ))
}

fn config() -> WeightConfig {
    let mut config = WeightConfig::default();
    config.weight_rules.exact.insert("lead".into(), 10.0);
    config
}

fn manager_with(config: WeightConfig, stats: Arc<StaticStats>) -> WeightManager {
    WeightManager::new(config, catalog(), stats)
}

/// 6 lead in the fast-access row: 60 mass, multiplier 0.8.
fn heavy_inventory() -> SharedInventory {
    let mut inv = Inventory::with_layout(8, 4, &[4]);
    inv.fast_access.set(0, Some(ItemStack::new("lead", 6)));
    inv.into_shared()
}

fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn value_of(events: &[SyncEvent], wanted: SyncKey) -> Option<f64> {
    events.iter().rev().find_map(|e| match e {
        SyncEvent::Value { key, value, .. } if *key == wanted => Some(*value),
        _ => None,
    })
}

// ============================================================
// Join / leave
// ============================================================

#[tokio::test(start_paused = true)]
async fn join_publishes_initial_values() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");

    manager.join(actor.clone(), heavy_inventory()).unwrap();
    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.recomputes, 1);
    assert_eq!(snap.state, CacheState::Consistent);
    assert!((snap.totals.raw - 60.0).abs() < 1e-9);
    assert!((snap.multiplier - 0.8).abs() < 1e-9);

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| e.actor() == &actor));
    assert!((value_of(&events, SyncKey::EffectiveMass).unwrap() - 60.0).abs() < 1e-9);
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::MovementModifier { id, value, .. }
            if id == MOVEMENT_MODIFIER_ID && (*value + 0.2).abs() < 1e-9
    )));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_join_is_rejected() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let actor = ActorId::new("p1");
    manager.join(actor.clone(), heavy_inventory()).unwrap();
    let err = manager.join(actor.clone(), heavy_inventory()).unwrap_err();
    assert!(matches!(err, Error::ActorExists(_)));
    assert_eq!(manager.actor_count(), 1);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_actor_is_ignored() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let ghost = ActorId::new("ghost");
    assert!(!manager.notify(&ghost, Mutation::slot(ContainerKind::Main, 0)));
    assert!(!manager.notify_stats_changed(&ghost));
    assert!(!manager.leave(&ghost));
    assert!(matches!(
        manager.snapshot(&ghost).await,
        Err(Error::UnknownActor(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn nothing_is_published_after_leave() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");
    let inv = heavy_inventory();
    manager.join(actor.clone(), inv.clone()).unwrap();
    manager.snapshot(&actor).await.unwrap();
    drain(&mut rx);

    inv.write()
        .unwrap()
        .fast_access
        .set(1, Some(ItemStack::new("lead", 3)));
    assert!(manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 1)));
    assert!(manager.leave(&actor));
    assert!(!manager.contains(&actor));

    sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut rx).is_empty());
    assert!(!manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 1)));
}

// ============================================================
// Debounce
// ============================================================

#[tokio::test(start_paused = true)]
async fn burst_coalesces_into_one_recompute() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let actor = ActorId::new("p1");
    let inv = heavy_inventory();
    manager.join(actor.clone(), inv.clone()).unwrap();
    assert_eq!(manager.snapshot(&actor).await.unwrap().recomputes, 1);

    let start = Instant::now();
    for i in 0..5 {
        inv.write()
            .unwrap()
            .fast_access
            .set(i + 1, Some(ItemStack::new("pebble", 10)));
        manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, i + 1));
        sleep(Duration::from_millis(50)).await;
    }

    // Last mutation at +200ms; window 125ms.
    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.recomputes, 1);
    assert!(snap.pending_recompute);

    sleep(Duration::from_millis(200)).await;
    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.recomputes, 2);
    assert!(!snap.pending_recompute);
    let fired = snap.last_recompute_at.unwrap() - start;
    let expected = Duration::from_millis(325);
    assert!(
        fired >= expected - Duration::from_millis(2) && fired <= expected + Duration::from_millis(2),
        "fired at {fired:?}"
    );
    assert!((snap.totals.raw - 65.0).abs() < 1e-9);

    let stats = manager.stats();
    assert_eq!(stats.events_seen, 5);
    assert_eq!(stats.events_relevant, 5);
    assert_eq!(stats.recomputes_queued, 1);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn irrelevant_mutation_schedules_nothing() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let actor = ActorId::new("p1");
    let inv = heavy_inventory();
    manager.join(actor.clone(), inv.clone()).unwrap();
    manager.snapshot(&actor).await.unwrap();

    // Same stack, cosmetic attribute only.
    inv.write().unwrap().fast_access.set(
        0,
        Some(ItemStack::new("lead", 6).with_attribute("tint", serde_json::json!("grey"))),
    );
    manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 0));
    sleep(Duration::from_secs(1)).await;

    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.recomputes, 1);
    let stats = manager.stats();
    assert_eq!(stats.events_seen, 1);
    assert_eq!(stats.events_relevant, 0);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn whole_container_notification_rebuilds() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let actor = ActorId::new("p1");
    let inv = heavy_inventory();
    manager.join(actor.clone(), inv.clone()).unwrap();
    manager.snapshot(&actor).await.unwrap();

    {
        let mut guard = inv.write().unwrap();
        guard.main.set(4, Some(ItemStack::new("backpack", 1)));
        guard.main.set(5, Some(ItemStack::new("lead", 2)));
    }
    assert!(manager.notify_raw(&actor, ContainerKind::Main, -1));
    sleep(Duration::from_millis(200)).await;

    let snap = manager.snapshot(&actor).await.unwrap();
    assert!((snap.totals.raw - 80.0).abs() < 1e-9);
    assert!((snap.totals.effective - 70.0).abs() < 1e-9);
    assert_eq!(manager.stats().full_rebuilds, 2);
    manager.shutdown().await;
}

// ============================================================
// Stats, config, disabled mode
// ============================================================

#[tokio::test(start_paused = true)]
async fn stat_change_shifts_the_curve() {
    let stats = Arc::new(StaticStats::new());
    let manager = manager_with(config(), stats.clone());
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");
    manager.join(actor.clone(), heavy_inventory()).unwrap();
    manager.snapshot(&actor).await.unwrap();
    drain(&mut rx);

    stats.set(&actor, START_MASS_STAT, 31.0);
    assert!(manager.notify_stats_changed(&actor));
    sleep(Duration::from_millis(200)).await;

    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.multiplier, 1.0);
    let events = drain(&mut rx);
    assert_eq!(value_of(&events, SyncKey::StartMass), Some(60.0));
    assert_eq!(value_of(&events, SyncKey::TraitModifierCount), Some(1.0));
    assert_eq!(value_of(&events, SyncKey::MovementMultiplier), Some(1.0));
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_config_publishes_neutral_values() {
    let mut disabled = config();
    disabled.enabled = false;
    let manager = manager_with(disabled, Arc::new(StaticStats::new()));
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");
    manager.join(actor.clone(), heavy_inventory()).unwrap();
    manager.snapshot(&actor).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(value_of(&events, SyncKey::EffectiveMass), Some(0.0));
    assert_eq!(value_of(&events, SyncKey::MovementMultiplier), Some(1.0));
    assert_eq!(value_of(&events, SyncKey::EncumbranceFraction), Some(0.0));

    // Mutations are ignored while disabled.
    manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 0));
    sleep(Duration::from_secs(1)).await;
    assert!(!manager.snapshot(&actor).await.unwrap().pending_recompute);
    assert!(drain(&mut rx).is_empty());
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn config_reload_applies_to_live_actors() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");
    manager.join(actor.clone(), heavy_inventory()).unwrap();
    manager.snapshot(&actor).await.unwrap();
    drain(&mut rx);

    let mut lighter = config();
    lighter.weight_rules.exact.insert("lead".into(), 1.0);
    manager.set_config(lighter);
    let snap = manager.snapshot(&actor).await.unwrap();
    assert!((snap.totals.raw - 6.0).abs() < 1e-9);
    assert_eq!(snap.multiplier, 1.0);
    assert_eq!(manager.config().weight_rules.exact.get("lead"), Some(&1.0));

    let mut off = config();
    off.enabled = false;
    manager.set_config(off);
    manager.snapshot(&actor).await.unwrap();
    let events = drain(&mut rx);
    assert_eq!(value_of(&events, SyncKey::RawMass), Some(0.0));

    manager.set_config(config());
    let snap = manager.snapshot(&actor).await.unwrap();
    assert!((snap.multiplier - 0.8).abs() < 1e-9);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn actors_are_isolated() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let a = ActorId::new("a");
    let b = ActorId::new("b");
    let inv_a = heavy_inventory();
    manager.join(a.clone(), inv_a.clone()).unwrap();
    manager
        .join(b.clone(), Inventory::with_layout(4, 2, &[]).into_shared())
        .unwrap();

    inv_a.write().unwrap().fast_access.set(0, None);
    manager.notify(&a, Mutation::slot(ContainerKind::FastAccess, 0));
    sleep(Duration::from_millis(200)).await;

    let snap_a = manager.snapshot(&a).await.unwrap();
    let snap_b = manager.snapshot(&b).await.unwrap();
    assert_eq!(snap_a.totals.raw, 0.0);
    assert_eq!(snap_a.recomputes, 2);
    assert_eq!(snap_b.recomputes, 1);

    let mut ids = manager.actors();
    ids.sort();
    assert_eq!(ids, vec![a, b]);

    manager.shutdown().await;
    assert_eq!(manager.actor_count(), 0);
}

// ============================================================
// Failure absorption
// ============================================================

/// Catalog whose next lookup can be made to panic.
struct FlakyCatalog {
    inner: StaticCatalog,
    fail_next: AtomicBool,
}

impl ItemCatalog for FlakyCatalog {
    fn lookup(&self, code: &str) -> Option<ItemInfo> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            panic!("catalog backend unavailable");
        }
        self.inner.lookup(code)
    }
}

#[tokio::test(start_paused = true)]
async fn poisoned_inventory_lock_recovers_on_next_notification() {
    let manager = manager_with(config(), Arc::new(StaticStats::new()));
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");
    let inv = heavy_inventory();
    manager.join(actor.clone(), inv.clone()).unwrap();
    manager.snapshot(&actor).await.unwrap();
    drain(&mut rx);

    let writer = inv.clone();
    let crashed = std::thread::spawn(move || {
        let _guard = writer.write().unwrap();
        panic!("host writer crashed mid-update");
    })
    .join();
    assert!(crashed.is_err());
    assert!(inv.is_poisoned());

    inv.write()
        .unwrap_or_else(PoisonError::into_inner)
        .fast_access
        .set(0, None);
    assert!(manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 0)));
    sleep(Duration::from_millis(200)).await;

    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.totals.raw, 0.0);
    assert_eq!(snap.recomputes, 2);
    assert_eq!(snap.multiplier, 1.0);
    assert!(!inv.is_poisoned());

    let stats = manager.stats();
    assert_eq!(stats.events_relevant, 1);
    assert_eq!(stats.full_rebuilds, 2);
    assert_eq!(value_of(&drain(&mut rx), SyncKey::RawMass), Some(0.0));

    // Back to incremental patching once the poison is cleared.
    inv.write()
        .unwrap()
        .fast_access
        .set(1, Some(ItemStack::new("lead", 1)));
    manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 1));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.snapshot(&actor).await.unwrap().totals.raw, 10.0);
    assert_eq!(manager.stats().full_rebuilds, 2);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_recompute_is_skipped_then_rebuilt() {
    let catalog = Arc::new(FlakyCatalog {
        inner: StaticCatalog::new(),
        fail_next: AtomicBool::new(false),
    });
    let manager = WeightManager::new(config(), catalog.clone(), Arc::new(StaticStats::new()));
    let mut rx = manager.subscribe();
    let actor = ActorId::new("p1");
    let inv = heavy_inventory();
    manager.join(actor.clone(), inv.clone()).unwrap();
    assert_eq!(manager.snapshot(&actor).await.unwrap().recomputes, 1);
    drain(&mut rx);

    // "pebble" is not memoized yet, so the patch must consult the catalog.
    catalog.fail_next.store(true, Ordering::SeqCst);
    inv.write()
        .unwrap()
        .fast_access
        .set(1, Some(ItemStack::new("pebble", 10)));
    manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 1));
    sleep(Duration::from_millis(200)).await;

    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.recomputes, 1);
    assert_eq!(snap.state, CacheState::RebuildPending);
    assert!(drain(&mut rx).is_empty());

    inv.write()
        .unwrap()
        .fast_access
        .set(2, Some(ItemStack::new("pebble", 10)));
    manager.notify(&actor, Mutation::slot(ContainerKind::FastAccess, 2));
    sleep(Duration::from_millis(200)).await;

    let snap = manager.snapshot(&actor).await.unwrap();
    assert_eq!(snap.recomputes, 2);
    assert_eq!(snap.state, CacheState::Consistent);
    assert!((snap.totals.raw - 62.0).abs() < 1e-9);
    let events = drain(&mut rx);
    assert!((value_of(&events, SyncKey::RawMass).unwrap() - 62.0).abs() < 1e-9);
    manager.shutdown().await;
}
