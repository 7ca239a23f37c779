//! Debug counters, shared by every actor worker of one manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Default)]
pub struct WeightStats {
    events_seen: AtomicU64,
    events_relevant: AtomicU64,
    recomputes_queued: AtomicU64,
    recomputes_applied: AtomicU64,
    full_rebuilds: AtomicU64,
    slot_recomputes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events_seen: u64,
    pub events_relevant: u64,
    pub recomputes_queued: u64,
    pub recomputes_applied: u64,
    pub full_rebuilds: u64,
    pub slot_recomputes: u64,
}

impl WeightStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_seen(&self) {
        self.events_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_relevant(&self) {
        self.events_relevant.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recompute_queued(&self) {
        self.recomputes_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recompute_applied(&self) {
        self.recomputes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn full_rebuild(&self) {
        self.full_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slots_recomputed(&self, n: usize) {
        self.slot_recomputes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            events_relevant: self.events_relevant.load(Ordering::Relaxed),
            recomputes_queued: self.recomputes_queued.load(Ordering::Relaxed),
            recomputes_applied: self.recomputes_applied.load(Ordering::Relaxed),
            full_rebuilds: self.full_rebuilds.load(Ordering::Relaxed),
            slot_recomputes: self.slot_recomputes.load(Ordering::Relaxed),
        }
    }

    /// Read and zero every counter.
    pub fn take(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_seen: self.events_seen.swap(0, Ordering::Relaxed),
            events_relevant: self.events_relevant.swap(0, Ordering::Relaxed),
            recomputes_queued: self.recomputes_queued.swap(0, Ordering::Relaxed),
            recomputes_applied: self.recomputes_applied.swap(0, Ordering::Relaxed),
            full_rebuilds: self.full_rebuilds.swap(0, Ordering::Relaxed),
            slot_recomputes: self.slot_recomputes.swap(0, Ordering::Relaxed),
        }
    }
}

/// Log and reset the counters every `interval` until `cancel` fires.
pub fn spawn_reporter(
    stats: Arc<WeightStats>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let s = stats.take();
                    info!(
                        events_seen = s.events_seen,
                        events_relevant = s.events_relevant,
                        recomputes_queued = s.recomputes_queued,
                        recomputes_applied = s.recomputes_applied,
                        full_rebuilds = s.full_rebuilds,
                        slot_recomputes = s.slot_recomputes,
                        "weight debug counters"
                    );
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
