//! Debounce scheduling
//!
//! One `fire_at` deadline and at most one armed timer per actor. A relevant
//! mutation pushes the deadline to `now + window` without touching the
//! armed timer. When the timer runs it re-checks the deadline: if it moved,
//! the timer is re-armed for the remaining delta instead of firing early.
//!
//! The scheduler is a pure state machine over `tokio::time::Instant`; the
//! actor worker owns the actual sleep task.

use std::time::Duration;
use tokio::time::Instant;

pub const MIN_RESCHEDULE: Duration = Duration::from_millis(1);
pub const MAX_RESCHEDULE: Duration = Duration::from_millis(5_000);

/// Instruction to arm a timer. The generation must be handed back to
/// `on_timer` so a timer from a cancelled cycle is recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmTimer {
    pub generation: u64,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Deadline reached: recompute now.
    Fire,
    /// Deadline moved later: arm again.
    Reschedule(ArmTimer),
    /// Stale or cancelled timer.
    Idle,
}

#[derive(Debug)]
pub struct DebounceScheduler {
    window: Duration,
    fire_at: Option<Instant>,
    armed: Option<u64>,
    generation: u64,
}

impl DebounceScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            fire_at: None,
            armed: None,
            generation: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn fire_at(&self) -> Option<Instant> {
        self.fire_at
    }

    pub fn is_pending(&self) -> bool {
        self.fire_at.is_some()
    }

    /// Push the deadline to `now + window`. Returns a timer to arm only when
    /// none is armed yet.
    pub fn bump(&mut self, now: Instant) -> Option<ArmTimer> {
        self.fire_at = Some(now + self.window);
        if self.armed.is_some() {
            return None;
        }
        self.generation = self.generation.wrapping_add(1);
        self.armed = Some(self.generation);
        Some(ArmTimer {
            generation: self.generation,
            delay: self.window,
        })
    }

    pub fn on_timer(&mut self, now: Instant, generation: u64) -> TimerOutcome {
        if self.armed != Some(generation) {
            return TimerOutcome::Idle;
        }
        match self.fire_at {
            None => {
                self.armed = None;
                TimerOutcome::Idle
            }
            Some(at) if at > now => TimerOutcome::Reschedule(ArmTimer {
                generation,
                delay: (at - now).clamp(MIN_RESCHEDULE, MAX_RESCHEDULE),
            }),
            Some(_) => {
                self.fire_at = None;
                self.armed = None;
                TimerOutcome::Fire
            }
        }
    }

    /// Drop the deadline and disown any armed timer.
    pub fn cancel(&mut self) {
        self.fire_at = None;
        self.armed = None;
    }
}
