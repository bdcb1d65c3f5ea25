//! Cooperative, deadline-based scheduler for continuous running.
//!
//! The scheduler never spawns threads or owns callbacks. The host polls it with the current
//! time and performs a step when a tick is due, the same way a terminal UI polls for input
//! with a timeout and advances the machine afterwards. Cancelling drops the only pending
//! deadline, so nothing can fire after `stop`.

use std::time::{Duration, Instant};

/// A live repeating timer. Exists only while the scheduler is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    next_tick: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    interval: Duration,
    timer: Option<Timer>,
}

impl Scheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timer: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Changes the interval. A running timer picks it up when it schedules its next tick.
    pub fn set_interval(&mut self, interval_ms: u64) {
        self.interval = Duration::from_millis(interval_ms);
    }

    /// Starts the repeating timer with its first tick one interval after `now`.
    ///
    /// Returns `false` without touching the pending deadline if already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.timer.is_some() {
            return false;
        }

        self.timer = Some(Timer {
            next_tick: now + self.interval,
        });
        true
    }

    /// Cancels the timer. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// The instant the next tick is due, if running.
    pub fn next_tick(&self) -> Option<Instant> {
        self.timer.map(|t| t.next_tick)
    }

    /// Time left until the next tick, zero if it is already due.
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_tick()
            .map(|next| next.saturating_duration_since(now))
    }

    /// Returns `true` if a tick is due at `now` and schedules the following one.
    ///
    /// At most one tick fires per call; missed ticks are not replayed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let interval = self.interval;
        match self.timer.as_mut() {
            Some(timer) if now >= timer.next_tick => {
                timer.next_tick = now + interval;
                true
            }
            _ => false,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(crate::types::DEFAULT_SPEED_MS)
    }
}
