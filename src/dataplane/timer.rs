//! Cooperative countdown timers
//!
//! Timers never fire on their own; the owner polls `expired(now)` from the
//! periodic sweep. Time is always passed in, which keeps every state machine
//! driven by them deterministic under test.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    start: Instant,
    interval: Duration,
}

impl Timer {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            start: now,
            interval,
        }
    }

    /// Arm with a new interval starting at `now`
    pub fn set(&mut self, now: Instant, interval: Duration) {
        self.start = now;
        self.interval = interval;
    }

    /// Advance by one interval from the previous start (drift-free period)
    pub fn reset(&mut self) {
        self.start += self.interval;
    }

    /// Same interval, starting at `now`
    pub fn restart(&mut self, now: Instant) {
        self.start = now;
    }

    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= self.interval
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.start))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
