//! # Violation Accumulation
//!
//! Two flavours of graduated response shared by every engine.
//!
//! ## Decaying score ([`ViolationAccumulator`])
//!
//! ```text
//! level
//!   ▲        fire ──┐
//! T ┼ ─ ─ ─ ─ ─ ─ ─ ●─ ─ ─ ─ ─ ─ ─ ─ ─ ─
//!   │      ╱        │╲
//! T/2┼ ─ ─╱─ ─ ─ ─ ─ ┘ ╲  linear decay at T / decay_interval per second
//!   │   ╱               ╲
//!   └──┴─────────────────┴──────────────► time
//! ```
//!
//! After firing the level drops to half the threshold rather than zero, so
//! a single burst escalates once while recent misbehavior is still
//! remembered.
//!
//! ## Time-boxed count ([`ViolationBuffer`])
//!
//! Counts discrete violations inside a trailing window, capped in size. The
//! count is compared against externally configured action thresholds.

use std::collections::VecDeque;
use std::time::Duration;

use crate::punishment::PunishmentSink;
use crate::Millis;

/// Level retained after firing, as a fraction of the threshold.
pub const HYSTERESIS_RATIO: f64 = 0.5;

/// Decaying violation score with hysteresis.
#[derive(Clone, Debug)]
pub struct ViolationAccumulator {
    threshold: f64,
    decay_per_second: f64,
    level: f64,
    last_update: Option<Millis>,
}

impl ViolationAccumulator {
    /// Creates an accumulator that fires at `threshold` and fully drains a
    /// threshold's worth of score over `decay_interval`.
    #[must_use]
    pub fn new(threshold: f64, decay_interval: Duration) -> Self {
        let decay_per_second = if threshold <= 0.0 {
            0.0
        } else {
            threshold / decay_interval.as_secs_f64().max(1.0)
        };
        Self {
            threshold,
            decay_per_second,
            level: 0.0,
            last_update: None,
        }
    }

    /// Firing threshold.
    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decay rate in score per second.
    #[inline]
    #[must_use]
    pub const fn decay_per_second(&self) -> f64 {
        self.decay_per_second
    }

    /// Adds `amount` after decaying to `timestamp`.
    ///
    /// Fires `sink` with the pre-reset level when the threshold is reached,
    /// then resets to `threshold * 0.5`. Returns true iff it fired.
    pub fn add_violation(
        &mut self,
        sink: &dyn PunishmentSink,
        subject: &str,
        amount: f64,
        timestamp: Millis,
        reason: &str,
    ) -> bool {
        self.decay(timestamp);
        if amount.is_finite() {
            self.level = (self.level + amount).max(0.0);
        }
        if self.level < self.threshold {
            return false;
        }

        sink.flag_suspect(subject, reason, self.level);
        tracing::warn!(
            "{} escalated: {} (level {:.2} >= {:.2})",
            subject,
            reason,
            self.level,
            self.threshold
        );
        self.level = self.threshold * HYSTERESIS_RATIO;
        true
    }

    /// Decays to `timestamp` and reports the current level.
    pub fn level_at(&mut self, timestamp: Millis) -> f64 {
        self.decay(timestamp);
        self.level
    }

    /// Level as of the last update, without decaying.
    #[inline]
    #[must_use]
    pub const fn level(&self) -> f64 {
        self.level
    }

    /// Clears the score.
    pub fn reset(&mut self) {
        self.level = 0.0;
        self.last_update = None;
    }

    #[allow(clippy::cast_precision_loss)]
    fn decay(&mut self, timestamp: Millis) {
        let Some(previous) = self.last_update else {
            self.last_update = Some(timestamp);
            return;
        };
        // Out-of-order timestamps count as zero elapsed time.
        let elapsed_ms = timestamp.saturating_sub(previous);
        self.last_update = Some(previous.max(timestamp));
        if self.decay_per_second <= 0.0 || elapsed_ms == 0 {
            return;
        }
        let amount = (elapsed_ms as f64 / 1_000.0) * self.decay_per_second;
        self.level = (self.level - amount).max(0.0);
    }
}

/// Time-boxed buffer of discrete violations.
#[derive(Clone, Debug)]
pub struct ViolationBuffer<T> {
    entries: VecDeque<(Millis, T)>,
    decay_window_ms: u64,
    capacity: usize,
}

impl<T> ViolationBuffer<T> {
    /// Creates a buffer that forgets entries older than `decay_window` and
    /// never holds more than `capacity` entries.
    #[must_use]
    pub fn new(decay_window: Duration, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            decay_window_ms: u64::try_from(decay_window.as_millis()).unwrap_or(u64::MAX),
            capacity,
        }
    }

    /// Records a violation observed at `timestamp`.
    pub fn push(&mut self, violation: T, timestamp: Millis) {
        self.entries.push_back((timestamp, violation));
        self.purge(timestamp);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Number of violations still inside the window at `timestamp`.
    pub fn count(&mut self, timestamp: Millis) -> usize {
        self.purge(timestamp);
        self.entries.len()
    }

    /// The most recently recorded violation.
    #[must_use]
    pub fn most_recent(&self) -> Option<&T> {
        self.entries.back().map(|(_, v)| v)
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn purge(&mut self, now: Millis) {
        let cutoff = now.saturating_sub(self.decay_window_ms);
        while self.entries.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.entries.pop_front();
        }
    }
}
