//! # Rolling Statistics
//!
//! Time-windowed sample buffer with O(1) amortized insert and evict.
//!
//! ## Design
//!
//! - Window is a time span, not a sample count
//! - Running sum and sum of squares are maintained incrementally
//! - Eviction is oldest-first: retained timestamps never decrease
//! - A timestamp older than the previous one counts as zero elapsed time;
//!   later samples advance from there
//!
//! ```text
//!   evicted          retained window
//! ─────────┼───────────────────────────────┤
//!      now - window                       now
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use crate::Millis;

/// A single timestamped sample.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Sample {
    timestamp: Millis,
    value: f64,
}

/// Rolling window of numeric samples with descriptive statistics.
#[derive(Clone, Debug)]
pub struct RollingStatistics {
    /// Window length in milliseconds.
    window_ms: u64,
    /// Retained samples, oldest first.
    samples: VecDeque<Sample>,
    /// Running sum of retained values.
    sum: f64,
    /// Running sum of squared retained values.
    sum_squares: f64,
    /// Caller timestamp of the previous sample.
    last_input: Option<Millis>,
    /// Window clock; advances by the clamped elapsed time between inputs.
    clock: Millis,
}

impl RollingStatistics {
    /// Creates an empty rolling window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            samples: VecDeque::new(),
            sum: 0.0,
            sum_squares: 0.0,
            last_input: None,
            clock: 0,
        }
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Inserts a sample and evicts everything older than `now - window`.
    ///
    /// `now` is `timestamp` for in-order input. A backward step in
    /// `timestamp` is clamped to zero elapsed time, so the window clock never
    /// runs backwards.
    pub fn add_sample(&mut self, value: f64, timestamp: Millis) {
        if !value.is_finite() {
            return;
        }
        let now = self.advance_clock(timestamp);
        self.samples.push_back(Sample {
            timestamp: now,
            value,
        });
        self.sum += value;
        self.sum_squares += value * value;
        self.evict_before(now.saturating_sub(self.window_ms));
    }

    /// Number of retained samples.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are retained.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of retained samples, 0 when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum / self.samples.len() as f64
    }

    /// Population variance of retained samples, 0 when empty.
    ///
    /// Computed as `max(0, E[x²] - E[x]²)`; the clamp absorbs negative
    /// results from floating-point cancellation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn variance(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_squares / self.samples.len() as f64 - mean * mean).max(0.0)
    }

    /// Standard deviation of retained samples.
    #[must_use]
    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Drops every retained sample.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
        self.sum_squares = 0.0;
    }

    fn advance_clock(&mut self, timestamp: Millis) -> Millis {
        self.clock = match self.last_input {
            Some(last) => self.clock.saturating_add(timestamp.saturating_sub(last)),
            None => timestamp,
        };
        self.last_input = Some(timestamp);
        self.clock
    }

    fn evict_before(&mut self, threshold: Millis) {
        while let Some(front) = self.samples.front().copied() {
            if front.timestamp >= threshold {
                break;
            }
            self.samples.pop_front();
            self.sum -= front.value;
            self.sum_squares -= front.value * front.value;
        }
        if self.samples.is_empty() {
            // Reset accumulated cancellation error.
            self.sum = 0.0;
            self.sum_squares = 0.0;
        }
    }
}
