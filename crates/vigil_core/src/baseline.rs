//! # Empirical Baselines
//!
//! Static acceptable ranges for behavioral metrics, chosen from observed
//! legitimate play.

use crate::error::{CoreError, CoreResult};

/// Closed acceptable range for a metric with an optional warm-up grace.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmpiricalBaseline {
    lower: f64,
    upper: f64,
    /// Seconds of observed activity (not wall-clock) before judging a session.
    warmup_grace: f64,
}

impl EmpiricalBaseline {
    /// Creates a baseline with no warm-up grace.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvertedBounds`] if `lower > upper`.
    pub fn new(lower: f64, upper: f64) -> CoreResult<Self> {
        Self::with_grace(lower, upper, 0.0)
    }

    /// Creates a baseline that exempts the first `warmup_grace` seconds of
    /// observed activity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvertedBounds`] if `lower > upper`, or
    /// [`CoreError::NonFinite`] if any argument is NaN.
    pub fn with_grace(lower: f64, upper: f64, warmup_grace: f64) -> CoreResult<Self> {
        if lower.is_nan() || upper.is_nan() {
            return Err(CoreError::NonFinite("baseline bound"));
        }
        if !warmup_grace.is_finite() {
            return Err(CoreError::NonFinite("warm-up grace"));
        }
        if lower > upper {
            return Err(CoreError::InvertedBounds { lower, upper });
        }
        Ok(Self {
            lower,
            upper,
            warmup_grace: warmup_grace.max(0.0),
        })
    }

    /// Lower bound (inclusive).
    #[inline]
    #[must_use]
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper bound (inclusive).
    #[inline]
    #[must_use]
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Warm-up grace in seconds of observed activity.
    #[inline]
    #[must_use]
    pub const fn warmup_grace(&self) -> f64 {
        self.warmup_grace
    }

    /// Returns true iff `lower <= value <= upper`.
    #[inline]
    #[must_use]
    pub fn is_within(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Returns true once `activity_seconds` has cleared the warm-up grace.
    #[inline]
    #[must_use]
    pub fn is_warmed_up(&self, activity_seconds: f64) -> bool {
        activity_seconds >= self.warmup_grace
    }
}
