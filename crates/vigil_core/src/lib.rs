//! # VIGIL Core - Shared Detection Primitives
//!
//! Building blocks shared by the movement, combat and inventory engines.
//!
//! ## Features
//!
//! - **Rolling Statistics**: time-windowed mean/variance in O(1) per sample
//! - **Empirical Baselines**: acceptable ranges with warm-up grace
//! - **Violation Accumulation**: decaying scores with hysteresis, and
//!   time-boxed violation counts
//! - **Punishment Sinks**: fire-and-forget escalation targets
//! - **Session Tables**: sharded per-entity state with entity-scoped locks
//!
//! ## Flow
//!
//! ```text
//! raw event ──► engine session ──► classification
//!                                       │
//!                                       ▼
//!                           accumulator / buffer ──► PunishmentSink
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod accumulator;
pub mod baseline;
pub mod error;
pub mod math;
pub mod punishment;
pub mod session;
pub mod stats;

pub use accumulator::{ViolationAccumulator, ViolationBuffer, HYSTERESIS_RATIO};
pub use baseline::EmpiricalBaseline;
pub use error::{CoreError, CoreResult};
pub use math::{BlockPos, Vec3};
pub use punishment::{ChannelSink, NullSink, PunishmentManager, PunishmentSink, ViolationRecord};
pub use session::SessionTable;
pub use stats::RollingStatistics;

/// Milliseconds since an arbitrary, host-chosen epoch.
pub type Millis = u64;

/// Stable identity of a connected subject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = std::num::ParseIntError;

    /// Accepts decimal, or hexadecimal with a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map(Self),
            None => s.parse().map(Self),
        }
    }
}
