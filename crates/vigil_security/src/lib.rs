//! # VIGIL Security - Behavioral Detection Engines
//!
//! Server-side classification of movement, combat and inventory events.
//! Engines classify and report; punishment policy belongs to the host.
//!
//! ## Engines
//!
//! - **Movement**: physics prediction with gravity, drag and friction;
//!   tolerance and collision allowances; buffered violations drive ordered
//!   actions, hard rejects set back immediately
//! - **Combat**: rolling rotation and click statistics against empirical
//!   baselines, plus aim-lock and autoclicker pattern heuristics
//! - **Inventory**: deferred snapshot diffing for net item creation and
//!   rapid slot swapping, with restore on detection
//!
//! ## Threading
//!
//! Every engine is `Sync`. Events for different entities may arrive on any
//! thread; updates for one entity are serialized by its session lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_core::PunishmentManager;
//! use vigil_security::{CombatAnalyzer, VigilConfig};
//!
//! let config = VigilConfig::load("vigil.toml")?;
//! let sink = Arc::new(PunishmentManager::new());
//! let combat = CombatAnalyzer::new(config.combat, sink.clone());
//!
//! combat.record_attack(entity, "alice", yaw, pitch, now_ms);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod combat;
pub mod config;
pub mod error;
pub mod inventory;
pub mod movement;

pub use combat::{
    CombatAnalyzer, CombatConfig, Metric, MetricTable, PacketKind, TraceDump, TraceEntry,
};
pub use config::VigilConfig;
pub use error::{ConfigError, ConfigResult};
pub use inventory::{
    DupeAnomaly, InventoryConfig, InventoryHost, InventorySnapshot, InventoryTask,
    InventoryWatcher, ItemKey, ItemMeta, ItemStack, MutationKind, SlotChange, TransactionAlert,
    TransactionVerdict, MAX_SLOTS,
};
pub use movement::{
    ActionThreshold, BlockKind, BypassCheck, MoveCause, MoveEvent, MoveOutcome, MovementAction,
    MovementConfig, MovementMonitor, MovementSample, MovementViolation, NoBypass, OpenAir,
    PermissionBypass, PhysicsConstants, PhysicsValidator, Terrain, Tolerances,
};
