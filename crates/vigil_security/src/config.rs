//! # Engine Configuration
//!
//! TOML-backed configuration for all three engines, loaded once at startup.
//!
//! ```toml
//! [movement]
//! bypass-permission = "anticheat.movement.bypass"
//!
//! [movement.physics]
//! gravity = 0.08
//!
//! [movement.thresholds]
//! horizontal-percent = 15
//!
//! [movement.violations]
//! decay-seconds = 8
//!
//! [[movement.violations.triggers]]
//! type = "notify"
//! threshold = 3
//!
//! [combat.baselines.clicks-per-second]
//! lower = 3.0
//! upper = 13.5
//!
//! [inventory.cooldown-exemptions]
//! "0x2a" = 0
//! ```
//!
//! The movement `physics`, `thresholds` and `violations` sections are
//! required. Everything else falls back to defaults.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use vigil_core::{EmpiricalBaseline, EntityId};

use crate::combat::{CombatConfig, Metric};
use crate::error::{ConfigError, ConfigResult};
use crate::inventory::InventoryConfig;
use crate::movement::{
    ActionThreshold, MovementAction, MovementConfig, PhysicsConstants, Tolerances,
};

/// Configuration for every engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VigilConfig {
    /// Movement physics validation.
    pub movement: MovementConfig,
    /// Combat packet analysis.
    pub combat: CombatConfig,
    /// Inventory transaction watching.
    pub inventory: InventoryConfig,
}

impl VigilConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML, a missing required section, an
    /// inverted baseline or an out-of-range value.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let raw: RawConfig = toml::from_str(text)?;
        let movement = raw
            .movement
            .ok_or(ConfigError::MissingSection("movement"))?
            .build()?;
        let combat = raw.combat.unwrap_or_default().build()?;
        let inventory = raw.inventory.unwrap_or_default().build()?;
        Ok(Self {
            movement,
            combat,
            inventory,
        })
    }
}

fn seconds(key: &str, value: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative number of seconds, got {value}")))
}

// ============================================================================
// Raw file layout
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    movement: Option<RawMovement>,
    combat: Option<RawCombat>,
    inventory: Option<RawInventory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMovement {
    physics: Option<RawPhysics>,
    thresholds: Option<RawThresholds>,
    violations: Option<RawViolations>,
    bypass_permission: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPhysics {
    gravity: Option<f64>,
    air_drag: Option<f64>,
    ground_friction: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawThresholds {
    horizontal_percent: Option<f64>,
    vertical_percent: Option<f64>,
    collision_horizontal_bonus: Option<f64>,
    collision_vertical_bonus: Option<f64>,
    minimum_horizontal: Option<f64>,
    minimum_vertical: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawViolations {
    decay_seconds: Option<u64>,
    max_buffer: Option<usize>,
    #[serde(default)]
    triggers: Vec<RawTrigger>,
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_trigger_threshold")]
    threshold: usize,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

const fn default_trigger_threshold() -> usize {
    3
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCombat {
    rolling_window_seconds: Option<f64>,
    violation_decay_seconds: Option<f64>,
    trace_capacity: Option<usize>,
    yaw_lock_epsilon: Option<f64>,
    yaw_lock_window: Option<usize>,
    constant_cps_window: Option<usize>,
    constant_cps_min: Option<f64>,
    constant_cps_max: Option<f64>,
    constant_cps_max_stddev_ms: Option<f64>,
    strikes_to_escalate: Option<u32>,
    heuristic_increment: Option<f64>,
    activity_clamp_seconds: Option<f64>,
    #[serde(default)]
    baselines: RawBaselines,
    #[serde(default)]
    thresholds: RawMetricThresholds,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawBaselines {
    rotations_per_second: Option<RawBaseline>,
    rotation_variance: Option<RawBaseline>,
    clicks_per_second: Option<RawBaseline>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawBaseline {
    lower: f64,
    upper: f64,
    #[serde(default = "default_warmup_grace")]
    warmup_grace: f64,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

const fn default_warmup_grace() -> f64 {
    1.0
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMetricThresholds {
    rotations_per_second: Option<f64>,
    rotation_variance: Option<f64>,
    clicks_per_second: Option<f64>,
    perfect_yaw_lock: Option<f64>,
    constant_cps: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawInventory {
    max_swaps_per_second: Option<usize>,
    dupe_threshold: Option<u64>,
    alert_cooldown: Option<f64>,
    #[serde(default)]
    cooldown_exemptions: HashMap<String, f64>,
}

// ============================================================================
// Validation
// ============================================================================

impl RawMovement {
    fn build(self) -> ConfigResult<MovementConfig> {
        let physics = self
            .physics
            .ok_or(ConfigError::MissingSection("movement.physics"))?;
        let thresholds = self
            .thresholds
            .ok_or(ConfigError::MissingSection("movement.thresholds"))?;
        let violations = self
            .violations
            .ok_or(ConfigError::MissingSection("movement.violations"))?;

        let defaults = MovementConfig::default();
        let p = defaults.physics;
        let t = defaults.tolerances;
        let physics = PhysicsConstants {
            gravity: physics.gravity.unwrap_or(p.gravity),
            air_drag: physics.air_drag.unwrap_or(p.air_drag),
            ground_friction: physics.ground_friction.unwrap_or(p.ground_friction),
        };
        let tolerances = Tolerances {
            horizontal_percent: thresholds.horizontal_percent.unwrap_or(t.horizontal_percent),
            vertical_percent: thresholds.vertical_percent.unwrap_or(t.vertical_percent),
            collision_horizontal_bonus: thresholds
                .collision_horizontal_bonus
                .unwrap_or(t.collision_horizontal_bonus),
            collision_vertical_bonus: thresholds
                .collision_vertical_bonus
                .unwrap_or(t.collision_vertical_bonus),
            minimum_horizontal: thresholds.minimum_horizontal.unwrap_or(t.minimum_horizontal),
            minimum_vertical: thresholds.minimum_vertical.unwrap_or(t.minimum_vertical),
        };

        let numbers = [
            ("movement.physics.gravity", physics.gravity),
            ("movement.physics.air-drag", physics.air_drag),
            ("movement.physics.ground-friction", physics.ground_friction),
            ("movement.thresholds.horizontal-percent", tolerances.horizontal_percent),
            ("movement.thresholds.vertical-percent", tolerances.vertical_percent),
            ("movement.thresholds.minimum-horizontal", tolerances.minimum_horizontal),
            ("movement.thresholds.minimum-vertical", tolerances.minimum_vertical),
        ];
        if let Some((key, value)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{key} must be finite, got {value}")));
        }
        let allowances = [
            ("movement.thresholds.horizontal-percent", tolerances.horizontal_percent),
            ("movement.thresholds.vertical-percent", tolerances.vertical_percent),
            (
                "movement.thresholds.collision-horizontal-bonus",
                tolerances.collision_horizontal_bonus,
            ),
            (
                "movement.thresholds.collision-vertical-bonus",
                tolerances.collision_vertical_bonus,
            ),
            ("movement.thresholds.minimum-horizontal", tolerances.minimum_horizontal),
            ("movement.thresholds.minimum-vertical", tolerances.minimum_vertical),
        ];
        if let Some((key, value)) = allowances
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "{key} must be a finite non-negative number, got {value}"
            )));
        }

        let actions = violations
            .triggers
            .into_iter()
            .filter(|trigger| trigger.enabled)
            .map(|trigger| ActionThreshold {
                action: MovementAction::parse(&trigger.kind),
                threshold: trigger.threshold,
            })
            .collect();

        Ok(MovementConfig {
            physics,
            tolerances,
            violation_decay: violations
                .decay_seconds
                .map_or(defaults.violation_decay, Duration::from_secs),
            violation_capacity: violations.max_buffer.unwrap_or(defaults.violation_capacity),
            actions,
            bypass_permission: self.bypass_permission.unwrap_or(defaults.bypass_permission),
        })
    }
}

impl RawCombat {
    fn build(self) -> ConfigResult<CombatConfig> {
        let mut config = CombatConfig::default();

        if let Some(v) = self.rolling_window_seconds {
            config.rolling_window = seconds("combat.rolling-window-seconds", v)?;
        }
        if let Some(v) = self.violation_decay_seconds {
            config.violation_decay = seconds("combat.violation-decay-seconds", v)?;
        }
        if let Some(v) = self.activity_clamp_seconds {
            config.activity_clamp = seconds("combat.activity-clamp-seconds", v)?;
        }
        config.trace_capacity = self.trace_capacity.unwrap_or(config.trace_capacity);
        config.yaw_lock_epsilon = self.yaw_lock_epsilon.unwrap_or(config.yaw_lock_epsilon);
        config.yaw_lock_window = self.yaw_lock_window.unwrap_or(config.yaw_lock_window);
        config.constant_cps_window = self.constant_cps_window.unwrap_or(config.constant_cps_window);
        config.constant_cps_min = self.constant_cps_min.unwrap_or(config.constant_cps_min);
        config.constant_cps_max = self.constant_cps_max.unwrap_or(config.constant_cps_max);
        config.constant_cps_max_stddev_ms = self
            .constant_cps_max_stddev_ms
            .unwrap_or(config.constant_cps_max_stddev_ms);
        config.strikes_to_escalate = self.strikes_to_escalate.unwrap_or(config.strikes_to_escalate);
        config.heuristic_increment = self.heuristic_increment.unwrap_or(config.heuristic_increment);

        if config.constant_cps_min > config.constant_cps_max {
            return Err(ConfigError::Invalid(format!(
                "combat.constant-cps-min {} exceeds constant-cps-max {}",
                config.constant_cps_min, config.constant_cps_max
            )));
        }

        let baselines = [
            (Metric::RotationsPerSecond, self.baselines.rotations_per_second),
            (Metric::RotationVariance, self.baselines.rotation_variance),
            (Metric::ClicksPerSecond, self.baselines.clicks_per_second),
        ];
        for (metric, raw) in baselines {
            let Some(raw) = raw else { continue };
            config.baselines[metric] = if raw.enabled {
                let baseline = EmpiricalBaseline::with_grace(raw.lower, raw.upper, raw.warmup_grace)
                    .map_err(|source| ConfigError::Baseline {
                        metric: metric.key(),
                        source,
                    })?;
                Some(baseline)
            } else {
                None
            };
        }

        let thresholds = [
            (Metric::RotationsPerSecond, self.thresholds.rotations_per_second),
            (Metric::RotationVariance, self.thresholds.rotation_variance),
            (Metric::ClicksPerSecond, self.thresholds.clicks_per_second),
            (Metric::PerfectYawLock, self.thresholds.perfect_yaw_lock),
            (Metric::ConstantCps, self.thresholds.constant_cps),
        ];
        for (metric, threshold) in thresholds {
            if let Some(threshold) = threshold {
                if !threshold.is_finite() || threshold <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "combat.thresholds.{} must be a positive number, got {threshold}",
                        metric.key()
                    )));
                }
                config.thresholds[metric] = threshold;
            }
        }

        Ok(config)
    }
}

impl RawInventory {
    fn build(self) -> ConfigResult<InventoryConfig> {
        let defaults = InventoryConfig::default();
        let alert_cooldown = match self.alert_cooldown {
            Some(v) => seconds("inventory.alert-cooldown", v.max(0.0))?,
            None => defaults.alert_cooldown,
        };

        let mut cooldown_overrides = HashMap::with_capacity(self.cooldown_exemptions.len());
        for (key, secs) in self.cooldown_exemptions {
            match EntityId::from_str(&key) {
                Ok(entity) => {
                    let cooldown = seconds("inventory.cooldown-exemptions", secs.max(0.0))?;
                    cooldown_overrides.insert(entity, cooldown);
                }
                Err(_) => {
                    tracing::warn!("Invalid entity id in cooldown-exemptions: {}", key);
                }
            }
        }

        Ok(InventoryConfig {
            max_swaps_per_second: self.max_swaps_per_second.unwrap_or(defaults.max_swaps_per_second),
            dupe_threshold: self.dupe_threshold.unwrap_or(defaults.dupe_threshold),
            alert_cooldown,
            cooldown_overrides,
        })
    }
}
