//! # Movement Physics Validation
//!
//! Predicts where an entity could have gone since its previous sample and
//! flags displacement that no tolerance can explain.
//!
//! ## Model
//!
//! ```text
//! horizontal:  expected = |v_prev.xz| * (friction if grounded else drag)
//!              allowance = max(min_h, expected * (1 + h%/100)) [+ collision bonus]
//!              excess    = |delta.xz| - allowance
//!
//! vertical:    expected = v_prev.y - gravity   (0 if grounded and not rising)
//!              allowance = max(min_v, |expected| * (1 + v%/100)) [+ collision bonus]
//!              excess    = |delta.y - expected| - allowance
//! ```
//!
//! A violation whose excess exceeds four times the minimum allowance on
//! either axis is a hard reject: the entity is set back immediately.
//! Smaller violations go into a time-boxed buffer whose count drives the
//! configured actions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use vigil_core::{
    BlockPos, EntityId, Millis, PunishmentSink, SessionTable, Vec3, ViolationBuffer,
};

/// Multiple of the minimum allowance beyond which a violation is rejected outright.
const HARD_REJECT_FACTOR: f64 = 4.0;

// ============================================================================
// Samples and violations
// ============================================================================

/// Immutable snapshot of one movement tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementSample {
    /// Position after the move.
    pub position: Vec3,
    /// Displacement over this tick.
    pub delta: Vec3,
    /// Velocity reported for this tick, measured independently of `delta`.
    pub velocity: Vec3,
    /// Whether the entity is standing on something.
    pub on_ground: bool,
    /// World tick counter.
    pub tick: u64,
}

/// Result of a failed physics check.
#[derive(Clone, Debug, PartialEq)]
pub struct MovementViolation {
    /// Largest excess over allowance, in blocks.
    pub severity: f64,
    /// Which axes exceeded allowance and by how much.
    pub reason: String,
    /// Too large for tolerance noise; react immediately.
    pub hard_reject: bool,
}

/// Why the host moved the entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MoveCause {
    /// Client-driven movement.
    #[default]
    Walk,
    /// Explicit repositioning by the server (teleport, respawn, set-back).
    Teleport,
}

/// A raw move delivered by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveEvent {
    /// Position before the move.
    pub from: Vec3,
    /// Position after the move.
    pub to: Vec3,
    /// Current velocity.
    pub velocity: Vec3,
    /// Whether the entity is on the ground after the move.
    pub on_ground: bool,
    /// World tick counter.
    pub tick: u64,
    /// Cause of the move.
    pub cause: MoveCause,
}

impl MoveEvent {
    /// Builds the sample this event represents.
    #[must_use]
    pub fn sample(&self) -> MovementSample {
        MovementSample {
            position: self.to,
            delta: self.to - self.from,
            velocity: self.velocity,
            on_ground: self.on_ground,
            tick: self.tick,
        }
    }

    fn is_finite(&self) -> bool {
        self.from.is_finite() && self.to.is_finite() && self.velocity.is_finite()
    }
}

// ============================================================================
// Host collaborators
// ============================================================================

/// Block classification needed for collision assist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockKind {
    /// Nothing there.
    #[default]
    Air,
    /// Full collision.
    Solid,
    /// Climbable.
    Ladder,
    /// Non-colliding (plants, water surface, ...).
    Passable,
}

/// World lookup supplied by the host.
pub trait Terrain {
    /// Kind of block at `pos`.
    fn block_at(&self, pos: BlockPos) -> BlockKind;
}

/// Terrain with nothing in it.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAir;

impl Terrain for OpenAir {
    fn block_at(&self, _pos: BlockPos) -> BlockKind {
        BlockKind::Air
    }
}

/// Bypass predicate supplied by the host.
pub trait BypassCheck {
    /// Returns true if `entity` is exempt from movement judgment.
    fn has_bypass(&self, entity: EntityId) -> bool;
}

/// Nobody bypasses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBypass;

impl BypassCheck for NoBypass {
    fn has_bypass(&self, _entity: EntityId) -> bool {
        false
    }
}

/// Permission-backed bypass.
///
/// An entity bypasses if it holds the configured permission, or any
/// temporary grant below it (`<permission>.<suffix>`).
#[derive(Debug)]
pub struct PermissionBypass {
    permission: String,
    grants: RwLock<HashMap<EntityId, HashSet<String>>>,
}

impl PermissionBypass {
    /// Creates a bypass check for `permission`.
    #[must_use]
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            grants: RwLock::new(HashMap::new()),
        }
    }

    /// Grants `node` to `entity`.
    pub fn grant(&self, entity: EntityId, node: impl Into<String>) {
        self.grants.write().entry(entity).or_default().insert(node.into());
    }

    /// Revokes `node` from `entity`.
    pub fn revoke(&self, entity: EntityId, node: &str) {
        let mut grants = self.grants.write();
        if let Some(nodes) = grants.get_mut(&entity) {
            nodes.remove(node);
            if nodes.is_empty() {
                grants.remove(&entity);
            }
        }
    }

    /// Drops every grant for `entity`.
    pub fn forget(&self, entity: EntityId) {
        self.grants.write().remove(&entity);
    }
}

impl BypassCheck for PermissionBypass {
    fn has_bypass(&self, entity: EntityId) -> bool {
        let grants = self.grants.read();
        let Some(nodes) = grants.get(&entity) else {
            return false;
        };
        nodes.iter().any(|node| {
            node == &self.permission
                || node
                    .strip_prefix(self.permission.as_str())
                    .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
        })
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Physics constants applied per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsConstants {
    /// Downward acceleration per tick.
    pub gravity: f64,
    /// Horizontal speed multiplier while airborne.
    pub air_drag: f64,
    /// Horizontal speed multiplier while grounded.
    pub ground_friction: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            gravity: 0.08,
            air_drag: 0.91,
            ground_friction: 0.6,
        }
    }
}

/// Allowances on top of the physics prediction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    /// Horizontal tolerance in percent of expected speed.
    pub horizontal_percent: f64,
    /// Vertical tolerance in percent of expected delta.
    pub vertical_percent: f64,
    /// Extra horizontal allowance when touching geometry.
    pub collision_horizontal_bonus: f64,
    /// Extra vertical allowance when touching geometry.
    pub collision_vertical_bonus: f64,
    /// Horizontal allowance floor.
    pub minimum_horizontal: f64,
    /// Vertical allowance floor.
    pub minimum_vertical: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            horizontal_percent: 15.0,
            vertical_percent: 20.0,
            collision_horizontal_bonus: 0.2,
            collision_vertical_bonus: 0.1,
            minimum_horizontal: 0.05,
            minimum_vertical: 0.05,
        }
    }
}

/// Action run once the buffered violation count reaches a threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MovementAction {
    /// Move the entity back to its last safe position.
    SetBack,
    /// Report to the punishment sink.
    Notify,
    /// Host-defined action; not run by the engine.
    Custom(String),
}

impl MovementAction {
    /// Parses an action type name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "set-back" | "setback" => Self::SetBack,
            "notify" => Self::Notify,
            _ => Self::Custom(name.to_owned()),
        }
    }
}

/// Named action trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionThreshold {
    /// What to do.
    pub action: MovementAction,
    /// Buffered violations required.
    pub threshold: usize,
}

/// Movement engine configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct MovementConfig {
    /// Physics constants.
    pub physics: PhysicsConstants,
    /// Allowances.
    pub tolerances: Tolerances,
    /// How long a buffered violation counts.
    pub violation_decay: Duration,
    /// Maximum buffered violations.
    pub violation_capacity: usize,
    /// Ordered action triggers.
    pub actions: Vec<ActionThreshold>,
    /// Permission node that exempts an entity.
    pub bypass_permission: String,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConstants::default(),
            tolerances: Tolerances::default(),
            violation_decay: Duration::from_secs(8),
            violation_capacity: 20,
            actions: vec![
                ActionThreshold {
                    action: MovementAction::Notify,
                    threshold: 3,
                },
                ActionThreshold {
                    action: MovementAction::SetBack,
                    threshold: 5,
                },
            ],
            bypass_permission: "anticheat.movement.bypass".to_owned(),
        }
    }
}

// ============================================================================
// Physics validator
// ============================================================================

/// Stateless per-tick physics check.
#[derive(Clone, Debug)]
pub struct PhysicsValidator {
    physics: PhysicsConstants,
    tolerances: Tolerances,
}

impl PhysicsValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new(physics: PhysicsConstants, tolerances: Tolerances) -> Self {
        Self { physics, tolerances }
    }

    /// Compares `current` against what `previous` predicts.
    ///
    /// Returns `None` when there is no previous sample or both axes are
    /// within allowance.
    #[must_use]
    pub fn evaluate(
        &self,
        current: &MovementSample,
        previous: Option<&MovementSample>,
        terrain: &dyn Terrain,
    ) -> Option<MovementViolation> {
        let previous = previous?;
        let t = &self.tolerances;
        let assisted = collision_assist(terrain, current.position);

        let horizontal_expected = self.expected_horizontal(previous);
        let horizontal_observed = current.delta.horizontal().length();
        let mut horizontal_allowance = t
            .minimum_horizontal
            .max(horizontal_expected * (1.0 + t.horizontal_percent / 100.0));
        if assisted {
            horizontal_allowance += t.collision_horizontal_bonus;
        }
        let horizontal_excess = horizontal_observed - horizontal_allowance;

        let vertical_expected = self.expected_vertical(previous);
        let vertical_observed = current.delta.y;
        let mut vertical_allowance = t
            .minimum_vertical
            .max(vertical_expected.abs() * (1.0 + t.vertical_percent / 100.0));
        if assisted {
            vertical_allowance += t.collision_vertical_bonus;
        }
        let vertical_excess = (vertical_observed - vertical_expected).abs() - vertical_allowance;

        // NaN excess compares false here and is treated as clean.
        if !(horizontal_excess > 0.0 || vertical_excess > 0.0) {
            return None;
        }

        let mut parts = Vec::with_capacity(2);
        if horizontal_excess > 0.0 {
            parts.push(format!("Horizontal excess {horizontal_excess:.3}"));
        }
        if vertical_excess > 0.0 {
            parts.push(format!("Vertical deviation {vertical_excess:.3}"));
        }

        Some(MovementViolation {
            severity: horizontal_excess.max(vertical_excess),
            reason: parts.join(", "),
            hard_reject: horizontal_excess > t.minimum_horizontal * HARD_REJECT_FACTOR
                || vertical_excess > t.minimum_vertical * HARD_REJECT_FACTOR,
        })
    }

    fn expected_horizontal(&self, previous: &MovementSample) -> f64 {
        let speed = previous.velocity.horizontal().length();
        if previous.on_ground {
            speed * self.physics.ground_friction
        } else {
            speed * self.physics.air_drag
        }
    }

    fn expected_vertical(&self, previous: &MovementSample) -> f64 {
        let velocity_y = previous.velocity.y;
        if previous.on_ground && velocity_y <= 0.0 {
            return 0.0;
        }
        velocity_y - self.physics.gravity
    }
}

/// Touching a solid block, or standing where the block above is a ladder
/// or solid.
fn collision_assist(terrain: &dyn Terrain, position: Vec3) -> bool {
    let cell = position.block();
    if terrain.block_at(cell) == BlockKind::Solid {
        return true;
    }
    matches!(
        terrain.block_at(cell.above()),
        BlockKind::Ladder | BlockKind::Solid
    )
}

// ============================================================================
// Movement monitor
// ============================================================================

/// What the host should do after a move.
#[derive(Clone, Debug, PartialEq)]
pub enum MoveOutcome {
    /// Nothing changed, or the input was unusable.
    Ignored,
    /// Sample recorded without judgment (teleport or bypass).
    Recorded,
    /// Physics check passed.
    Clean,
    /// Violation buffered; no set-back required.
    Flagged {
        /// The violation.
        violation: MovementViolation,
        /// Violations currently buffered.
        buffered: usize,
    },
    /// Revert the entity to `target`.
    SetBack {
        /// Rollback position.
        target: Vec3,
        /// The violation that caused it.
        violation: MovementViolation,
    },
}

/// Per-entity movement state.
#[derive(Debug)]
struct MovementSession {
    previous: Option<MovementSample>,
    last_safe: Option<Vec3>,
    violations: ViolationBuffer<MovementViolation>,
}

impl MovementSession {
    fn new(config: &MovementConfig) -> Self {
        Self {
            previous: None,
            last_safe: None,
            violations: ViolationBuffer::new(config.violation_decay, config.violation_capacity),
        }
    }

    fn reseed(&mut self, sample: MovementSample) {
        if sample.on_ground {
            self.last_safe = Some(sample.position);
        }
        self.previous = Some(sample);
    }
}

/// Movement engine: validator plus per-entity sessions and graduated response.
pub struct MovementMonitor {
    config: MovementConfig,
    validator: PhysicsValidator,
    sessions: SessionTable<MovementSession>,
    sink: Arc<dyn PunishmentSink>,
}

impl MovementMonitor {
    /// Creates a monitor reporting to `sink`.
    #[must_use]
    pub fn new(config: MovementConfig, sink: Arc<dyn PunishmentSink>) -> Self {
        let validator = PhysicsValidator::new(config.physics, config.tolerances);
        Self {
            config,
            validator,
            sessions: SessionTable::new(),
            sink,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// The underlying physics check.
    #[must_use]
    pub const fn validator(&self) -> &PhysicsValidator {
        &self.validator
    }

    /// Processes one move for `entity`.
    pub fn on_move(
        &self,
        entity: EntityId,
        name: &str,
        event: &MoveEvent,
        now: Millis,
        bypass: &dyn BypassCheck,
        terrain: &dyn Terrain,
    ) -> MoveOutcome {
        if !event.is_finite() {
            tracing::debug!("Dropping non-finite move for {}", name);
            return MoveOutcome::Ignored;
        }

        let config = &self.config;
        self.sessions.with_session(
            entity,
            || MovementSession::new(config),
            |session| {
                if event.cause == MoveCause::Teleport || bypass.has_bypass(entity) {
                    session.reseed(event.sample());
                    return MoveOutcome::Recorded;
                }
                if event.from == event.to {
                    return MoveOutcome::Ignored;
                }
                self.judge(session, name, event, now, terrain)
            },
        )
    }

    fn judge(
        &self,
        session: &mut MovementSession,
        name: &str,
        event: &MoveEvent,
        now: Millis,
        terrain: &dyn Terrain,
    ) -> MoveOutcome {
        let current = event.sample();
        let previous = session.previous.replace(current);

        let Some(violation) = self.validator.evaluate(&current, previous.as_ref(), terrain) else {
            if current.on_ground {
                session.last_safe = Some(current.position);
            }
            return MoveOutcome::Clean;
        };

        let target = session.last_safe.unwrap_or(event.from);
        session.violations.push(violation.clone(), now);

        if violation.hard_reject {
            tracing::warn!(
                "{} hard-rejected at tick {}: {} (severity {:.3})",
                name,
                event.tick,
                violation.reason,
                violation.severity
            );
            session.violations.clear();
            return MoveOutcome::SetBack { target, violation };
        }

        let buffered = session.violations.count(now);
        let mut set_back = false;
        for trigger in &self.config.actions {
            if buffered < trigger.threshold {
                continue;
            }
            match &trigger.action {
                MovementAction::SetBack => {
                    set_back = true;
                    session.violations.clear();
                }
                MovementAction::Notify => {
                    #[allow(clippy::cast_precision_loss)]
                    let severity = buffered as f64;
                    self.sink.flag_suspect(
                        name,
                        &format!("movement ({}), buffer={buffered}", violation.reason),
                        severity,
                    );
                }
                MovementAction::Custom(kind) => {
                    tracing::debug!("Unhandled movement action '{}' for {}", kind, name);
                }
            }
        }

        if set_back {
            tracing::warn!(
                "{} set back after {} buffered violations: {}",
                name,
                buffered,
                violation.reason
            );
            MoveOutcome::SetBack { target, violation }
        } else {
            MoveOutcome::Flagged { violation, buffered }
        }
    }

    /// Reseeds `entity` after an explicit reposition by the host.
    pub fn reposition(&self, entity: EntityId, sample: MovementSample) {
        let config = &self.config;
        self.sessions
            .with_session(entity, || MovementSession::new(config), |s| s.reseed(sample));
    }

    /// Last grounded, accepted position for `entity`.
    #[must_use]
    pub fn last_safe_position(&self, entity: EntityId) -> Option<Vec3> {
        self.sessions.with_existing(entity, |s| s.last_safe).flatten()
    }

    /// Violations currently buffered for `entity`.
    #[must_use]
    pub fn buffered_violations(&self, entity: EntityId, now: Millis) -> usize {
        self.sessions
            .with_existing(entity, |s| s.violations.count(now))
            .unwrap_or(0)
    }

    /// Most recent buffered violation for `entity`.
    #[must_use]
    pub fn most_recent_violation(&self, entity: EntityId) -> Option<MovementViolation> {
        self.sessions
            .with_existing(entity, |s| s.violations.most_recent().cloned())
            .flatten()
    }

    /// Drops all state for `entity`.
    pub fn disconnect(&self, entity: EntityId) {
        self.sessions.remove(entity);
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
