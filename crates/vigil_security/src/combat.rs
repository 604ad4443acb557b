//! # Combat Packet Analysis
//!
//! Detects robotic aim and click input from ordered rotation, swing and
//! attack packets.
//!
//! ## Detection Methods
//!
//! - **Baselines**: mean rotation speed, rotation variance and mean clicks
//!   per second are compared against empirical ranges. Three consecutive
//!   out-of-range observations escalate; one in-range observation resets.
//! - **Perfect aim-lock**: the last N yaw deltas are all within a tiny
//!   epsilon of zero.
//! - **Constant click rate**: attack intervals imply 8-15 clicks per second
//!   with almost no spread.
//!
//! Every metric has its own decaying accumulator per entity.
//!
//! ## Pipeline
//!
//! ```text
//! packet ──► deltas ──► rolling stats ──► baselines (strike gated) ──┐
//!                            │                                        ├──► accumulators ──► sink
//!                            └──────────► pattern heuristics ─────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;
use std::time::Duration;

use vigil_core::{
    EmpiricalBaseline, EntityId, Millis, PunishmentSink, RollingStatistics, SessionTable,
    ViolationAccumulator,
};

// ============================================================================
// Metrics
// ============================================================================

/// Closed set of tracked combat metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Mean rotation speed over the rolling window.
    RotationsPerSecond,
    /// Combined variance of rotation speed and yaw delta.
    RotationVariance,
    /// Mean clicks per second over the rolling window.
    ClicksPerSecond,
    /// Sustained zero yaw movement.
    PerfectYawLock,
    /// Autoclicker-like attack cadence.
    ConstantCps,
}

impl Metric {
    /// Number of metrics.
    pub const COUNT: usize = 5;

    /// Every metric, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::RotationsPerSecond,
        Self::RotationVariance,
        Self::ClicksPerSecond,
        Self::PerfectYawLock,
        Self::ConstantCps,
    ];

    /// Position in a [`MetricTable`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Configuration key for this metric.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::RotationsPerSecond => "rotations-per-second",
            Self::RotationVariance => "rotation-variance",
            Self::ClicksPerSecond => "clicks-per-second",
            Self::PerfectYawLock => "perfect-yaw-lock",
            Self::ConstantCps => "constant-cps",
        }
    }
}

/// Fixed-size table indexed by [`Metric`].
#[derive(Clone, Debug, PartialEq)]
pub struct MetricTable<T>([T; Metric::COUNT]);

impl<T> MetricTable<T> {
    /// Builds a table by evaluating `f` for every metric.
    pub fn from_fn(f: impl FnMut(Metric) -> T) -> Self {
        Self(Metric::ALL.map(f))
    }

    /// Iterates `(metric, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, &T)> {
        Metric::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T: Default> Default for MetricTable<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Metric> for MetricTable<T> {
    type Output = T;
    fn index(&self, metric: Metric) -> &T {
        &self.0[metric.index()]
    }
}

impl<T> IndexMut<Metric> for MetricTable<T> {
    fn index_mut(&mut self, metric: Metric) -> &mut T {
        &mut self.0[metric.index()]
    }
}

// ============================================================================
// Packets and traces
// ============================================================================

/// Combat packet type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Look/orientation update.
    Rotation,
    /// Arm swing.
    Swing,
    /// Attack on an entity.
    Attack,
}

impl PacketKind {
    const fn is_click(self) -> bool {
        matches!(self, Self::Swing | Self::Attack)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rotation => "ROTATION",
            Self::Swing => "SWING",
            Self::Attack => "ATTACK",
        })
    }
}

/// Diagnostic snapshot of one processed packet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceEntry {
    /// Packet timestamp.
    pub timestamp: Millis,
    /// Packet type.
    pub kind: PacketKind,
    /// Normalized yaw change, degrees.
    pub yaw_delta: f64,
    /// Normalized pitch change, degrees.
    pub pitch_delta: f64,
    /// Time since the previous packet.
    pub interval_ms: u64,
    /// Instantaneous rotation speed.
    pub instant_rps: f64,
    /// Windowed mean rotation speed.
    pub mean_rps: f64,
    /// Instantaneous clicks per second.
    pub instant_cps: f64,
    /// Windowed mean clicks per second.
    pub mean_cps: f64,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let of_day = self.timestamp % 86_400_000;
        write!(
            f,
            "[{:02}:{:02}:{:02}.{:03}] {} yawΔ={:.3} pitchΔ={:.3} interval={}ms rps={:.2}(mean={:.2}) cps={:.2}(mean={:.2})",
            of_day / 3_600_000,
            of_day / 60_000 % 60,
            of_day / 1_000 % 60,
            of_day % 1_000,
            self.kind,
            self.yaw_delta,
            self.pitch_delta,
            self.interval_ms,
            self.instant_rps,
            self.mean_rps,
            self.instant_cps,
            self.mean_cps,
        )
    }
}

/// Renders a trace dump for the developer diagnostic command.
pub struct TraceDump<'a> {
    entity: EntityId,
    entries: &'a [TraceEntry],
}

impl<'a> TraceDump<'a> {
    /// Wraps `entries` recorded for `entity`.
    #[must_use]
    pub const fn new(entity: EntityId, entries: &'a [TraceEntry]) -> Self {
        Self { entity, entries }
    }
}

impl fmt::Display for TraceDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "No trace data recorded for entity {}.", self.entity);
        }
        writeln!(
            f,
            "Dumping {} packets for entity {}:",
            self.entries.len(),
            self.entity
        )?;
        for entry in self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Combat analyzer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CombatConfig {
    /// Span of the rolling statistics windows.
    pub rolling_window: Duration,
    /// Time for an accumulator to drain a full threshold.
    pub violation_decay: Duration,
    /// Trace ring capacity per entity.
    pub trace_capacity: usize,
    /// Largest yaw delta still counted as locked, degrees.
    pub yaw_lock_epsilon: f64,
    /// Consecutive yaw deltas examined for aim-lock.
    pub yaw_lock_window: usize,
    /// Attack intervals examined for constant click rate.
    pub constant_cps_window: usize,
    /// Lowest clicks per second considered autoclicker-like.
    pub constant_cps_min: f64,
    /// Highest clicks per second considered autoclicker-like.
    pub constant_cps_max: f64,
    /// Largest interval standard deviation considered robotic, milliseconds.
    pub constant_cps_max_stddev_ms: f64,
    /// Consecutive out-of-range observations before escalation.
    pub strikes_to_escalate: u32,
    /// Amount added per positive heuristic evaluation.
    pub heuristic_increment: f64,
    /// Largest per-packet contribution to observed activity time.
    pub activity_clamp: Duration,
    /// Acceptable ranges; `None` disables the baseline check.
    pub baselines: MetricTable<Option<EmpiricalBaseline>>,
    /// Accumulator firing thresholds.
    pub thresholds: MetricTable<f64>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            rolling_window: Duration::from_secs(6),
            violation_decay: Duration::from_secs(45),
            trace_capacity: 256,
            yaw_lock_epsilon: 0.05,
            yaw_lock_window: 10,
            constant_cps_window: 12,
            constant_cps_min: 8.0,
            constant_cps_max: 15.0,
            constant_cps_max_stddev_ms: 8.0,
            strikes_to_escalate: 3,
            heuristic_increment: 1.5,
            activity_clamp: Duration::from_secs(4),
            baselines: MetricTable::from_fn(|metric| match metric {
                Metric::RotationsPerSecond => EmpiricalBaseline::with_grace(0.3, 4.8, 1.0).ok(),
                Metric::RotationVariance => EmpiricalBaseline::with_grace(0.1, 120.0, 1.0).ok(),
                Metric::ClicksPerSecond => EmpiricalBaseline::with_grace(3.0, 13.5, 1.0).ok(),
                Metric::PerfectYawLock | Metric::ConstantCps => None,
            }),
            thresholds: MetricTable::from_fn(|metric| match metric {
                Metric::RotationsPerSecond | Metric::RotationVariance | Metric::ClicksPerSecond => 6.0,
                Metric::PerfectYawLock | Metric::ConstantCps => 4.0,
            }),
        }
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Derived values for one packet.
#[derive(Clone, Copy, Debug)]
struct PacketSnapshot {
    timestamp: Millis,
    mean_rps: f64,
    rotation_variance: f64,
    mean_cps: f64,
}

/// Per-entity combat state.
struct CombatSession {
    name: String,
    rotation_speed: RollingStatistics,
    yaw_deltas: RollingStatistics,
    cps: RollingStatistics,
    traces: VecDeque<TraceEntry>,
    yaw_lock_window: VecDeque<f64>,
    attack_intervals: VecDeque<u64>,
    strikes: MetricTable<u32>,
    accumulators: MetricTable<ViolationAccumulator>,
    /// Host timestamp of the previous packet.
    last_packet: Option<Millis>,
    /// Session clock; advances by the clamped interval between packets.
    clock: Millis,
    last_attack: Option<Millis>,
    last_orientation: Option<(f64, f64)>,
    activity_seconds: f64,
}

impl CombatSession {
    fn new(name: &str, config: &CombatConfig) -> Self {
        Self {
            name: name.to_owned(),
            rotation_speed: RollingStatistics::new(config.rolling_window),
            yaw_deltas: RollingStatistics::new(config.rolling_window),
            cps: RollingStatistics::new(config.rolling_window),
            traces: VecDeque::with_capacity(config.trace_capacity.min(256)),
            yaw_lock_window: VecDeque::with_capacity(config.yaw_lock_window),
            attack_intervals: VecDeque::with_capacity(config.constant_cps_window),
            strikes: MetricTable::default(),
            accumulators: MetricTable::from_fn(|metric| {
                ViolationAccumulator::new(config.thresholds[metric], config.violation_decay)
            }),
            last_packet: None,
            clock: 0,
            last_attack: None,
            last_orientation: None,
            activity_seconds: 0.0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record(
        &mut self,
        kind: PacketKind,
        yaw: f64,
        pitch: f64,
        timestamp: Millis,
        config: &CombatConfig,
    ) -> (PacketSnapshot, TraceEntry) {
        let interval_ms = self
            .last_packet
            .map_or(0, |last| timestamp.saturating_sub(last));
        let now = if self.last_packet.is_some() {
            self.clock.saturating_add(interval_ms)
        } else {
            timestamp
        };
        let delta_seconds = interval_ms as f64 / 1_000.0;
        let (yaw_delta, pitch_delta) = self
            .last_orientation
            .map_or((0.0, 0.0), |(last_yaw, last_pitch)| {
                (angle_delta(yaw, last_yaw), angle_delta(pitch, last_pitch))
            });

        self.last_packet = Some(timestamp);
        self.clock = now;
        self.last_orientation = Some((yaw, pitch));
        if interval_ms > 0 {
            self.activity_seconds += delta_seconds.min(config.activity_clamp.as_secs_f64());
        }

        push_bounded(&mut self.yaw_lock_window, yaw_delta, config.yaw_lock_window);

        let instant_rps = if delta_seconds > 0.0 {
            yaw_delta.abs() / delta_seconds
        } else {
            0.0
        };
        self.rotation_speed.add_sample(instant_rps, now);
        self.yaw_deltas.add_sample(yaw_delta.abs(), now);

        let mean_rps = self.rotation_speed.mean();
        let rotation_variance = self.rotation_speed.variance() + self.yaw_deltas.variance();

        let mut instant_cps = 0.0;
        if kind.is_click() {
            if let Some(last_attack) = self.last_attack {
                let attack_interval = now.saturating_sub(last_attack);
                push_bounded(
                    &mut self.attack_intervals,
                    attack_interval,
                    config.constant_cps_window,
                );
                if attack_interval > 0 {
                    instant_cps = 1_000.0 / attack_interval as f64;
                    self.cps.add_sample(instant_cps, now);
                }
            }
            self.last_attack = Some(now);
        }
        let mean_cps = self.cps.mean();
        if instant_cps == 0.0 && mean_cps > 0.0 {
            instant_cps = mean_cps;
        }

        let trace = TraceEntry {
            timestamp,
            kind,
            yaw_delta,
            pitch_delta,
            interval_ms,
            instant_rps,
            mean_rps,
            instant_cps,
            mean_cps,
        };
        push_bounded(&mut self.traces, trace, config.trace_capacity);

        (
            PacketSnapshot {
                timestamp: now,
                mean_rps,
                rotation_variance,
                mean_cps,
            },
            trace,
        )
    }

    fn perfect_yaw_lock(&self, config: &CombatConfig) -> bool {
        self.yaw_lock_window.len() >= config.yaw_lock_window.max(1)
            && self
                .yaw_lock_window
                .iter()
                .all(|delta| delta.abs() <= config.yaw_lock_epsilon)
    }

    #[allow(clippy::cast_precision_loss)]
    fn constant_cps(&self, config: &CombatConfig) -> bool {
        let window = config.constant_cps_window.max(1);
        if self.attack_intervals.len() < window {
            return false;
        }
        let count = self.attack_intervals.len() as f64;
        let mean = self.attack_intervals.iter().map(|&i| i as f64).sum::<f64>() / count;
        if mean <= 0.0 {
            return false;
        }
        let variance = self
            .attack_intervals
            .iter()
            .map(|&i| {
                let d = i as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count;
        let cps = 1_000.0 / mean;
        cps >= config.constant_cps_min
            && cps <= config.constant_cps_max
            && variance.sqrt() <= config.constant_cps_max_stddev_ms
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    queue.push_back(value);
    while queue.len() > capacity {
        queue.pop_front();
    }
}

/// Signed angular difference normalized into (-180, 180].
#[must_use]
pub fn angle_delta(current: f64, previous: f64) -> f64 {
    let delta = (current - previous + 180.0).rem_euclid(360.0) - 180.0;
    if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Combat engine: per-entity statistics, baselines and heuristics.
pub struct CombatAnalyzer {
    config: CombatConfig,
    sessions: SessionTable<CombatSession>,
    sink: Arc<dyn PunishmentSink>,
}

impl CombatAnalyzer {
    /// Creates an analyzer reporting to `sink`.
    #[must_use]
    pub fn new(config: CombatConfig, sink: Arc<dyn PunishmentSink>) -> Self {
        Self {
            config,
            sessions: SessionTable::new(),
            sink,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Ingests a rotation packet.
    pub fn record_rotation(&self, entity: EntityId, name: &str, yaw: f32, pitch: f32, timestamp: Millis) {
        self.record_packet(entity, name, PacketKind::Rotation, yaw, pitch, timestamp);
    }

    /// Ingests an arm swing packet.
    pub fn record_swing(&self, entity: EntityId, name: &str, yaw: f32, pitch: f32, timestamp: Millis) {
        self.record_packet(entity, name, PacketKind::Swing, yaw, pitch, timestamp);
    }

    /// Ingests an attack packet.
    pub fn record_attack(&self, entity: EntityId, name: &str, yaw: f32, pitch: f32, timestamp: Millis) {
        self.record_packet(entity, name, PacketKind::Attack, yaw, pitch, timestamp);
    }

    /// Ingests any combat packet.
    pub fn record_packet(
        &self,
        entity: EntityId,
        name: &str,
        kind: PacketKind,
        yaw: f32,
        pitch: f32,
        timestamp: Millis,
    ) {
        if !yaw.is_finite() || !pitch.is_finite() {
            tracing::debug!("Dropping {} packet with non-finite orientation from {}", kind, name);
            return;
        }
        let config = &self.config;
        self.sessions.with_session(
            entity,
            || CombatSession::new(name, config),
            |session| {
                let (snapshot, trace) =
                    session.record(kind, f64::from(yaw), f64::from(pitch), timestamp, config);
                tracing::debug!(
                    "[{}] {} {} yawΔ={:.3} pitchΔ={:.3} interval={}ms rps={:.2}(mean={:.2}) cps={:.2}(mean={:.2})",
                    session.name,
                    kind,
                    entity,
                    trace.yaw_delta,
                    trace.pitch_delta,
                    trace.interval_ms,
                    trace.instant_rps,
                    trace.mean_rps,
                    trace.instant_cps,
                    trace.mean_cps
                );
                self.evaluate_baselines(session, &snapshot);
                self.evaluate_heuristics(session, snapshot.timestamp);
            },
        );
    }

    fn evaluate_baselines(&self, session: &mut CombatSession, snapshot: &PacketSnapshot) {
        self.check_baseline(
            session,
            Metric::RotationsPerSecond,
            snapshot.mean_rps,
            snapshot.timestamp,
            "mean rotation speed outside empirical range",
        );
        self.check_baseline(
            session,
            Metric::RotationVariance,
            snapshot.rotation_variance,
            snapshot.timestamp,
            "rotation variance outside empirical range",
        );
        if snapshot.mean_cps > 0.0 {
            self.check_baseline(
                session,
                Metric::ClicksPerSecond,
                snapshot.mean_cps,
                snapshot.timestamp,
                "mean clicks per second outside empirical range",
            );
        }
    }

    fn check_baseline(
        &self,
        session: &mut CombatSession,
        metric: Metric,
        value: f64,
        timestamp: Millis,
        reason: &str,
    ) {
        let Some(baseline) = self.config.baselines[metric] else {
            return;
        };
        if !baseline.is_warmed_up(session.activity_seconds) {
            return;
        }
        if baseline.is_within(value) {
            session.strikes[metric] = 0;
            return;
        }

        let strikes = session.strikes[metric].saturating_add(1);
        session.strikes[metric] = strikes;
        if strikes >= self.config.strikes_to_escalate {
            session.accumulators[metric].add_violation(
                self.sink.as_ref(),
                &session.name,
                f64::from(strikes),
                timestamp,
                reason,
            );
        }
    }

    fn evaluate_heuristics(&self, session: &mut CombatSession, timestamp: Millis) {
        if session.perfect_yaw_lock(&self.config) {
            session.accumulators[Metric::PerfectYawLock].add_violation(
                self.sink.as_ref(),
                &session.name,
                self.config.heuristic_increment,
                timestamp,
                "sustained perfect yaw lock",
            );
        }
        if session.constant_cps(&self.config) {
            session.accumulators[Metric::ConstantCps].add_violation(
                self.sink.as_ref(),
                &session.name,
                self.config.heuristic_increment,
                timestamp,
                "constant CPS pattern",
            );
        }
    }

    /// Recent packet traces for `entity`, oldest first. Empty if unknown.
    #[must_use]
    pub fn dump_traces(&self, entity: EntityId) -> Vec<TraceEntry> {
        self.sessions
            .with_existing(entity, |s| s.traces.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Current strike count for `metric`.
    #[must_use]
    pub fn strikes(&self, entity: EntityId, metric: Metric) -> Option<u32> {
        self.sessions.with_existing(entity, |s| s.strikes[metric])
    }

    /// Accumulator level for `metric`, decayed to `timestamp`.
    #[must_use]
    pub fn violation_level(&self, entity: EntityId, metric: Metric, timestamp: Millis) -> Option<f64> {
        self.sessions
            .with_existing(entity, |s| s.accumulators[metric].level_at(timestamp))
    }

    /// Observed activity time for `entity`, seconds.
    #[must_use]
    pub fn activity_seconds(&self, entity: EntityId) -> Option<f64> {
        self.sessions.with_existing(entity, |s| s.activity_seconds)
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

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::PunishmentManager;

    const ALICE: EntityId = EntityId(1);

    fn strike_config() -> CombatConfig {
        let mut baselines = MetricTable::default();
        baselines[Metric::RotationsPerSecond] = EmpiricalBaseline::with_grace(0.3, 4.8, 0.05).ok();
        CombatConfig {
            rolling_window: Duration::ZERO,
            violation_decay: Duration::from_secs(100_000),
            baselines,
            thresholds: MetricTable::from_fn(|_| 100.0),
            ..CombatConfig::default()
        }
    }

    #[test]
    fn test_angle_delta_wraps() {
        assert!((angle_delta(-179.0, 179.0) - 2.0).abs() < 1e-9);
        assert!((angle_delta(179.0, -179.0) + 2.0).abs() < 1e-9);
        assert_eq!(angle_delta(180.0, 0.0), 180.0);
        assert_eq!(angle_delta(0.0, 180.0), 180.0);
        assert_eq!(angle_delta(725.0, 5.0), 0.0);
    }

    #[test]
    fn test_metric_table_indexing() {
        let mut table: MetricTable<u32> = MetricTable::default();
        table[Metric::ConstantCps] = 7;
        assert_eq!(table[Metric::ConstantCps], 7);
        assert_eq!(table.iter().filter(|(_, v)| **v == 0).count(), Metric::COUNT - 1);
    }

    #[test]
    fn test_dump_traces_unknown_entity_is_empty() {
        let analyzer = CombatAnalyzer::new(CombatConfig::default(), Arc::new(PunishmentManager::new()));
        assert!(analyzer.dump_traces(EntityId(404)).is_empty());
        let rendered = TraceDump::new(EntityId(404), &[]).to_string();
        assert!(rendered.starts_with("No trace data recorded"));
    }

    #[test]
    fn test_trace_ring_evicts_oldest() {
        let config = CombatConfig {
            trace_capacity: 4,
            ..CombatConfig::default()
        };
        let analyzer = CombatAnalyzer::new(config, Arc::new(PunishmentManager::new()));
        for i in 0..10u64 {
            analyzer.record_rotation(ALICE, "alice", i as f32, 0.0, 1_000 + i * 50);
        }
        let traces = analyzer.dump_traces(ALICE);
        assert_eq!(traces.len(), 4);
        assert_eq!(traces[0].timestamp, 1_300);
        assert_eq!(traces[3].timestamp, 1_450);
        assert_eq!(traces[3].interval_ms, 50);
        assert!((traces[3].yaw_delta - 1.0).abs() < 1e-9);

        let rendered = TraceDump::new(ALICE, &traces).to_string();
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.lines().nth(1).unwrap().starts_with("[00:00:01.300] ROTATION"));
    }

    #[test]
    fn test_three_consecutive_strikes_escalate() {
        let analyzer = CombatAnalyzer::new(strike_config(), Arc::new(PunishmentManager::new()));
        let mut yaw = 0.0f32;
        let mut now = 0u64;
        let mut send = |delta: f32| {
            yaw += delta;
            now += 100;
            analyzer.record_rotation(ALICE, "alice", yaw, 0.0, now);
            now
        };

        // Warm-up packet, not judged.
        send(0.0);
        assert_eq!(analyzer.strikes(ALICE, Metric::RotationsPerSecond), Some(0));

        // 10 degrees per 100ms = 100 deg/s, far outside [0.3, 4.8].
        send(10.0);
        send(10.0);
        assert_eq!(analyzer.strikes(ALICE, Metric::RotationsPerSecond), Some(2));

        // One in-range observation resets the streak.
        send(0.2);
        assert_eq!(analyzer.strikes(ALICE, Metric::RotationsPerSecond), Some(0));

        send(10.0);
        let at = send(10.0);
        let level = analyzer
            .violation_level(ALICE, Metric::RotationsPerSecond, at)
            .unwrap();
        assert_eq!(level, 0.0);

        let at = send(10.0);
        assert_eq!(analyzer.strikes(ALICE, Metric::RotationsPerSecond), Some(3));
        let level = analyzer
            .violation_level(ALICE, Metric::RotationsPerSecond, at)
            .unwrap();
        assert!((level - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_warmup_counts_activity_not_wall_clock() {
        let analyzer = CombatAnalyzer::new(CombatConfig::default(), Arc::new(PunishmentManager::new()));
        analyzer.record_rotation(ALICE, "alice", 0.0, 0.0, 0);
        // A ten minute gap contributes at most four seconds.
        analyzer.record_rotation(ALICE, "alice", 1.0, 0.0, 600_000);
        let activity = analyzer.activity_seconds(ALICE).unwrap();
        assert!((activity - 4.0).abs() < 1e-9);

        // Out-of-order packet adds nothing.
        analyzer.record_rotation(ALICE, "alice", 2.0, 0.0, 599_000);
        assert!((analyzer.activity_seconds(ALICE).unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_step_back_resumes_normal_intervals() {
        let analyzer = CombatAnalyzer::new(CombatConfig::default(), Arc::new(PunishmentManager::new()));
        for i in 0..40u64 {
            analyzer.record_rotation(ALICE, "alice", i as f32, 0.0, 60_000 + i * 50);
        }
        let before = analyzer.activity_seconds(ALICE).unwrap();
        assert!((before - 1.95).abs() < 1e-6);

        // Host clock jumps back a minute, then ticks normally.
        for i in 0..1_000u64 {
            analyzer.record_rotation(ALICE, "alice", (40 + i) as f32, 0.0, i * 50);
        }
        let after = analyzer.activity_seconds(ALICE).unwrap();
        assert!((after - (before + 999.0 * 0.05)).abs() < 1e-6);

        let traces = analyzer.dump_traces(ALICE);
        let stalled = traces
            .iter()
            .filter(|t| t.interval_ms == 0 && t.instant_rps == 0.0)
            .count();
        assert_eq!(stalled, 0);
        let last = traces.last().unwrap();
        assert_eq!(last.timestamp, 999 * 50);
        assert_eq!(last.interval_ms, 50);
        assert!((last.instant_rps - 20.0).abs() < 1e-6);
        // Six second window at 20 packets per second.
        assert!((last.mean_rps - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_disconnect_discards_session() {
        let analyzer = CombatAnalyzer::new(CombatConfig::default(), Arc::new(PunishmentManager::new()));
        analyzer.record_attack(ALICE, "alice", 0.0, 0.0, 10);
        assert_eq!(analyzer.session_count(), 1);
        analyzer.disconnect(ALICE);
        assert_eq!(analyzer.session_count(), 0);
        assert!(analyzer.dump_traces(ALICE).is_empty());
    }
}
