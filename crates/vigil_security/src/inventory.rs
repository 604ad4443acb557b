//! # Inventory Transaction Watching
//!
//! Detects duplication and rapid slot swapping by diffing inventory
//! snapshots taken after each mutation settles.
//!
//! ## Two-phase evaluation
//!
//! ```text
//! host event ──► observe_mutation ──► InventoryTask ──► channel
//!                (sequence += 1)                           │
//!                                        next tick         ▼
//!                                 run_pending ──► capture ──► diff ──► verdict
//!                                                   └──── one entity lock ────┘
//! ```
//!
//! Inventory contents are not stable until the host has applied the
//! mutation, so evaluation is deferred to the next `run_pending` call. The
//! capture, diff and restore for one entity run under that entity's session
//! lock.
//!
//! The first observation only seeds the baseline. While a flag is raised the
//! baseline is not advanced, so the last clean snapshot stays the comparison
//! point.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use vigil_core::{EntityId, Millis, PunishmentSink, SessionTable};

/// Trailing window for the swap rate.
const SWAP_WINDOW_MS: u64 = 1_000;

/// Largest slot index a snapshot grows to, exclusive.
pub const MAX_SLOTS: usize = 1_024;

/// Serialized item metadata. Stacks with different metadata never merge.
pub type ItemMeta = BTreeMap<String, String>;

// ============================================================================
// Items and snapshots
// ============================================================================

/// What triggered the mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Single slot click.
    Click,
    /// Drag across several slots.
    Drag,
    /// Creative-mode item placement.
    CreativeGive,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Click => "CLICK",
            Self::Drag => "DRAG",
            Self::CreativeGive => "CREATIVE_GIVE",
        })
    }
}

/// Contents of one slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ItemStack {
    /// Item type identifier.
    pub item: String,
    /// Stack size.
    pub quantity: u32,
    /// Metadata; empty when the stack has none.
    pub meta: ItemMeta,
}

impl ItemStack {
    /// Creates a stack without metadata.
    #[must_use]
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
            meta: ItemMeta::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Zero-quantity stacks are treated as an empty slot.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// Aggregation key for this stack.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            item: self.item.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.item, self.quantity)
    }
}

/// Item type plus metadata, the unit duplication is measured in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    /// Item type identifier.
    pub item: String,
    /// Metadata.
    pub meta: ItemMeta,
}

/// Slot-indexed copy of an open inventory view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    slots: Vec<Option<ItemStack>>,
}

impl InventorySnapshot {
    /// Creates a snapshot of `slot_count` empty slots.
    #[must_use]
    pub fn with_slots(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
        }
    }

    /// Wraps slot contents as captured by the host.
    #[must_use]
    pub fn from_slots(slots: Vec<Option<ItemStack>>) -> Self {
        Self { slots }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the view has no slots.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Contents of `slot`, or `None` if empty or out of range.
    #[must_use]
    pub fn slot(&self, slot: usize) -> Option<&ItemStack> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .filter(|stack| !stack.is_empty())
    }

    /// Replaces the contents of `slot`, growing the view if needed.
    ///
    /// Slots at or past [`MAX_SLOTS`] are ignored and `false` is returned.
    pub fn set(&mut self, slot: usize, stack: Option<ItemStack>) -> bool {
        if slot >= MAX_SLOTS {
            return false;
        }
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = stack;
        true
    }

    /// Raw slot contents, in slot order.
    #[must_use]
    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    /// Ordered change list from `previous` to `self`.
    #[must_use]
    pub fn differences(&self, previous: &Self) -> Vec<SlotChange> {
        (0..self.len().max(previous.len()))
            .filter_map(|slot| {
                let before = previous.slot(slot);
                let after = self.slot(slot);
                (before != after).then(|| SlotChange {
                    slot,
                    before: before.cloned(),
                    after: after.cloned(),
                })
            })
            .collect()
    }

    /// Total quantity per item key, ignoring empty slots.
    #[must_use]
    pub fn aggregate_counts(&self) -> HashMap<ItemKey, i64> {
        let mut counts = HashMap::new();
        for stack in (0..self.len()).filter_map(|slot| self.slot(slot)) {
            *counts.entry(stack.key()).or_insert(0) += i64::from(stack.quantity);
        }
        counts
    }
}

/// One slot that differs between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotChange {
    /// Slot index.
    pub slot: usize,
    /// Contents before; `None` if empty.
    pub before: Option<ItemStack>,
    /// Contents after; `None` if empty.
    pub after: Option<ItemStack>,
}

impl fmt::Display for SlotChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn describe(stack: Option<&ItemStack>) -> String {
            stack.map_or_else(|| "empty".to_owned(), ToString::to_string)
        }
        write!(
            f,
            "slot {}: {} -> {}",
            self.slot,
            describe(self.before.as_ref()),
            describe(self.after.as_ref())
        )
    }
}

/// Net item creation across one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DupeAnomaly {
    /// Human-readable reason.
    pub reason: String,
    /// Every non-zero per-key delta.
    pub deltas: BTreeMap<ItemKey, i64>,
}

impl DupeAnomaly {
    /// Sum of positive deltas.
    #[must_use]
    pub fn net_created(&self) -> i64 {
        self.deltas.values().filter(|d| **d > 0).sum()
    }
}

impl fmt::Display for DupeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)?;
        for (i, (key, delta)) in self.deltas.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}:{delta:+}", key.item)?;
        }
        Ok(())
    }
}

/// Compares aggregate counts and reports net creation above `threshold`.
#[must_use]
pub fn detect_duplication(
    before: &InventorySnapshot,
    after: &InventorySnapshot,
    threshold: u64,
) -> Option<DupeAnomaly> {
    let before_counts = before.aggregate_counts();
    let after_counts = after.aggregate_counts();

    let mut deltas = BTreeMap::new();
    let mut created: i64 = 0;
    for key in before_counts.keys().chain(after_counts.keys()) {
        if deltas.contains_key(key) {
            continue;
        }
        let delta = after_counts.get(key).copied().unwrap_or(0)
            - before_counts.get(key).copied().unwrap_or(0);
        if delta == 0 {
            continue;
        }
        if delta > 0 {
            created += delta;
        }
        deltas.insert(key.clone(), delta);
    }

    (created > i64::try_from(threshold).unwrap_or(i64::MAX)).then(|| DupeAnomaly {
        reason: "Net item creation detected".to_owned(),
        deltas,
    })
}

// ============================================================================
// Configuration
// ============================================================================

/// Inventory watcher configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct InventoryConfig {
    /// Slot changes allowed in any trailing second.
    pub max_swaps_per_second: usize,
    /// Net created items tolerated per transaction.
    pub dupe_threshold: u64,
    /// Minimum time between alerts for one entity. Zero disables the cooldown.
    pub alert_cooldown: Duration,
    /// Per-entity cooldown overrides.
    pub cooldown_overrides: HashMap<EntityId, Duration>,
}

impl InventoryConfig {
    /// Cooldown in effect for `entity`.
    #[must_use]
    pub fn cooldown_for(&self, entity: EntityId) -> Duration {
        self.cooldown_overrides
            .get(&entity)
            .copied()
            .unwrap_or(self.alert_cooldown)
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_swaps_per_second: 12,
            dupe_threshold: 0,
            alert_cooldown: Duration::from_secs(8),
            cooldown_overrides: HashMap::new(),
        }
    }
}

// ============================================================================
// Tasks and verdicts
// ============================================================================

/// Deferred evaluation of one mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryTask {
    /// Mutated entity.
    pub entity: EntityId,
    /// Per-entity sequence number.
    pub sequence: u64,
    /// What triggered the mutation.
    pub kind: MutationKind,
    /// Slots the host reported as touched.
    pub touched_slots: BTreeSet<usize>,
}

/// Everything known about a flagged transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionAlert {
    /// Mutated entity.
    pub entity: EntityId,
    /// Per-entity sequence number.
    pub sequence: u64,
    /// What triggered the mutation.
    pub kind: MutationKind,
    /// Slots the host reported as touched.
    pub touched_slots: BTreeSet<usize>,
    /// Slot differences against the baseline.
    pub changes: Vec<SlotChange>,
    /// Net creation, if detected.
    pub dupe: Option<DupeAnomaly>,
    /// Whether the swap rate was exceeded.
    pub rapid_swaps: bool,
    /// Swaps inside the trailing second.
    pub swaps_in_window: usize,
}

impl TransactionAlert {
    /// Net created items, or the swap count when only the rate tripped.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn severity(&self) -> f64 {
        match &self.dupe {
            Some(dupe) => dupe.net_created() as f64,
            None => self.swaps_in_window as f64,
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub fn reason(&self) -> String {
        match (&self.dupe, self.rapid_swaps) {
            (Some(dupe), true) => format!("{dupe}, rapid inventory swaps"),
            (Some(dupe), false) => dupe.to_string(),
            (None, _) => format!("rapid inventory swaps ({} in 1s)", self.swaps_in_window),
        }
    }
}

/// Outcome of one deferred evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum TransactionVerdict {
    /// The session or the host view was gone.
    Skipped {
        /// Mutated entity.
        entity: EntityId,
        /// Sequence number.
        sequence: u64,
    },
    /// First observation; stored as baseline without judgment.
    Seeded {
        /// Mutated entity.
        entity: EntityId,
        /// Sequence number.
        sequence: u64,
    },
    /// No flag; the snapshot became the new baseline.
    Accepted {
        /// Mutated entity.
        entity: EntityId,
        /// Sequence number.
        sequence: u64,
        /// Slot differences against the previous baseline.
        changes: Vec<SlotChange>,
    },
    /// Flagged, audited and restored to the baseline.
    Reverted(TransactionAlert),
    /// Flagged during the alert cooldown; no restore.
    Suppressed(TransactionAlert),
}

impl TransactionVerdict {
    /// Entity the verdict concerns.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Skipped { entity, .. }
            | Self::Seeded { entity, .. }
            | Self::Accepted { entity, .. } => *entity,
            Self::Reverted(alert) | Self::Suppressed(alert) => alert.entity,
        }
    }

    /// Returns true if the transaction raised a flag.
    #[must_use]
    pub const fn is_flagged(&self) -> bool {
        matches!(self, Self::Reverted(_) | Self::Suppressed(_))
    }
}

/// Live inventory access supplied by the host.
pub trait InventoryHost {
    /// Copies `entity`'s open view, or `None` if it no longer has one.
    fn capture(&mut self, entity: EntityId) -> Option<InventorySnapshot>;

    /// Overwrites `entity`'s open view with `snapshot`.
    fn restore(&mut self, entity: EntityId, snapshot: &InventorySnapshot);
}

// ============================================================================
// Watcher
// ============================================================================

#[derive(Debug)]
struct WatcherSession {
    name: String,
    sequence: u64,
    last_snapshot: Option<InventorySnapshot>,
    cooldown_until: Option<Millis>,
    swap_timestamps: VecDeque<Millis>,
}

impl WatcherSession {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            sequence: 0,
            last_snapshot: None,
            cooldown_until: None,
            swap_timestamps: VecDeque::new(),
        }
    }
}

fn register_swaps(timestamps: &mut VecDeque<Millis>, now: Millis, count: usize, max: usize) -> bool {
    if count == 0 {
        return false;
    }
    timestamps.extend(std::iter::repeat(now).take(count));
    let window_start = now.saturating_sub(SWAP_WINDOW_MS);
    while timestamps.front().is_some_and(|ts| *ts < window_start) {
        timestamps.pop_front();
    }
    timestamps.len() > max
}

fn cooldown_millis(cooldown: Duration) -> u64 {
    u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX)
}

/// Inventory engine: sequencing, deferred evaluation and reverts.
pub struct InventoryWatcher {
    config: InventoryConfig,
    sessions: SessionTable<WatcherSession>,
    sender: Sender<InventoryTask>,
    receiver: Receiver<InventoryTask>,
    sink: Arc<dyn PunishmentSink>,
}

impl InventoryWatcher {
    /// Creates a watcher reporting to `sink`.
    #[must_use]
    pub fn new(config: InventoryConfig, sink: Arc<dyn PunishmentSink>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            config,
            sessions: SessionTable::new(),
            sender,
            receiver,
            sink,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Records a mutation and schedules its evaluation. Returns the
    /// per-entity sequence number assigned to it.
    pub fn observe_mutation(
        &self,
        entity: EntityId,
        name: &str,
        kind: MutationKind,
        touched_slots: impl IntoIterator<Item = usize>,
    ) -> u64 {
        let sequence = self.sessions.with_session(
            entity,
            || WatcherSession::new(name),
            |session| {
                session.sequence += 1;
                session.sequence
            },
        );
        let task = InventoryTask {
            entity,
            sequence,
            kind,
            touched_slots: touched_slots.into_iter().collect(),
        };
        if self.sender.send(task).is_err() {
            tracing::warn!("Inventory task queue closed, dropping sequence {} for {}", sequence, name);
        }
        sequence
    }

    /// Number of scheduled, unevaluated mutations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Evaluates every scheduled mutation against `host`.
    pub fn run_pending<H: InventoryHost + ?Sized>(
        &self,
        host: &mut H,
        now: Millis,
    ) -> Vec<TransactionVerdict> {
        self.receiver
            .try_iter()
            .map(|task| {
                let (entity, sequence) = (task.entity, task.sequence);
                self.sessions
                    .with_existing(entity, |session| self.evaluate(session, task, host, now))
                    .unwrap_or(TransactionVerdict::Skipped { entity, sequence })
            })
            .collect()
    }

    fn evaluate<H: InventoryHost + ?Sized>(
        &self,
        session: &mut WatcherSession,
        task: InventoryTask,
        host: &mut H,
        now: Millis,
    ) -> TransactionVerdict {
        let InventoryTask {
            entity,
            sequence,
            kind,
            touched_slots,
        } = task;

        let Some(snapshot) = host.capture(entity) else {
            return TransactionVerdict::Skipped { entity, sequence };
        };
        let Some(previous) = session.last_snapshot.as_ref() else {
            session.last_snapshot = Some(snapshot);
            return TransactionVerdict::Seeded { entity, sequence };
        };

        let changes = snapshot.differences(previous);
        let rapid_swaps = register_swaps(
            &mut session.swap_timestamps,
            now,
            changes.len(),
            self.config.max_swaps_per_second,
        );
        let dupe = detect_duplication(previous, &snapshot, self.config.dupe_threshold);

        if !rapid_swaps && dupe.is_none() {
            session.last_snapshot = Some(snapshot);
            return TransactionVerdict::Accepted {
                entity,
                sequence,
                changes,
            };
        }

        let alert = TransactionAlert {
            entity,
            sequence,
            kind,
            touched_slots,
            changes,
            dupe,
            rapid_swaps,
            swaps_in_window: session.swap_timestamps.len(),
        };

        let cooldown = cooldown_millis(self.config.cooldown_for(entity));
        if cooldown > 0 && session.cooldown_until.is_some_and(|until| now < until) {
            tracing::debug!(
                "Suppressing inventory alert for {} (sequence {}) during cooldown",
                session.name,
                sequence
            );
            return TransactionVerdict::Suppressed(alert);
        }
        session.cooldown_until = (cooldown > 0).then(|| now.saturating_add(cooldown));

        tracing::warn!(
            target: "vigil::transactions",
            entity = %alert.entity,
            sequence = alert.sequence,
            kind = %alert.kind,
            touched_slots = ?alert.touched_slots,
            changes = ?alert.changes,
            dupe = ?alert.dupe,
            rapid_swaps = alert.rapid_swaps,
            "Reverting inventory transaction for {}",
            session.name
        );
        host.restore(entity, previous);
        self.sink
            .flag_suspect(&session.name, &alert.reason(), alert.severity());

        TransactionVerdict::Reverted(alert)
    }

    /// Last accepted snapshot for `entity`.
    #[must_use]
    pub fn baseline(&self, entity: EntityId) -> Option<InventorySnapshot> {
        self.sessions
            .with_existing(entity, |s| s.last_snapshot.clone())
            .flatten()
    }

    /// Drops all state for `entity`. Scheduled tasks for it are skipped.
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

    #[derive(Default)]
    struct FakeHost {
        views: HashMap<EntityId, InventorySnapshot>,
        restores: usize,
    }

    impl FakeHost {
        fn set(&mut self, entity: EntityId, slot: usize, stack: Option<ItemStack>) {
            self.views.entry(entity).or_default().set(slot, stack);
        }
    }

    impl InventoryHost for FakeHost {
        fn capture(&mut self, entity: EntityId) -> Option<InventorySnapshot> {
            self.views.get(&entity).cloned()
        }

        fn restore(&mut self, entity: EntityId, snapshot: &InventorySnapshot) {
            self.restores += 1;
            self.views.insert(entity, snapshot.clone());
        }
    }

    fn watcher(config: InventoryConfig) -> (InventoryWatcher, Arc<PunishmentManager>) {
        let sink = Arc::new(PunishmentManager::new());
        (InventoryWatcher::new(config, sink.clone()), sink)
    }

    fn seeded(config: InventoryConfig) -> (InventoryWatcher, Arc<PunishmentManager>, FakeHost) {
        let (watcher, sink) = watcher(config);
        let mut host = FakeHost::default();
        host.views.insert(ALICE, InventorySnapshot::with_slots(36));
        host.set(ALICE, 0, Some(ItemStack::new("diamond", 1)));
        watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [0]);
        assert!(matches!(
            watcher.run_pending(&mut host, 0)[0],
            TransactionVerdict::Seeded { .. }
        ));
        (watcher, sink, host)
    }

    #[test]
    fn test_identical_snapshots_have_no_differences() {
        let mut a = InventorySnapshot::with_slots(9);
        a.set(3, Some(ItemStack::new("stone", 64).with_meta("name", "Rock")));
        let b = a.clone();
        assert!(a.differences(&b).is_empty());
    }

    #[test]
    fn test_zero_quantity_equals_empty() {
        let mut a = InventorySnapshot::with_slots(4);
        a.set(2, Some(ItemStack::new("stone", 0)));
        let b = InventorySnapshot::with_slots(4);
        assert!(a.differences(&b).is_empty());
        assert!(a.aggregate_counts().is_empty());
    }

    #[test]
    fn test_differences_are_ordered_by_slot() {
        let previous = InventorySnapshot::with_slots(9);
        let mut current = previous.clone();
        current.set(7, Some(ItemStack::new("apple", 1)));
        current.set(2, Some(ItemStack::new("apple", 1)));
        current.set(12, Some(ItemStack::new("apple", 1)));

        let slots: Vec<_> = current.differences(&previous).iter().map(|c| c.slot).collect();
        assert_eq!(slots, vec![2, 7, 12]);
    }

    #[test]
    fn test_metadata_separates_item_keys() {
        let mut before = InventorySnapshot::with_slots(2);
        before.set(0, Some(ItemStack::new("sword", 1)));
        let mut after = InventorySnapshot::with_slots(2);
        after.set(0, Some(ItemStack::new("sword", 1).with_meta("enchant", "sharpness")));

        let dupe = detect_duplication(&before, &after, 0).unwrap();
        assert_eq!(dupe.net_created(), 1);
        assert_eq!(dupe.deltas.len(), 2);
    }

    #[test]
    fn test_set_ignores_slots_past_limit() {
        let mut view = InventorySnapshot::with_slots(9);
        assert!(!view.set(usize::MAX, Some(ItemStack::new("diamond", 1))));
        assert!(!view.set(MAX_SLOTS, Some(ItemStack::new("diamond", 1))));
        assert_eq!(view.len(), 9);

        assert!(view.set(MAX_SLOTS - 1, Some(ItemStack::new("diamond", 1))));
        assert_eq!(view.len(), MAX_SLOTS);
        assert_eq!(view.slot(MAX_SLOTS - 1), Some(&ItemStack::new("diamond", 1)));
    }

    #[test]
    fn test_moving_items_is_not_duplication() {
        let mut before = InventorySnapshot::with_slots(9);
        before.set(0, Some(ItemStack::new("diamond", 5)));
        let mut after = InventorySnapshot::with_slots(9);
        after.set(4, Some(ItemStack::new("diamond", 3)));
        after.set(5, Some(ItemStack::new("diamond", 2)));
        assert!(detect_duplication(&before, &after, 0).is_none());
    }

    #[test]
    fn test_first_observation_only_seeds() {
        let (watcher, sink, host) = seeded(InventoryConfig::default());
        assert_eq!(host.restores, 0);
        assert!(sink.is_empty());
        assert_eq!(watcher.baseline(ALICE).unwrap().slot(0).unwrap().quantity, 1);
    }

    #[test]
    fn test_duplication_is_reverted_to_previous_snapshot() {
        let (watcher, sink, mut host) = seeded(InventoryConfig::default());
        let before = host.views[&ALICE].clone();

        host.set(ALICE, 0, Some(ItemStack::new("diamond", 2)));
        host.set(ALICE, 1, Some(ItemStack::new("diamond", 1)));
        watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [1]);
        let verdicts = watcher.run_pending(&mut host, 1_000);

        let TransactionVerdict::Reverted(alert) = &verdicts[0] else {
            panic!("expected revert, got {:?}", verdicts[0]);
        };
        assert_eq!(alert.dupe.as_ref().unwrap().net_created(), 2);
        assert!(!alert.rapid_swaps);
        assert_eq!(alert.changes.len(), 2);
        assert_eq!(host.views[&ALICE], before);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "alice");
        assert_eq!(records[0].severity, 2.0);
        assert!(records[0].reason.starts_with("Net item creation detected"));
    }

    #[test]
    fn test_baseline_not_advanced_while_flagged() {
        let (watcher, _sink, mut host) = seeded(InventoryConfig::default());
        let baseline = watcher.baseline(ALICE).unwrap();

        host.set(ALICE, 0, Some(ItemStack::new("diamond", 64)));
        watcher.observe_mutation(ALICE, "alice", MutationKind::CreativeGive, [0]);
        let mut view = host.views[&ALICE].clone();
        watcher.run_pending(&mut host, 1_000);
        assert_eq!(watcher.baseline(ALICE).unwrap(), baseline);

        // Client resends the duplicated state during the cooldown.
        host.views.insert(ALICE, view.clone());
        watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [0]);
        let verdicts = watcher.run_pending(&mut host, 2_000);
        assert!(matches!(verdicts[0], TransactionVerdict::Suppressed(_)));
        assert_eq!(watcher.baseline(ALICE).unwrap(), baseline);

        // Legitimate change after the restore advances it.
        view = baseline.clone();
        view.set(0, None);
        view.set(9, Some(ItemStack::new("diamond", 1)));
        host.views.insert(ALICE, view.clone());
        watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [0, 9]);
        let verdicts = watcher.run_pending(&mut host, 3_000);
        assert!(matches!(verdicts[0], TransactionVerdict::Accepted { .. }));
        assert_eq!(watcher.baseline(ALICE).unwrap(), view);
    }

    #[test]
    fn test_cooldown_suppresses_repeat_alerts() {
        let (watcher, sink, mut host) = seeded(InventoryConfig::default());

        for (now, expect_revert) in [(1_000, true), (5_000, false), (9_000, true)] {
            host.set(ALICE, 1, Some(ItemStack::new("gold", 1)));
            watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [1]);
            let verdict = watcher.run_pending(&mut host, now).remove(0);
            assert!(verdict.is_flagged());
            assert_eq!(matches!(verdict, TransactionVerdict::Reverted(_)), expect_revert);
        }
        assert_eq!(host.restores, 2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_zero_cooldown_always_alerts() {
        let mut config = InventoryConfig::default();
        config.cooldown_overrides.insert(ALICE, Duration::ZERO);
        let (watcher, sink, mut host) = seeded(config);

        for now in [1_000, 1_001, 1_002] {
            host.set(ALICE, 1, Some(ItemStack::new("gold", 1)));
            watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [1]);
            let verdict = watcher.run_pending(&mut host, now).remove(0);
            assert!(matches!(verdict, TransactionVerdict::Reverted(_)));
        }
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn test_rapid_swaps_flag_without_duplication() {
        let config = InventoryConfig {
            dupe_threshold: u64::MAX,
            ..InventoryConfig::default()
        };
        let (watcher, sink, mut host) = seeded(config);

        // Each move of the single diamond changes two slots. Six moves make
        // 12 swaps in the window, which is still allowed.
        for (i, now) in (1_000..).step_by(100).take(6).enumerate() {
            let mut next = InventorySnapshot::with_slots(36);
            next.set(20 + i, Some(ItemStack::new("diamond", 1)));
            host.views.insert(ALICE, next);
            watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [20 + i]);
            let verdict = watcher.run_pending(&mut host, now).remove(0);
            assert!(
                matches!(verdict, TransactionVerdict::Accepted { ref changes, .. } if changes.len() == 2),
                "move {i} flagged early"
            );
        }

        let mut next = InventorySnapshot::with_slots(36);
        next.set(30, Some(ItemStack::new("diamond", 1)));
        host.views.insert(ALICE, next);
        watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [25, 30]);
        let TransactionVerdict::Reverted(alert) = watcher.run_pending(&mut host, 1_600).remove(0)
        else {
            panic!("expected swap revert");
        };
        assert!(alert.rapid_swaps);
        assert!(alert.dupe.is_none());
        assert_eq!(alert.swaps_in_window, 14);
        assert_eq!(sink.records()[0].severity, 14.0);
        assert!(sink.records()[0].reason.starts_with("rapid inventory swaps"));

        // Outside the one second window the rate resets.
        let verdict = {
            let mut next = InventorySnapshot::with_slots(36);
            next.set(31, Some(ItemStack::new("diamond", 1)));
            host.views.insert(ALICE, next);
            watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [25, 31]);
            watcher.run_pending(&mut host, 5_000).remove(0)
        };
        assert!(matches!(verdict, TransactionVerdict::Accepted { .. }));
    }

    #[test]
    fn test_sequences_increase_per_entity() {
        let (watcher, _sink) = watcher(InventoryConfig::default());
        assert_eq!(watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [0]), 1);
        assert_eq!(watcher.observe_mutation(ALICE, "alice", MutationKind::Drag, [0, 1]), 2);
        assert_eq!(watcher.observe_mutation(EntityId(2), "bob", MutationKind::Click, [0]), 1);
        assert_eq!(watcher.pending(), 3);
    }

    #[test]
    fn test_tasks_for_disconnected_entity_are_skipped() {
        let (watcher, _sink) = watcher(InventoryConfig::default());
        let mut host = FakeHost::default();
        host.views.insert(ALICE, InventorySnapshot::with_slots(9));
        watcher.observe_mutation(ALICE, "alice", MutationKind::Click, [0]);
        watcher.disconnect(ALICE);

        let verdicts = watcher.run_pending(&mut host, 0);
        assert_eq!(
            verdicts,
            vec![TransactionVerdict::Skipped {
                entity: ALICE,
                sequence: 1
            }]
        );
        assert_eq!(watcher.session_count(), 0);
    }
}
