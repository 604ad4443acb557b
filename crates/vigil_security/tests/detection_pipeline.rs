//! End-to-end tests: configuration feeding the movement and inventory engines.

use std::collections::HashMap;
use std::sync::Arc;

use vigil_core::{ChannelSink, EntityId, PunishmentManager, Vec3};
use vigil_security::{
    InventoryHost, InventorySnapshot, InventoryWatcher, ItemStack, MoveCause, MoveEvent,
    MoveOutcome, MovementMonitor, MutationKind, NoBypass, OpenAir, PermissionBypass,
    TransactionVerdict, VigilConfig,
};

const RUNNER: EntityId = EntityId(9);

const CONFIG: &str = r#"
[movement]
bypass-permission = "anticheat.movement.bypass"

[movement.physics]
gravity = 0.08
air-drag = 0.91
ground-friction = 0.6

[movement.thresholds]
horizontal-percent = 15
vertical-percent = 20

[movement.violations]
decay-seconds = 8
max-buffer = 20

[[movement.violations.triggers]]
type = "notify"
threshold = 3

[[movement.violations.triggers]]
type = "set-back"
threshold = 5

[inventory]
dupe-threshold = 1
alert-cooldown = 8

[inventory.cooldown-exemptions]
"9" = 0
"#;

fn walk(from_x: f64, to_x: f64, velocity_x: f64, tick: u64) -> MoveEvent {
    MoveEvent {
        from: Vec3::new(from_x, 64.0, 0.0),
        to: Vec3::new(to_x, 64.0, 0.0),
        velocity: Vec3::new(velocity_x, 0.0, 0.0),
        on_ground: true,
        tick,
        cause: MoveCause::Walk,
    }
}

#[test]
fn test_speed_hack_escalates_through_configured_actions() {
    let config = VigilConfig::from_toml_str(CONFIG).unwrap();
    let (sink, notifications) = ChannelSink::bounded(16);
    let monitor = MovementMonitor::new(config.movement, Arc::new(sink));

    // Grounded at 0.2 blocks/tick: friction predicts 0.12, allowance 0.138.
    let mut outcomes = Vec::new();
    for tick in 0..6u64 {
        let x = tick as f64 * 0.2;
        let event = walk(x, x + 0.2, 0.2, tick);
        outcomes.push(monitor.on_move(RUNNER, "runner", &event, tick * 50, &NoBypass, &OpenAir));
    }

    assert_eq!(outcomes[0], MoveOutcome::Clean);
    for (i, outcome) in outcomes[1..5].iter().enumerate() {
        match outcome {
            MoveOutcome::Flagged { violation, buffered } => {
                assert_eq!(*buffered, i + 1);
                assert!(!violation.hard_reject);
                assert!(violation.reason.starts_with("Horizontal excess"));
            }
            other => panic!("tick {} expected flag, got {other:?}", i + 1),
        }
    }
    match &outcomes[5] {
        MoveOutcome::SetBack { target, .. } => assert_eq!(*target, Vec3::new(0.2, 64.0, 0.0)),
        other => panic!("expected set-back, got {other:?}"),
    }
    assert_eq!(monitor.buffered_violations(RUNNER, 300), 0);

    let notified: Vec<_> = notifications.try_iter().collect();
    assert_eq!(notified.len(), 3);
    assert!(notified.iter().all(|r| r.subject == "runner"));
    assert_eq!(
        notified.iter().map(|r| r.severity).collect::<Vec<_>>(),
        vec![3.0, 4.0, 5.0]
    );
    assert!(notified[0].reason.contains("buffer=3"));

    // Host applies the set-back as a teleport; normal walking resumes clean.
    let teleport = MoveEvent {
        from: Vec3::new(1.2, 64.0, 0.0),
        to: Vec3::new(0.2, 64.0, 0.0),
        velocity: Vec3::ZERO,
        on_ground: true,
        tick: 6,
        cause: MoveCause::Teleport,
    };
    assert_eq!(
        monitor.on_move(RUNNER, "runner", &teleport, 300, &NoBypass, &OpenAir),
        MoveOutcome::Recorded
    );
    let stroll = walk(0.2, 0.24, 0.04, 7);
    assert_eq!(
        monitor.on_move(RUNNER, "runner", &stroll, 350, &NoBypass, &OpenAir),
        MoveOutcome::Clean
    );
}

#[test]
fn test_blink_is_hard_rejected_to_last_safe_position() {
    let config = VigilConfig::from_toml_str(CONFIG).unwrap();
    let sink = Arc::new(PunishmentManager::new());
    let monitor = MovementMonitor::new(config.movement, sink.clone());

    let start = walk(0.0, 0.1, 0.1, 0);
    assert_eq!(
        monitor.on_move(RUNNER, "blinker", &start, 0, &NoBypass, &OpenAir),
        MoveOutcome::Clean
    );

    let blink = walk(0.1, 4.1, 0.1, 1);
    match monitor.on_move(RUNNER, "blinker", &blink, 50, &NoBypass, &OpenAir) {
        MoveOutcome::SetBack { target, violation } => {
            assert!(violation.hard_reject);
            assert_eq!(target, Vec3::new(0.1, 64.0, 0.0));
        }
        other => panic!("expected hard reject, got {other:?}"),
    }
    assert!(sink.is_empty());
    assert_eq!(monitor.buffered_violations(RUNNER, 50), 0);
}

#[test]
fn test_temporary_bypass_grant_records_without_judging() {
    let config = VigilConfig::from_toml_str(CONFIG).unwrap();
    let bypass = PermissionBypass::new(config.movement.bypass_permission.clone());
    let monitor = MovementMonitor::new(config.movement, Arc::new(PunishmentManager::new()));

    bypass.grant(RUNNER, "anticheat.movement.bypass.elytra");
    let launch = walk(0.0, 6.0, 0.0, 0);
    assert_eq!(
        monitor.on_move(RUNNER, "flyer", &launch, 0, &bypass, &OpenAir),
        MoveOutcome::Recorded
    );

    bypass.revoke(RUNNER, "anticheat.movement.bypass.elytra");
    let again = walk(6.0, 12.0, 0.0, 1);
    assert!(matches!(
        monitor.on_move(RUNNER, "flyer", &again, 50, &bypass, &OpenAir),
        MoveOutcome::SetBack { .. }
    ));
}

#[derive(Default)]
struct Server {
    open_views: HashMap<EntityId, InventorySnapshot>,
}

impl InventoryHost for Server {
    fn capture(&mut self, entity: EntityId) -> Option<InventorySnapshot> {
        self.open_views.get(&entity).cloned()
    }

    fn restore(&mut self, entity: EntityId, snapshot: &InventorySnapshot) {
        self.open_views.insert(entity, snapshot.clone());
    }
}

#[test]
fn test_configured_inventory_threshold_and_exemption() {
    let config = VigilConfig::from_toml_str(CONFIG).unwrap();
    let sink = Arc::new(PunishmentManager::new());
    let watcher = InventoryWatcher::new(config.inventory, sink.clone());
    let mut server = Server::default();

    let mut view = InventorySnapshot::with_slots(36);
    view.set(0, Some(ItemStack::new("emerald", 10)));
    server.open_views.insert(RUNNER, view.clone());
    watcher.observe_mutation(RUNNER, "trader", MutationKind::Click, [0]);
    assert!(matches!(
        watcher.run_pending(&mut server, 0)[0],
        TransactionVerdict::Seeded { .. }
    ));

    // One extra emerald is within the configured tolerance.
    view.set(0, Some(ItemStack::new("emerald", 11)));
    server.open_views.insert(RUNNER, view.clone());
    watcher.observe_mutation(RUNNER, "trader", MutationKind::Click, [0]);
    assert!(matches!(
        watcher.run_pending(&mut server, 100)[0],
        TransactionVerdict::Accepted { .. }
    ));

    // Zero cooldown override: two back-to-back dupes are both reverted.
    for now in [200, 300] {
        let mut duped = view.clone();
        duped.set(1, Some(ItemStack::new("emerald", 11)));
        server.open_views.insert(RUNNER, duped);
        watcher.observe_mutation(RUNNER, "trader", MutationKind::Drag, [0, 1]);
        let verdict = watcher.run_pending(&mut server, now).remove(0);
        assert!(matches!(verdict, TransactionVerdict::Reverted(_)));
        assert_eq!(server.open_views[&RUNNER], view);
    }

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.severity == 11.0));
}
