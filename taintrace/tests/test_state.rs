mod common;

use common::*;
use taintrace::constraints::PathConstraintLog;
use taintrace::debugger::Debugger;
use taintrace::pending::{ActionKind, PendingAction, PendingActions};
use taintrace::session::{Session, TraceState};
use taintrace::snapshot::Snapshot;
use taintrace::{Error, Options};

#[test]
fn test_constraint_log_lookup() {
    let mut log = PathConstraintLog::new();
    log.push(10, 0x401000, 0x401010, 0x401002);
    log.push(11, 0x402000, 0x402006, 0x402040);
    let third = *log.push(12, 0x401000, 0x401002, 0x401010);
    assert_eq!(third.bound, 2);

    assert_eq!(log.len(), 3);
    let at = log.at_address(0x401000).map(|c| c.bound).collect::<Vec<_>>();
    assert_eq!(at, vec![0, 2]);
    assert_eq!(log.prefix(1).len(), 2);
    assert_eq!(log.prefix(99).len(), 3);
    assert!(log.get(3).is_none());
    assert_eq!(third.label(), "2. 0x401000 -> 0x401002");
    assert_eq!(
        third.to_string(),
        "#2 0x401000: taken 0x401002, not taken 0x401010 (pc expr 12)"
    );
}

#[test]
fn test_pending_actions_one_per_address() {
    let mut actions = PendingActions::new();
    actions
        .register(PendingAction::one_shot(0x10, ActionKind::EnableTrigger))
        .unwrap();
    let err = actions
        .register(PendingAction::persistent(0x10, ActionKind::DisableTrigger))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateAction(0x10)));
    assert_eq!(actions.get(0x10).unwrap().kind, ActionKind::EnableTrigger);

    actions
        .register(PendingAction::persistent(
            0x8,
            ActionKind::SymbolizeMemory {
                address: 0x7000,
                size: 8,
            },
        ))
        .unwrap();
    let order = actions.iter().map(|a| a.address).collect::<Vec<_>>();
    assert_eq!(order, vec![0x8, 0x10]);

    assert!(actions.remove(0x10).is_some());
    assert!(!actions.contains(0x10));
    assert_eq!(actions.len(), 1);
}

#[test]
fn test_pending_action_json() {
    let action: PendingAction = serde_json::from_str(
        r#"{"address": 4096, "ignore_breakpoint": false,
            "kind": {"kind": "taint_memory", "address": 28672, "size": 4}}"#,
    )
    .unwrap();
    assert_eq!(
        action,
        PendingAction::one_shot(
            0x1000,
            ActionKind::TaintMemory {
                address: 0x7000,
                size: 4
            }
        )
    );
}

#[test]
fn test_session_state_machine() {
    let mut session = Session::new();
    assert_eq!(session.state(), TraceState::Disabled);
    assert!(!session.trigger_enabled());
    assert!(session.is_new_address(0x1000));

    session.arm();
    assert!(session.trigger_enabled());
    session.disarm();
    assert!(!session.trigger_enabled());

    assert_ne!(session.id(), Session::new().id());
}

#[test]
fn test_snapshot_keeps_first_value() {
    let mut snapshot = Snapshot::default();
    snapshot.add_modification(0x7000, 0x11);
    snapshot.add_modification(0x7000, 0x22);
    snapshot.add_modification(0x7000, 0x33);
    snapshot.add_modification(0x7001, 0x44);

    let m = snapshot.get(0x7000).unwrap();
    assert_eq!((m.original, m.modified), (0x11, 0x33));
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.registers().is_empty());
}

#[test]
fn test_snapshot_restore_fails_on_unmapped() {
    let mut debugger = program();
    let mut snapshot = Snapshot::take(&debugger);
    snapshot.add_modification(0x9000, 0x1);
    assert!(snapshot.restore(&mut debugger).is_err());
    assert!(debugger.read_memory(0x9000, 1).is_err());
}

#[test]
fn test_options_from_partial_json() {
    let options = Options::from_json(
        br#"{"use_symbolic_engine": true, "limit_instructions_tracing": 1000,
             "blacklist": ["strcpy"]}"#,
    )
    .unwrap();
    assert!(options.use_symbolic_engine);
    assert!(options.use_tainting_engine);
    assert_eq!(options.throttle(), Some(1000));
    assert!(options.is_blacklisted("strcpy"));
    assert!(!options.is_blacklisted("printf"));
    assert_eq!(options.color_tainted, Options::default().color_tainted);
}

#[test]
fn test_options_defaults() {
    let options = Options::default();
    assert!(options.is_blacklisted("printf"));
    assert!(!options.is_blacklisted("print"));
    assert!(options.is_os_transition("call dword ptr fs:[0xc0]"));
    assert!(!options.is_os_transition("call qword ptr [rip + 0x10]"));
    assert_eq!(options.throttle(), None);

    let zero = Options {
        limit_instructions_tracing: Some(0),
        ..Options::default()
    };
    assert_eq!(zero.throttle(), None);
}

#[test]
fn test_options_rejects_bad_json() {
    assert!(matches!(
        Options::from_json(b"{\"blacklist\": 3}"),
        Err(Error::Json(_))
    ));
}
