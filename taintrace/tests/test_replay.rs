use indicatif::ProgressBar;
use serde_json::{json, Value};

use taintrace::replay::{replay, Recording, Report};
use taintrace::session::TraceState;
use taintrace::{Error, Options};

fn recording(extra: Value) -> Recording {
    let mut base = json!({
        "memory": [
            {"address": 0x1000, "bytes": [0x90, 0x50]},
            {"address": 0x1010, "bytes": [0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90,
                                           0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90]},
            {"address": 0x101e, "bytes": [0x74, 0xf0]},
            {"address": 0x2000, "bytes": [0xe8, 0xfb, 0x0f, 0x00, 0x00, 0x90]},
            {"address": 0x3000, "bytes": [0xc3]},
            {"address": 0x7000, "bytes": [0x11, 0x22, 0x33, 0x44]}
        ],
        "symbols": [
            {"address": 0x1000, "size": 0x30, "name": "main"},
            {"address": 0x3000, "name": "puts"}
        ],
        "registers": {"rip": 0x1000, "rax": 5},
        "annotations": [
            {"address": 0x1001, "tainted": true,
             "stores": [{"address": 0x7000, "size": 4}]},
            {"address": 0x101e, "symbolized": true, "condition_taken": true, "pc_id": 77}
        ],
        "events": [
            {"event": "process_start"},
            {"event": "trace", "thread": 1, "address": 0x1000},
            {"event": "trace", "thread": 1, "address": 0x1001},
            {"event": "trace", "thread": 1, "address": 0x101e},
            {"event": "trace", "thread": 1, "address": 0x1010},
            {"event": "trace", "thread": 1, "address": 0x2000},
            {"event": "breakpoint", "thread": 1, "address": 0x2005},
            {"event": "trace", "thread": 1, "address": 0x2005}
        ]
    });
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    Recording::from_json(base.to_string().as_bytes()).unwrap()
}

fn symbolic() -> Options {
    Options {
        use_symbolic_engine: true,
        ..Options::default()
    }
}

#[test]
fn test_replay_full_session() {
    let recording = recording(json!({"arm_on_start": true, "snapshot_on_start": true}));
    let engine = replay(&recording, symbolic(), &ProgressBar::hidden()).unwrap();

    let session = engine.session();
    assert_eq!(session.state(), TraceState::Armed);
    // The skipped call is not counted.
    assert_eq!(session.total_number_traced_ins(), 5);
    assert_eq!(session.path_constraints().len(), 1);
    assert!(session.pending_actions().is_empty());
    assert_eq!(session.tainted_functions(), 1);

    let report = Report::from_engine(&engine);
    assert_eq!(report.session, session.id().to_string());
    assert_eq!(report.total_traced, 5);
    assert_eq!(report.path_constraints[0].taken_addr, 0x1010);
    assert_eq!(report.path_constraints[0].not_taken_addr, 0x1020);
    assert_eq!(report.path_constraints[0].pc_id, 77);
    assert_eq!(report.last_instruction.as_deref(), Some("0x2005: nop"));
    assert!(report.breakpoints.is_empty());
    assert!(!report.suspended);

    let snapshot = report.snapshot.unwrap();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot[0].address, 0x7000);
    assert_eq!(snapshot[0].original, 0x11);

    let value = serde_json::to_value(Report::from_engine(&engine)).unwrap();
    assert_eq!(value["state"]["state"], "armed");
    assert_eq!(value["path_constraints"][0]["condition_addr"], 0x101e);
}

#[test]
fn test_replay_unarmed_sees_nothing() {
    let recording = recording(json!({}));
    let engine = replay(&recording, symbolic(), &ProgressBar::hidden()).unwrap();

    let report = Report::from_engine(&engine);
    assert_eq!(report.state, TraceState::Disabled);
    assert_eq!(report.total_traced, 0);
    assert!(report.path_constraints.is_empty());
    assert!(report.snapshot.is_none());
    assert!(report.last_instruction.is_none());
}

#[test]
fn test_replay_action_arms_at_address() {
    let recording = recording(json!({
        "actions": [{
            "address": 0x101e,
            "ignore_breakpoint": false,
            "kind": {"kind": "symbolize_memory", "address": 0x7000, "size": 4}
        }],
        "events": [
            {"event": "process_start"},
            {"event": "trace", "thread": 1, "address": 0x1000},
            {"event": "breakpoint", "thread": 1, "address": 0x101e},
            {"event": "trace", "thread": 1, "address": 0x101e},
            {"event": "trace", "thread": 1, "address": 0x1010},
            {"event": "process_exit"}
        ]
    }));
    let engine = replay(&recording, symbolic(), &ProgressBar::hidden()).unwrap();

    let session = engine.session();
    assert_eq!(session.state(), TraceState::Disabled);
    assert!(session.is_something_tainted_or_symbolized());
    assert!(engine.backend().is_memory_symbolized(0x7003));
    // Analyzed once at the breakpoint, the following trace is a duplicate.
    assert_eq!(session.path_constraints().len(), 1);
    assert_eq!(session.total_number_traced_ins(), 2);
    assert_eq!(engine.debugger().continues, 1);
    assert!(engine.debugger().breakpoints.is_empty());
}

#[test]
fn test_replay_throttle_answers() {
    let recording = recording(json!({
        "arm_on_start": true,
        "answers": ["no"],
        "events": [
            {"event": "process_start"},
            {"event": "trace", "thread": 1, "address": 0x1000},
            {"event": "trace", "thread": 1, "address": 0x1001},
            {"event": "trace", "thread": 1, "address": 0x101e}
        ]
    }));
    let options = Options {
        limit_instructions_tracing: Some(3),
        ..Options::default()
    };
    let engine = replay(&recording, options, &ProgressBar::hidden()).unwrap();

    assert_eq!(engine.debugger().questions.len(), 1);
    assert!(!engine.debugger().step_trace);
    assert!(engine.debugger().suspended);
    assert_eq!(engine.session().total_number_traced_ins(), 3);
}

#[test]
fn test_replay_bad_action_address() {
    let recording = recording(json!({
        "actions": [{
            "address": 0x9000,
            "ignore_breakpoint": true,
            "kind": {"kind": "enable_trigger"}
        }]
    }));
    let result = replay(&recording, Options::default(), &ProgressBar::hidden());
    assert!(matches!(result, Err(Error::Debugger(_))));
}

#[test]
fn test_recording_rejects_bad_json() {
    assert!(Recording::from_json(b"{\"events\": [{\"event\": \"teleport\"}]}").is_err());
}
