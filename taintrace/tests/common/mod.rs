#![allow(dead_code)]

use taintrace::elf::Symbol;
use taintrace::instruction::{MemoryAccess, ThreadId};
use taintrace::replay::{Annotation, ReplayBackend, ReplayDebugger};
use taintrace::{DebuggerEvent, Options, TraceEngine};

pub const THREAD: ThreadId = 7;

pub const NOP: u64 = 0x1000;
pub const PUSH_RAX: u64 = 0x1001;
/// `je 0x1010`, falls through to 0x1020.
pub const JE: u64 = 0x101e;
pub const JE_TARGET: u64 = 0x1010;
pub const JE_NEXT: u64 = 0x1020;
/// `call puts`, returns to 0x2005.
pub const CALL_PUTS: u64 = 0x2000;
pub const AFTER_CALL: u64 = 0x2005;
pub const PUTS: u64 = 0x3000;
pub const STACK: u64 = 0x7000;

pub type Engine = TraceEngine<ReplayDebugger, ReplayBackend>;

pub fn program() -> ReplayDebugger {
    let mut debugger = ReplayDebugger::new();
    debugger.map(NOP, &[0x90, 0x50]);
    debugger.map(JE_TARGET, &[0x90; 14]);
    debugger.map(JE, &[0x74, 0xf0]);
    debugger.map(JE_NEXT, &[0x90, 0x90]);
    debugger.map(CALL_PUTS, &[0xe8, 0xfb, 0x0f, 0x00, 0x00, 0x90]);
    debugger.map(PUTS, &[0xc3]);
    debugger.map(STACK, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    debugger.add_symbols(vec![
        Symbol {
            address: NOP,
            size: 0x30,
            name: "main".to_string(),
        },
        Symbol {
            address: PUTS,
            size: 1,
            name: "puts".to_string(),
        },
    ]);
    debugger
}

pub fn symbolic_options() -> Options {
    Options {
        use_symbolic_engine: true,
        ..Options::default()
    }
}

pub fn engine(options: Options, annotations: Vec<Annotation>) -> Engine {
    TraceEngine::new(program(), ReplayBackend::new(annotations), options)
}

/// Start the process and arm the trigger.
pub fn armed(options: Options, annotations: Vec<Annotation>) -> Engine {
    let mut engine = engine(options, annotations);
    send(&mut engine, DebuggerEvent::ProcessStart);
    engine.enable_trigger();
    engine
}

pub fn send(engine: &mut Engine, event: DebuggerEvent) {
    engine.debugger_mut().observe(&event);
    engine.handle_event(event);
}

pub fn trace(engine: &mut Engine, address: u64) {
    send(
        engine,
        DebuggerEvent::Trace {
            thread: THREAD,
            address,
        },
    );
}

pub fn breakpoint(engine: &mut Engine, address: u64) {
    send(
        engine,
        DebuggerEvent::Breakpoint {
            thread: THREAD,
            address,
        },
    );
}

pub fn symbolized_branch(taken: bool, pc_id: u64) -> Annotation {
    Annotation {
        address: JE,
        symbolized: true,
        condition_taken: taken,
        pc_id: Some(pc_id),
        ..Annotation::default()
    }
}

pub fn push_storing(address: u64, size: usize) -> Annotation {
    Annotation {
        address: PUSH_RAX,
        tainted: true,
        stores: vec![MemoryAccess { address, size }],
        ..Annotation::default()
    }
}
