use std::fmt::{Display, Formatter, Result as DisplayResult};

use serde_derive::{Deserialize, Serialize};

use crate::instruction::ThreadId;

/// A debugger notification, decoded once at the host boundary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebuggerEvent {
    ProcessStart,
    StepInto { thread: ThreadId, address: u64 },
    StepOver { thread: ThreadId, address: u64 },
    Trace { thread: ThreadId, address: u64 },
    Breakpoint { thread: ThreadId, address: u64 },
    ProcessExit,
}

impl Display for DebuggerEvent {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        match self {
            DebuggerEvent::ProcessStart => write!(f, "process start"),
            DebuggerEvent::StepInto { thread, address } => {
                write!(f, "step into {:#x} (tid {})", address, thread)
            }
            DebuggerEvent::StepOver { thread, address } => {
                write!(f, "step over {:#x} (tid {})", address, thread)
            }
            DebuggerEvent::Trace { thread, address } => {
                write!(f, "trace {:#x} (tid {})", address, thread)
            }
            DebuggerEvent::Breakpoint { thread, address } => {
                write!(f, "breakpoint {:#x} (tid {})", address, thread)
            }
            DebuggerEvent::ProcessExit => write!(f, "process exit"),
        }
    }
}
