use serde_derive::{Deserialize, Serialize};

use crate::error::{DebuggerError, DecodeError};
use crate::instruction::ThreadId;
use crate::options::Color;

/// What the host disassembler knows about an address before any semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInsn {
    pub address: u64,
    pub size: usize,
    pub is_call: bool,
}

impl DecodedInsn {
    pub fn next_address(&self) -> u64 {
        self.address + self.size as u64
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub start: u64,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

/// Step-trace filters. The default traces everything, libraries included.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTraceOptions {
    pub skip_libraries: bool,
    pub skip_debug_segments: bool,
}

/// The host debugger and disassembler.
///
/// Methods named `request_*` only queue work; nothing happens until
/// `run_requests` and the current notification handler has returned.
pub trait Debugger {
    fn decode_insn(&mut self, address: u64) -> Result<DecodedInsn, DecodeError>;

    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>, DebuggerError>;

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<(), DebuggerError>;

    /// Drop any cached copy of debuggee memory in this range.
    fn invalidate_memory(&mut self, address: u64, size: usize);

    fn add_breakpoint(&mut self, address: u64) -> Result<(), DebuggerError>;

    fn del_breakpoint(&mut self, address: u64) -> bool;

    fn enable_step_trace(&mut self, enable: bool);

    fn set_step_trace_options(&mut self, options: StepTraceOptions);

    fn suspend_process(&mut self);

    fn continue_process(&mut self);

    fn request_step_over(&mut self);

    fn request_continue_process(&mut self);

    fn run_requests(&mut self);

    fn clear_requests(&mut self);

    fn current_thread(&self) -> ThreadId;

    fn program_counter(&self) -> u64;

    fn registers(&self) -> Vec<(String, u64)>;

    fn set_register(&mut self, name: &str, value: u64) -> Result<(), DebuggerError>;

    /// Symbolic name of the target of the call at `address`.
    fn callee_name(&mut self, address: u64) -> Option<String>;

    fn function_at(&self, address: u64) -> Option<FunctionInfo>;

    fn rename_function(&mut self, start: u64, name: &str) -> bool;

    /// An empty comment clears it.
    fn set_comment(&mut self, address: u64, comment: &str);

    fn set_color(&mut self, address: u64, color: Color);

    fn ask_yes_no(&mut self, question: &str) -> Answer;
}
