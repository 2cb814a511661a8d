use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraints::PathConstraintLog;
use crate::instruction::InstructionRecord;
use crate::pending::PendingActions;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TraceState {
    /// Trigger off, the debugger free-runs.
    Disabled,
    Armed,
    /// Trigger off while a blacklisted call runs; re-armed at `resume_at`.
    BlacklistSkip { resume_at: u64 },
}

/// Everything the engine knows about one run of the debuggee.
///
/// A fresh session is created on every process start and by
/// `TraceEngine::reset_engines`.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: TraceState,
    last_instruction: Option<InstructionRecord>,
    total_number_traced_ins: u64,
    current_trace_counter: u64,
    path_constraints: PathConstraintLog,
    pending_actions: PendingActions,
    is_something_tainted_or_symbolized: bool,
    tainted_functions_index: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TraceState::Disabled,
            last_instruction: None,
            total_number_traced_ins: 0,
            current_trace_counter: 0,
            path_constraints: PathConstraintLog::new(),
            pending_actions: PendingActions::new(),
            is_something_tainted_or_symbolized: false,
            tainted_functions_index: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TraceState {
        self.state
    }

    pub fn trigger_enabled(&self) -> bool {
        self.state == TraceState::Armed
    }

    pub fn arm(&mut self) {
        self.state = TraceState::Armed;
    }

    pub fn disarm(&mut self) {
        self.state = TraceState::Disabled;
    }

    pub(crate) fn skip_until(&mut self, resume_at: u64) {
        self.state = TraceState::BlacklistSkip { resume_at };
    }

    pub fn last_instruction(&self) -> Option<&InstructionRecord> {
        self.last_instruction.as_ref()
    }

    /// True unless `address` is the instruction analyzed last.
    pub fn is_new_address(&self, address: u64) -> bool {
        self.last_instruction
            .as_ref()
            .map_or(true, |insn| insn.address != address)
    }

    pub(crate) fn release_instruction(&mut self) {
        self.last_instruction = None;
    }

    pub(crate) fn set_instruction(&mut self, insn: InstructionRecord) -> &mut InstructionRecord {
        self.last_instruction.insert(insn)
    }

    pub fn total_number_traced_ins(&self) -> u64 {
        self.total_number_traced_ins
    }

    pub fn current_trace_counter(&self) -> u64 {
        self.current_trace_counter
    }

    pub(crate) fn count_traced(&mut self) {
        self.current_trace_counter += 1;
        self.total_number_traced_ins += 1;
    }

    pub(crate) fn reset_trace_window(&mut self) {
        self.current_trace_counter = 0;
    }

    pub fn path_constraints(&self) -> &PathConstraintLog {
        &self.path_constraints
    }

    pub(crate) fn path_constraints_mut(&mut self) -> &mut PathConstraintLog {
        &mut self.path_constraints
    }

    pub fn pending_actions(&self) -> &PendingActions {
        &self.pending_actions
    }

    pub(crate) fn pending_actions_mut(&mut self) -> &mut PendingActions {
        &mut self.pending_actions
    }

    pub fn is_something_tainted_or_symbolized(&self) -> bool {
        self.is_something_tainted_or_symbolized
    }

    pub(crate) fn mark_tainted(&mut self) {
        self.is_something_tainted_or_symbolized = true;
    }

    pub fn tainted_functions(&self) -> u32 {
        self.tainted_functions_index
    }

    pub(crate) fn next_tainted_function_index(&mut self) -> u32 {
        let index = self.tainted_functions_index;
        self.tainted_functions_index += 1;
        index
    }
}
