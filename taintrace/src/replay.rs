//! A recorded debugger session played back through the engine.
//!
//! The recording stands in for both collaborators: `ReplayDebugger` serves
//! memory, symbols and prompt answers and remembers every side effect the
//! engine asks for, and `ReplayBackend` decodes real x86-64 bytes while
//! taking taint and symbolic facts from per-address annotations.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs::read;
use std::path::PathBuf;

use indicatif::ProgressBar;
use log::{debug, info};
use serde_derive::{Deserialize, Serialize};

use crate::constraints::PathConstraint;
use crate::debugger::{Answer, DecodedInsn, Debugger, FunctionInfo, StepTraceOptions};
use crate::elf::{function_symbols, load_segments, MemoryRegion, Symbol};
use crate::engine::TraceEngine;
use crate::error::{hex_bytes, DebuggerError, DecodeError, Result, SemanticsError};
use crate::event::DebuggerEvent;
use crate::instruction::{InstructionRecord, MemoryAccess, ThreadId, MAX_INSN_LEN};
use crate::options::{Color, Options};
use crate::pending::PendingAction;
use crate::semantics::{SemanticsBackend, SymbolicId};
use crate::session::TraceState;
use crate::x86::X86Decoder;

/// Taint and symbolic facts for one instruction address.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Annotation {
    pub address: u64,
    pub tainted: bool,
    pub symbolized: bool,
    pub condition_taken: bool,
    pub stores: Vec<MemoryAccess>,
    /// Indices of operands carrying controlled data.
    pub controlled_operands: Vec<usize>,
    pub expressions: Vec<String>,
    pub pc_id: Option<SymbolicId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Recording {
    /// ELF image mapped before `memory` is applied.
    pub binary: Option<PathBuf>,
    pub memory: Vec<MemoryRegion>,
    pub symbols: Vec<Symbol>,
    pub registers: BTreeMap<String, u64>,
    pub annotations: Vec<Annotation>,
    /// Answers to throttle prompts, in order. Yes once exhausted.
    pub answers: Vec<Answer>,
    /// Registered after every process start.
    pub actions: Vec<PendingAction>,
    pub arm_on_start: bool,
    pub snapshot_on_start: bool,
    pub events: Vec<DebuggerEvent>,
}

impl Recording {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    StepOver,
    ContinueProcess,
}

pub struct ReplayDebugger {
    decoder: X86Decoder,
    memory: BTreeMap<u64, u8>,
    symbols: Vec<Symbol>,
    answers: VecDeque<Answer>,
    registers: BTreeMap<String, u64>,
    thread: ThreadId,
    pending_requests: Vec<Request>,
    pub breakpoints: BTreeSet<u64>,
    pub comments: BTreeMap<u64, String>,
    pub colors: BTreeMap<u64, Color>,
    pub step_trace: bool,
    pub step_trace_options: StepTraceOptions,
    pub suspended: bool,
    pub continues: usize,
    pub executed_requests: Vec<Request>,
    pub invalidations: Vec<MemoryAccess>,
    pub questions: Vec<String>,
}

impl Default for ReplayDebugger {
    fn default() -> Self {
        Self {
            decoder: X86Decoder::default(),
            memory: BTreeMap::new(),
            symbols: Vec::new(),
            answers: VecDeque::new(),
            registers: BTreeMap::new(),
            thread: 0,
            pending_requests: Vec::new(),
            breakpoints: BTreeSet::new(),
            comments: BTreeMap::new(),
            colors: BTreeMap::new(),
            step_trace: true,
            step_trace_options: StepTraceOptions::default(),
            suspended: false,
            continues: 0,
            executed_requests: Vec::new(),
            invalidations: Vec::new(),
            questions: Vec::new(),
        }
    }
}

impl ReplayDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_recording(recording: &Recording) -> Result<Self> {
        let mut debugger = Self::new();
        if let Some(path) = &recording.binary {
            let data = read(path)?;
            for region in load_segments(&data)? {
                debugger.map(region.address, &region.bytes);
            }
            debugger.add_symbols(function_symbols(&data)?);
        }
        for region in recording.memory.iter() {
            debugger.map(region.address, &region.bytes);
        }
        debugger.add_symbols(recording.symbols.iter().cloned());
        debugger.answers = recording.answers.iter().copied().collect();
        debugger.registers = recording.registers.clone();
        Ok(debugger)
    }

    pub fn map(&mut self, address: u64, bytes: &[u8]) {
        for (offset, byte) in bytes.iter().enumerate() {
            self.memory.insert(address + offset as u64, *byte);
        }
    }

    pub fn add_symbols(&mut self, symbols: impl IntoIterator<Item = Symbol>) {
        self.symbols.extend(symbols);
        self.symbols.sort_by_key(|s| s.address);
    }

    pub fn push_answer(&mut self, answer: Answer) {
        self.answers.push_back(answer);
    }

    pub fn byte(&self, address: u64) -> Option<u8> {
        self.memory.get(&address).copied()
    }

    pub fn symbol_at(&self, address: u64) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.address == address)
    }

    /// Move the simulated debuggee to the address of `event`.
    pub fn observe(&mut self, event: &DebuggerEvent) {
        match *event {
            DebuggerEvent::StepInto { thread, address }
            | DebuggerEvent::StepOver { thread, address }
            | DebuggerEvent::Trace { thread, address }
            | DebuggerEvent::Breakpoint { thread, address } => {
                self.thread = thread;
                self.registers.insert("rip".to_string(), address);
                self.suspended = false;
            }
            DebuggerEvent::ProcessStart => {
                self.suspended = false;
                self.step_trace = true;
            }
            DebuggerEvent::ProcessExit => {}
        }
    }

    fn window(&self, address: u64) -> Vec<u8> {
        (0..MAX_INSN_LEN as u64)
            .map_while(|offset| self.byte(address + offset))
            .collect()
    }
}

impl Debugger for ReplayDebugger {
    fn decode_insn(&mut self, address: u64) -> std::result::Result<DecodedInsn, DecodeError> {
        let bytes = self.window(address);
        if bytes.is_empty() {
            return Err(DecodeError::Unmapped(address));
        }
        let insn = self.decoder.decode(address, &bytes)?;
        Ok(DecodedInsn {
            address,
            size: insn.len(),
            is_call: insn.is_call(),
        })
    }

    fn read_memory(
        &mut self,
        address: u64,
        size: usize,
    ) -> std::result::Result<Vec<u8>, DebuggerError> {
        (0..size as u64)
            .map(|offset| self.byte(address + offset))
            .collect::<Option<Vec<_>>>()
            .ok_or(DebuggerError::Memory { address, size })
    }

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> std::result::Result<(), DebuggerError> {
        for offset in 0..bytes.len() as u64 {
            if !self.memory.contains_key(&(address + offset)) {
                return Err(DebuggerError::Memory {
                    address,
                    size: bytes.len(),
                });
            }
        }
        self.map(address, bytes);
        Ok(())
    }

    fn invalidate_memory(&mut self, address: u64, size: usize) {
        self.invalidations.push(MemoryAccess { address, size });
    }

    fn add_breakpoint(&mut self, address: u64) -> std::result::Result<(), DebuggerError> {
        if !self.memory.contains_key(&address) {
            return Err(DebuggerError::Breakpoint(address));
        }
        if !self.breakpoints.insert(address) {
            return Err(DebuggerError::DuplicateBreakpoint(address));
        }
        Ok(())
    }

    fn del_breakpoint(&mut self, address: u64) -> bool {
        self.breakpoints.remove(&address)
    }

    fn enable_step_trace(&mut self, enable: bool) {
        self.step_trace = enable;
    }

    fn set_step_trace_options(&mut self, options: StepTraceOptions) {
        self.step_trace_options = options;
    }

    fn suspend_process(&mut self) {
        self.suspended = true;
    }

    fn continue_process(&mut self) {
        self.suspended = false;
        self.continues += 1;
    }

    fn request_step_over(&mut self) {
        self.pending_requests.push(Request::StepOver);
    }

    fn request_continue_process(&mut self) {
        self.pending_requests.push(Request::ContinueProcess);
    }

    fn run_requests(&mut self) {
        for request in self.pending_requests.drain(..) {
            if request == Request::ContinueProcess {
                self.suspended = false;
                self.continues += 1;
            }
            self.executed_requests.push(request);
        }
    }

    fn clear_requests(&mut self) {
        self.pending_requests.clear();
    }

    fn current_thread(&self) -> ThreadId {
        self.thread
    }

    fn program_counter(&self) -> u64 {
        self.registers.get("rip").copied().unwrap_or(0)
    }

    fn registers(&self) -> Vec<(String, u64)> {
        self.registers
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }

    fn set_register(&mut self, name: &str, value: u64) -> std::result::Result<(), DebuggerError> {
        match self.registers.get_mut(name) {
            Some(reg) => {
                *reg = value;
                Ok(())
            }
            None => Err(DebuggerError::Register(name.to_string())),
        }
    }

    fn callee_name(&mut self, address: u64) -> Option<String> {
        let insn = self.decoder.decode(address, &self.window(address)).ok()?;
        if !insn.is_call() {
            return None;
        }
        let target = insn.relative_target()?;
        self.symbol_at(target).map(|s| s.name.clone())
    }

    fn function_at(&self, address: u64) -> Option<FunctionInfo> {
        self.symbols
            .iter()
            .rev()
            .find(|s| s.contains(address))
            .map(|s| FunctionInfo {
                start: s.address,
                name: s.name.clone(),
            })
    }

    fn rename_function(&mut self, start: u64, name: &str) -> bool {
        match self.symbols.iter_mut().find(|s| s.address == start) {
            Some(symbol) => {
                symbol.name = name.to_string();
                true
            }
            None => false,
        }
    }

    fn set_comment(&mut self, address: u64, comment: &str) {
        if comment.is_empty() {
            self.comments.remove(&address);
        } else {
            self.comments.insert(address, comment.to_string());
        }
    }

    fn set_color(&mut self, address: u64, color: Color) {
        self.colors.insert(address, color);
    }

    fn ask_yes_no(&mut self, question: &str) -> Answer {
        info!("{}", question);
        self.questions.push(question.to_string());
        self.answers.pop_front().unwrap_or(Answer::Yes)
    }
}

pub struct ReplayBackend {
    decoder: X86Decoder,
    annotations: HashMap<u64, Annotation>,
    tainted_memory: BTreeSet<u64>,
    symbolic_memory: BTreeSet<u64>,
    taint_enabled: bool,
    symbolic_enabled: bool,
    pc_id: SymbolicId,
    next_id: SymbolicId,
    pub resets: usize,
}

impl ReplayBackend {
    pub fn new(annotations: impl IntoIterator<Item = Annotation>) -> Self {
        Self {
            decoder: X86Decoder::default(),
            annotations: annotations.into_iter().map(|a| (a.address, a)).collect(),
            tainted_memory: BTreeSet::new(),
            symbolic_memory: BTreeSet::new(),
            taint_enabled: true,
            symbolic_enabled: true,
            pc_id: 0,
            next_id: 1,
            resets: 0,
        }
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.insert(annotation.address, annotation);
    }

    pub fn is_memory_tainted(&self, address: u64) -> bool {
        self.tainted_memory.contains(&address)
    }

    pub fn is_memory_symbolized(&self, address: u64) -> bool {
        self.symbolic_memory.contains(&address)
    }

    pub fn taint_enabled(&self) -> bool {
        self.taint_enabled
    }

    pub fn symbolic_enabled(&self) -> bool {
        self.symbolic_enabled
    }
}

impl SemanticsBackend for ReplayBackend {
    fn disassemble(&mut self, insn: &mut InstructionRecord) -> std::result::Result<(), SemanticsError> {
        let decoded = self
            .decoder
            .decode(insn.address, &insn.opcodes)
            .map_err(|_| SemanticsError::Disassembly {
                address: insn.address,
                opcodes: hex_bytes(&insn.opcodes),
            })?;
        insn.opcodes.truncate(decoded.len());
        insn.disassembly = decoded.disassembly();
        insn.operands = decoded.operands();
        insn.next_address = decoded.next_address();
        insn.is_branch = decoded.is_branch();
        // Unconditional jumps and calls always go to their target.
        insn.condition_taken = decoded.is_branch() && !decoded.is_conditional_branch();
        Ok(())
    }

    fn build_semantics(&mut self, insn: &mut InstructionRecord) -> std::result::Result<(), SemanticsError> {
        let annotation = match self.annotations.get(&insn.address) {
            Some(annotation) => annotation,
            None => return Ok(()),
        };
        insn.tainted = annotation.tainted && self.taint_enabled;
        insn.symbolized = annotation.symbolized && self.symbolic_enabled;
        insn.condition_taken |= annotation.condition_taken;
        insn.stores = annotation.stores.clone();
        for index in annotation.controlled_operands.iter() {
            if let Some(op) = insn.operands.get_mut(*index) {
                op.tainted = self.taint_enabled;
                op.symbolized = self.symbolic_enabled;
            }
        }
        if insn.is_branch && insn.symbolized {
            self.pc_id = match annotation.pc_id {
                Some(id) => id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
        }
        Ok(())
    }

    fn symbolic_expressions(&self, insn: &InstructionRecord) -> Vec<String> {
        self.annotations
            .get(&insn.address)
            .map(|a| a.expressions.clone())
            .unwrap_or_default()
    }

    fn pc_symbolic_id(&self) -> SymbolicId {
        self.pc_id
    }

    fn taint_memory(&mut self, address: u64, size: usize) {
        self.tainted_memory
            .extend((0..size as u64).map(|offset| address + offset));
    }

    fn symbolize_memory(&mut self, address: u64, size: usize) {
        self.symbolic_memory
            .extend((0..size as u64).map(|offset| address + offset));
    }

    fn reset_engines(&mut self) {
        self.tainted_memory.clear();
        self.symbolic_memory.clear();
        self.pc_id = 0;
        self.next_id = 1;
        self.resets += 1;
    }

    fn enable_taint_engine(&mut self, enable: bool) {
        self.taint_enabled = enable;
    }

    fn enable_symbolic_engine(&mut self, enable: bool) {
        self.symbolic_enabled = enable;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotByte {
    pub address: u64,
    pub original: u8,
    pub modified: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Report {
    pub session: String,
    pub state: TraceState,
    pub total_traced: u64,
    pub window_traced: u64,
    pub something_tainted: bool,
    pub tainted_functions: u32,
    pub last_instruction: Option<String>,
    pub path_constraints: Vec<PathConstraint>,
    pub pending_actions: Vec<PendingAction>,
    pub snapshot: Option<Vec<SnapshotByte>>,
    pub breakpoints: Vec<u64>,
    pub suspended: bool,
}

impl Report {
    pub fn from_engine(engine: &TraceEngine<ReplayDebugger, ReplayBackend>) -> Self {
        let session = engine.session();
        Self {
            session: session.id().to_string(),
            state: session.state(),
            total_traced: session.total_number_traced_ins(),
            window_traced: session.current_trace_counter(),
            something_tainted: session.is_something_tainted_or_symbolized(),
            tainted_functions: session.tainted_functions(),
            last_instruction: session
                .last_instruction()
                .map(|insn| format!("{:#x}: {}", insn.address, insn.disassembly)),
            path_constraints: session.path_constraints().iter().copied().collect(),
            pending_actions: session.pending_actions().iter().copied().collect(),
            snapshot: engine.snapshot().map(|snapshot| {
                snapshot
                    .modifications()
                    .map(|(address, m)| SnapshotByte {
                        address,
                        original: m.original,
                        modified: m.modified,
                    })
                    .collect()
            }),
            breakpoints: engine.debugger().breakpoints.iter().copied().collect(),
            suspended: engine.debugger().suspended,
        }
    }
}

/// Play `recording` through a fresh engine and return the engine as it
/// stands after the last event.
pub fn replay(
    recording: &Recording,
    options: Options,
    bar: &ProgressBar,
) -> Result<TraceEngine<ReplayDebugger, ReplayBackend>> {
    let debugger = ReplayDebugger::from_recording(recording)?;
    let backend = ReplayBackend::new(recording.annotations.iter().cloned());
    let mut engine = TraceEngine::new(debugger, backend, options);

    bar.set_length(recording.events.len() as u64);
    for event in recording.events.iter() {
        engine.debugger_mut().observe(event);
        engine.handle_event(*event);

        if *event == DebuggerEvent::ProcessStart {
            for action in recording.actions.iter() {
                engine.add_pending_action(*action)?;
            }
            if recording.arm_on_start {
                engine.enable_trigger();
            }
            if recording.snapshot_on_start {
                engine.take_snapshot();
            }
        }
        bar.inc(1);
    }
    bar.finish();

    debug!(
        "Replayed {} events, {} path constraints",
        recording.events.len(),
        engine.session().path_constraints().len()
    );
    Ok(engine)
}
