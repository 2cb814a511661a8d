use std::sync::{Arc, Mutex};

use log::{debug, error, info, trace, warn};

use crate::debugger::{Answer, DecodedInsn, Debugger, StepTraceOptions};
use crate::error::{hex_bytes, DebuggerError, Error, Result};
use crate::event::DebuggerEvent;
use crate::instruction::{InstructionRecord, ThreadId, MAX_INSN_LEN};
use crate::options::Options;
use crate::pending::{ActionKind, PendingAction};
use crate::semantics::SemanticsBackend;
use crate::session::{Session, TraceState};
use crate::snapshot::Snapshot;

const BLACKLIST_COMMENT: &str = "Temporal bp set by taintrace for blacklisting";

/// Drives the semantics backend from the debugger's event stream.
pub struct TraceEngine<D: Debugger, S: SemanticsBackend> {
    debugger: D,
    backend: S,
    options: Options,
    session: Session,
    snapshot: Option<Snapshot>,
}

impl<D: Debugger, S: SemanticsBackend> TraceEngine<D, S> {
    pub fn new(debugger: D, backend: S, options: Options) -> Self {
        Self {
            debugger,
            backend,
            options,
            session: Session::new(),
            snapshot: None,
        }
    }

    pub fn debugger(&self) -> &D {
        &self.debugger
    }

    pub fn debugger_mut(&mut self) -> &mut D {
        &mut self.debugger
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> TraceState {
        self.session.state()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn enable_trigger(&mut self) {
        self.session.arm();
    }

    pub fn disable_trigger(&mut self) {
        self.session.disarm();
    }

    /// Single entry point for debugger notifications. Never fails: problems
    /// are logged and control goes back to the debugger.
    pub fn handle_event(&mut self, event: DebuggerEvent) {
        trace!("[+] Notification: {}", event);
        match event {
            DebuggerEvent::ProcessStart => {
                debug!("[+] Starting the debugged process. Resetting all the engines.");
                self.reset_engines();
                self.snapshot = None;
                self.debugger.clear_requests();
            }
            DebuggerEvent::StepInto { thread, address } => self.on_step(thread, address, "into"),
            DebuggerEvent::StepOver { thread, address } => self.on_step(thread, address, "over"),
            DebuggerEvent::Trace { thread, address } => self.on_trace(thread, address),
            DebuggerEvent::Breakpoint { thread, address } => self.on_breakpoint(thread, address),
            DebuggerEvent::ProcessExit => {
                debug!("[!] Process exiting...");
                self.session.disarm();
                self.session.release_instruction();
            }
        }
    }

    fn on_step(&mut self, thread: ThreadId, address: u64, direction: &str) {
        // The user is stepping by hand with analysis off.
        if !self.session.trigger_enabled() {
            return;
        }
        if let Err(e) = self.debugger.decode_insn(address) {
            warn!("[!] Some error decoding instruction at {:#x}: {}", address, e);
        }
        // A breakpoint we own and the step that reached it arrive as two
        // events for one instruction.
        if self.session.is_new_address(address) {
            trace!("[+] Stepping {}: {:#x} (Tid: {})", direction, address, thread);
            self.tritonize(address, thread);
        }
    }

    fn on_trace(&mut self, thread: ThreadId, address: u64) {
        if !self.session.trigger_enabled() {
            return;
        }

        match self.debugger.decode_insn(address) {
            Ok(insn) if insn.is_call => {
                if let Some(callee) = self.debugger.callee_name(address) {
                    if self.options.is_blacklisted(&callee) && self.skip_call(thread, insn, &callee)
                    {
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => warn!("[!] Some error decoding instruction at {:#x}: {}", address, e),
        }

        if self.session.is_new_address(address) {
            self.tritonize(address, thread);
        }
        self.session.count_traced();

        let os_transition = self
            .session
            .last_instruction()
            .map_or(false, |insn| self.options.is_os_transition(&insn.disassembly));
        if os_transition {
            trace!("[+] OS transition at {:#x}! Requesting a step over", address);
            self.debugger.suspend_process();
            self.debugger.request_step_over();
            self.debugger.request_continue_process();
            self.debugger.run_requests();
            return;
        }

        if let Some(limit) = self.options.throttle() {
            if self.session.current_trace_counter() >= limit {
                self.ask_to_continue(limit);
            }
        }
    }

    fn ask_to_continue(&mut self, limit: u64) {
        let total = self.session.total_number_traced_ins();
        let question = format!(
            "[?] {} instructions has been traced. Do you want to execute {} more?",
            total, limit
        );
        match self.debugger.ask_yes_no(&question) {
            Answer::Yes => self.session.reset_trace_window(),
            Answer::No | Answer::Cancel => {
                self.debugger.enable_step_trace(false);
                self.debugger.suspend_process();
                info!("[!] Process suspended (Traced {} instructions)", total);
            }
        }
    }

    /// Run a blacklisted call natively and resume analysis at its return
    /// address. Returns false if the skip could not be set up, in which
    /// case the call is traced like any other instruction.
    fn skip_call(&mut self, thread: ThreadId, call: DecodedInsn, callee: &str) -> bool {
        let resume_at = call.next_address();

        if let Err(e) = self.debugger.add_breakpoint(resume_at) {
            warn!(
                "[!] Not skipping blacklisted call to {} at {:#x}: {}",
                callee, call.address, e
            );
            return false;
        }
        self.debugger.set_comment(resume_at, BLACKLIST_COMMENT);

        let action = PendingAction::one_shot(resume_at, ActionKind::EnableTrigger);
        if let Err(e) = self.session.pending_actions_mut().register(action) {
            warn!(
                "[!] Not skipping blacklisted call to {} at {:#x}: {}",
                callee, call.address, e
            );
            self.debugger.del_breakpoint(resume_at);
            self.debugger.set_comment(resume_at, "");
            return false;
        }

        self.debugger.enable_step_trace(false);
        // Analyze the call itself so the return address it pushes reaches
        // the snapshot.
        self.tritonize(call.address, thread);
        self.session.skip_until(resume_at);
        debug!(
            "[+] Skipping blacklisted call to {} at {:#x}, resuming at {:#x}",
            callee, call.address, resume_at
        );
        true
    }

    fn on_breakpoint(&mut self, thread: ThreadId, address: u64) {
        trace!("[+] Breakpoint reached at {:#x} (Tid: {})", address, thread);
        let action = match self.session.pending_actions().get(address) {
            Some(action) => *action,
            // A user breakpoint, the debugger handles it.
            None => return,
        };

        self.run_action(action.kind);
        self.tritonize(address, thread);

        if !action.ignore_breakpoint {
            self.debugger.del_breakpoint(address);
            self.debugger.enable_step_trace(true);
            self.debugger
                .set_step_trace_options(StepTraceOptions::default());
            self.debugger.continue_process();
            self.debugger.set_comment(address, "");
            self.session.pending_actions_mut().remove(address);
        }
    }

    fn run_action(&mut self, kind: ActionKind) {
        trace!("[+] Running pending action {:?}", kind);
        match kind {
            ActionKind::EnableTrigger => self.session.arm(),
            ActionKind::DisableTrigger => self.session.disarm(),
            ActionKind::TaintMemory { address, size } => {
                self.backend.taint_memory(address, size);
                self.session.mark_tainted();
                self.session.arm();
            }
            ActionKind::SymbolizeMemory { address, size } => {
                self.backend.symbolize_memory(address, size);
                self.session.mark_tainted();
                self.session.arm();
            }
        }
    }

    /// Queue `action` and place the breakpoint that fires it. An existing
    /// breakpoint at the address is reused.
    pub fn add_pending_action(&mut self, action: PendingAction) -> Result<()> {
        let added = match self.debugger.add_breakpoint(action.address) {
            Ok(()) => true,
            Err(DebuggerError::DuplicateBreakpoint(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = self.session.pending_actions_mut().register(action) {
            if added {
                self.debugger.del_breakpoint(action.address);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Analyze the instruction at `pc` and make it the current record.
    ///
    /// Does nothing while the trigger is off. Callers check
    /// `Session::is_new_address` first when duplicates are possible.
    pub fn tritonize(&mut self, pc: u64, thread: ThreadId) {
        if !self.session.trigger_enabled() {
            return;
        }
        self.session.release_instruction();

        let size = match self.debugger.decode_insn(pc) {
            Ok(insn) => insn.size,
            Err(e) => {
                warn!("[!] Some error decoding instruction at {:#x}: {}", pc, e);
                MAX_INSN_LEN
            }
        };
        let opcodes = match self.debugger.read_memory(pc, size) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("[!] Cannot read instruction at {:#x}: {}", pc, e);
                self.session
                    .set_instruction(InstructionRecord::new(pc, thread, Vec::new()));
                return;
            }
        };

        let mut insn = InstructionRecord::new(pc, thread, opcodes);
        if let Err(e) = self.backend.disassemble(&mut insn) {
            error!(
                "[!] Disassembling error at {:#x} Opcodes: {} ({})",
                pc,
                hex_bytes(&insn.opcodes),
                e
            );
            self.session.set_instruction(insn);
            return;
        }
        debug!(
            "[+] Triton At {:#x}: {} (Thread id: {})",
            pc, insn.disassembly, thread
        );

        if let Err(e) = self.backend.build_semantics(&mut insn) {
            error!("[!] Cannot build semantics at {:#x}: {}", pc, e);
            self.session.set_instruction(insn);
            return;
        }

        self.record_stores(&insn);
        self.annotate(&insn);

        // Concrete operand values are taken as ground truth for this step.
        insn.trust_operands();

        if self.options.paint_executed_instructions {
            self.debugger
                .set_color(pc, self.options.color_executed_instruction);
        }

        if insn.is_tainted_or_symbolized() {
            debug!(
                "[!] Instruction {} at {:#x}",
                if insn.tainted { "tainted" } else { "symbolized" },
                pc
            );
            if self.options.rename_tainted_function_names {
                self.rename_tainted_function(pc);
            }
            let color = if insn.is_branch {
                self.options.color_tainted_condition
            } else {
                self.options.color_tainted
            };
            self.debugger.set_color(pc, color);
        }

        if insn.is_branch && insn.symbolized {
            match insn.taken_successors() {
                Some((taken, not_taken)) => {
                    debug!(
                        "[+] Branch symbolized detected at {:#x}: {:#x} or {:#x}, Taken:{}",
                        pc,
                        insn.next_address,
                        if insn.condition_taken { taken } else { not_taken },
                        if insn.condition_taken { "Yes" } else { "No" }
                    );
                    let pc_id = self.backend.pc_symbolic_id();
                    self.session
                        .path_constraints_mut()
                        .push(pc_id, pc, taken, not_taken);
                }
                None => warn!(
                    "[!] Symbolized branch at {:#x} has no immediate target",
                    pc
                ),
            }
        }

        self.session.set_instruction(insn);
    }

    /// Re-run analysis on the instruction the debuggee is stopped at, e.g.
    /// after its operands were tainted by hand.
    pub fn reanalyze_current_instruction(&mut self) {
        let pc = self.debugger.program_counter();
        let thread = self.debugger.current_thread();
        debug!("[+] Reanalyzing instruction at {:#x}", pc);
        self.tritonize(pc, thread);
    }

    fn record_stores(&mut self, insn: &InstructionRecord) {
        let snapshot = match self.snapshot.as_mut() {
            Some(snapshot) => snapshot,
            None => return,
        };
        for access in insn.stores.iter() {
            // The cached view can be stale after a debugger write.
            self.debugger.invalidate_memory(access.address, access.size);
            for offset in 0..access.size as u64 {
                let address = access.address + offset;
                match self.debugger.read_memory(address, 1) {
                    Ok(bytes) => {
                        if let Some(byte) = bytes.first() {
                            snapshot.add_modification(address, *byte);
                        }
                    }
                    Err(e) => warn!("[!] Snapshot could not read {:#x}: {}", address, e),
                }
            }
        }
    }

    fn annotate(&mut self, insn: &InstructionRecord) {
        let mut lines = Vec::new();
        if self.options.add_comments_controlled_operands {
            let controlled = insn
                .controlled_operands()
                .map(|op| op.text.as_str())
                .collect::<Vec<_>>();
            if !controlled.is_empty() {
                lines.push(format!("Controlled operands: {}", controlled.join(", ")));
            }
        }
        if self.options.add_comments_symbolic_expressions {
            lines.extend(self.backend.symbolic_expressions(insn));
        }
        if !lines.is_empty() {
            self.debugger.set_comment(insn.address, &lines.join("\n"));
        }
    }

    fn rename_tainted_function(&mut self, pc: u64) {
        let func = match self.debugger.function_at(pc) {
            Some(func) => func,
            None => return,
        };
        if is_tainted_name(&func.name) {
            return;
        }
        let name = format!(
            "T{:03}_{}",
            self.session.next_tainted_function_index(),
            func.name
        );
        if self.debugger.rename_function(func.start, &name) {
            debug!("[+] Renaming function {} -> {}", func.name, name);
        }
    }

    /// Bring every engine back to a clean baseline.
    pub fn reset_engines(&mut self) {
        debug!("[+] Restarting triton engines...");
        self.backend.reset_engines();
        self.backend
            .enable_taint_engine(self.options.use_tainting_engine);
        self.backend
            .enable_symbolic_engine(self.options.use_symbolic_engine);
        self.session = Session::new();
        debug!("[+] New session {}", self.session.id());
    }

    pub fn take_snapshot(&mut self) {
        if self.snapshot.is_some() {
            debug!("[+] Replacing the existing snapshot");
        }
        self.snapshot = Some(Snapshot::take(&self.debugger));
    }

    /// Roll memory and registers back and end the snapshot. On failure the
    /// snapshot is kept so the restore can be retried.
    pub fn restore_snapshot(&mut self) -> Result<()> {
        let snapshot = self.snapshot.take().ok_or(Error::NoSnapshot)?;
        if let Err(e) = snapshot.restore(&mut self.debugger) {
            self.snapshot = Some(snapshot);
            return Err(e);
        }
        self.session.release_instruction();
        Ok(())
    }

    pub fn discard_snapshot(&mut self) -> Option<Snapshot> {
        self.snapshot.take()
    }
}

/// Names produced by `rename_tainted_function` look like `T012_main` or,
/// past the thousandth function, `T1000_main`.
fn is_tainted_name(name: &str) -> bool {
    let rest = match name.strip_prefix('T') {
        Some(rest) => rest,
        None => return false,
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    digits >= 3 && rest[digits..].len() > 1 && rest[digits..].starts_with('_')
}

/// For hosts that can deliver notifications from more than one thread.
pub struct SharedEngine<D: Debugger, S: SemanticsBackend> {
    engine: Arc<Mutex<TraceEngine<D, S>>>,
}

impl<D: Debugger, S: SemanticsBackend> Clone for SharedEngine<D, S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<D: Debugger, S: SemanticsBackend> SharedEngine<D, S> {
    pub fn new(engine: TraceEngine<D, S>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn handle_event(&self, event: DebuggerEvent) {
        self.with(|engine| engine.handle_event(event))
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut TraceEngine<D, S>) -> R) -> R {
        let mut engine = match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut engine)
    }
}
