use crate::error::SemanticsError;
use crate::instruction::InstructionRecord;

/// Identifier of a symbolic expression inside the backend.
pub type SymbolicId = u64;

/// Instruction semantics plus the taint and symbolic engines.
pub trait SemanticsBackend {
    /// Decode `insn.opcodes` at `insn.address`: text, operands, branch shape.
    fn disassemble(&mut self, insn: &mut InstructionRecord) -> Result<(), SemanticsError>;

    /// Lift to IR and propagate taint and symbolic state, setting the
    /// record's flags and memory stores.
    fn build_semantics(&mut self, insn: &mut InstructionRecord) -> Result<(), SemanticsError>;

    /// Printable symbolic expressions produced by `insn`.
    fn symbolic_expressions(&self, insn: &InstructionRecord) -> Vec<String>;

    /// Current symbolic expression of the program counter.
    fn pc_symbolic_id(&self) -> SymbolicId;

    fn taint_memory(&mut self, address: u64, size: usize);

    fn symbolize_memory(&mut self, address: u64, size: usize);

    fn reset_engines(&mut self);

    fn enable_taint_engine(&mut self, enable: bool);

    fn enable_symbolic_engine(&mut self, enable: bool);
}
