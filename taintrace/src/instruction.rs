use serde_derive::{Deserialize, Serialize};

pub type ThreadId = u32;

/// Longest encodable x86 instruction.
pub const MAX_INSN_LEN: usize = 15;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub address: u64,
    pub size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandRecord {
    pub text: String,
    /// Absolute value for immediates and resolved relative targets.
    pub immediate: Option<u64>,
    pub tainted: bool,
    pub symbolized: bool,
    pub trusted: bool,
}

impl OperandRecord {
    pub fn new(text: String, immediate: Option<u64>) -> Self {
        Self {
            text,
            immediate,
            ..Default::default()
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.tainted || self.symbolized
    }
}

/// The most recently analyzed instruction.
///
/// Filled in two passes by the semantics backend: disassembly sets the
/// decoded form (text, operands, branch shape), semantics sets the
/// taint/symbolic flags and the memory stores.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionRecord {
    pub address: u64,
    pub thread_id: ThreadId,
    pub opcodes: Vec<u8>,
    pub disassembly: String,
    pub operands: Vec<OperandRecord>,
    pub next_address: u64,
    pub is_branch: bool,
    pub condition_taken: bool,
    pub tainted: bool,
    pub symbolized: bool,
    pub stores: Vec<MemoryAccess>,
}

impl InstructionRecord {
    pub fn new(address: u64, thread_id: ThreadId, opcodes: Vec<u8>) -> Self {
        Self {
            address,
            thread_id,
            next_address: address + opcodes.len() as u64,
            opcodes,
            ..Default::default()
        }
    }

    pub fn is_tainted_or_symbolized(&self) -> bool {
        self.tainted || self.symbolized
    }

    pub fn trust_operands(&mut self) {
        for op in self.operands.iter_mut() {
            op.trusted = true;
        }
    }

    /// (fall-through, encoded target) for a branch with an immediate target.
    pub fn successors(&self) -> Option<(u64, u64)> {
        if !self.is_branch {
            return None;
        }
        let target = self.operands.first()?.immediate?;
        Some((self.next_address, target))
    }

    /// (taken, not-taken), ordered by what this execution actually did.
    pub fn taken_successors(&self) -> Option<(u64, u64)> {
        let (next, target) = self.successors()?;
        if self.condition_taken {
            Some((target, next))
        } else {
            Some((next, target))
        }
    }

    pub fn controlled_operands(&self) -> impl Iterator<Item = &OperandRecord> {
        self.operands.iter().filter(|op| op.is_controlled())
    }
}
