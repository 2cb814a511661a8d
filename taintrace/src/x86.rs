use yaxpeax_arch::LengthedInstruction;
use yaxpeax_x86::amd64::{DisplayStyle, Instruction, Opcode, Operand};
use yaxpeax_x86::long_mode::InstDecoder;

use crate::error::{hex_bytes, DecodeError};
use crate::instruction::OperandRecord;

pub struct X86Decoder {
    decoder: InstDecoder,
}

impl Default for X86Decoder {
    fn default() -> Self {
        Self {
            decoder: InstDecoder::default(),
        }
    }
}

impl X86Decoder {
    pub fn decode(&self, address: u64, bytes: &[u8]) -> Result<X86Insn, DecodeError> {
        match self.decoder.decode_slice(bytes) {
            Ok(instr) => Ok(X86Insn { address, instr }),
            Err(e) => Err(DecodeError::Invalid {
                address,
                reason: format!("{} ({})", e, hex_bytes(bytes)),
            }),
        }
    }
}

pub struct X86Insn {
    pub address: u64,
    pub instr: Instruction,
}

impl X86Insn {
    pub fn len(&self) -> usize {
        self.instr.len().to_const() as usize
    }

    pub fn next_address(&self) -> u64 {
        self.address + self.len() as u64
    }

    pub fn is_call(&self) -> bool {
        matches!(self.instr.opcode(), Opcode::CALL | Opcode::CALLF)
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self.instr.opcode(),
            Opcode::JA
                | Opcode::JB
                | Opcode::JRCXZ
                | Opcode::JG
                | Opcode::JGE
                | Opcode::JL
                | Opcode::JLE
                | Opcode::JNA
                | Opcode::JNB
                | Opcode::JNO
                | Opcode::JNP
                | Opcode::JNS
                | Opcode::JNZ
                | Opcode::JO
                | Opcode::JP
                | Opcode::JS
                | Opcode::JZ
                | Opcode::LOOP
                | Opcode::LOOPNZ
                | Opcode::LOOPZ
        )
    }

    /// Anything that can move the program counter somewhere other than the
    /// next instruction.
    pub fn is_branch(&self) -> bool {
        self.is_conditional_branch()
            || matches!(
                self.instr.opcode(),
                Opcode::JMP | Opcode::JMPF | Opcode::CALL | Opcode::CALLF | Opcode::RETURN
            )
    }

    /// Absolute target of a relative jump or call.
    pub fn relative_target(&self) -> Option<u64> {
        if !self.is_branch() {
            return None;
        }
        let rel: i64 = match self.instr.operand(0) {
            Operand::ImmediateI8(imm) => imm as i64,
            Operand::ImmediateI16(imm) => imm as i64,
            Operand::ImmediateI32(imm) => imm as i64,
            Operand::ImmediateI64(imm) => imm,
            _ => return None,
        };
        Some((self.next_address() as i64).wrapping_add(rel) as u64)
    }

    pub fn disassembly(&self) -> String {
        self.instr.display_with(DisplayStyle::Intel).to_string()
    }

    /// Operand text, with immediates resolved. Relative branch targets are
    /// reported as absolute addresses.
    pub fn operands(&self) -> Vec<OperandRecord> {
        let target = self.relative_target();
        (0..self.instr.operand_count())
            .map(|i| {
                let op = self.instr.operand(i);
                let immediate = if i == 0 && target.is_some() {
                    target
                } else {
                    immediate(&op)
                };
                OperandRecord::new(op.to_string(), immediate)
            })
            .collect()
    }
}

fn immediate(op: &Operand) -> Option<u64> {
    match *op {
        Operand::ImmediateI8(imm) => Some(imm as i64 as u64),
        Operand::ImmediateU8(imm) => Some(imm as u64),
        Operand::ImmediateI16(imm) => Some(imm as i64 as u64),
        Operand::ImmediateU16(imm) => Some(imm as u64),
        Operand::ImmediateI32(imm) => Some(imm as i64 as u64),
        Operand::ImmediateU32(imm) => Some(imm as u64),
        Operand::ImmediateI64(imm) => Some(imm as u64),
        Operand::ImmediateU64(imm) => Some(imm),
        _ => None,
    }
}
