use thiserror::Error;

/// The host could not decode an instruction at an address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no readable memory at {0:#x}")]
    Unmapped(u64),

    #[error("invalid instruction at {address:#x}: {reason}")]
    Invalid { address: u64, reason: String },
}

/// The semantics backend could not process an instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticsError {
    #[error("disassembly failed at {address:#x} (opcodes: {opcodes})")]
    Disassembly { address: u64, opcodes: String },
}

/// A debugger primitive failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebuggerError {
    #[error("cannot set breakpoint at {0:#x}")]
    Breakpoint(u64),

    #[error("breakpoint already exists at {0:#x}")]
    DuplicateBreakpoint(u64),

    #[error("memory access failed at {address:#x} ({size} bytes)")]
    Memory { address: u64, size: usize },

    #[error("unknown register {0}")]
    Register(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Debugger(#[from] DebuggerError),

    #[error("a pending action is already registered at {0:#x}")]
    DuplicateAction(u64),

    #[error("no snapshot has been taken")]
    NoSnapshot,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse binary: {0}")]
    Binary(#[from] object::read::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Space separated hex rendering used in diagnostics.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
