pub mod constraints;
pub mod debugger;
pub mod elf;
pub mod engine;
pub mod error;
pub mod event;
pub mod instruction;
pub mod options;
pub mod pending;
pub mod replay;
pub mod semantics;
pub mod session;
pub mod snapshot;
pub mod x86;

pub use debugger::Debugger;
pub use engine::{SharedEngine, TraceEngine};
pub use error::{Error, Result};
pub use event::DebuggerEvent;
pub use options::Options;
pub use semantics::SemanticsBackend;
