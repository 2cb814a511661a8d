use std::fs::read;
use std::path::Path;

use log::LevelFilter;
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

/// Colours are 0xBBGGRR, the way disassemblers store item colours.
pub type Color = u32;

pub const DEFAULT_BLACKLIST: &[&str] = &[
    "printf", "_printf", "puts", "_puts", "putchar", "fputs", "fprintf", "vprintf", "vfprintf",
    "fflush", "perror", "setvbuf",
];

/// The 32-bit to 64-bit gate on WoW64. Tracing through it corrupts the call stack.
pub const WOW64_TRANSITION: &str = "call dword ptr fs:[0xc0]";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Options {
    pub show_debug_info: bool,
    pub show_extra_debug_info: bool,
    pub use_tainting_engine: bool,
    pub use_symbolic_engine: bool,
    pub paint_executed_instructions: bool,
    pub rename_tainted_function_names: bool,
    pub add_comments_controlled_operands: bool,
    pub add_comments_symbolic_expressions: bool,
    /// Ask before tracing more than this many instructions in a row.
    pub limit_instructions_tracing: Option<u64>,
    pub color_executed_instruction: Color,
    pub color_tainted: Color,
    pub color_tainted_condition: Color,
    pub blacklist: Vec<String>,
    pub os_transition_patterns: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            show_debug_info: true,
            show_extra_debug_info: false,
            use_tainting_engine: true,
            use_symbolic_engine: false,
            paint_executed_instructions: false,
            rename_tainted_function_names: true,
            add_comments_controlled_operands: false,
            add_comments_symbolic_expressions: false,
            limit_instructions_tracing: None,
            color_executed_instruction: 0xe6e6e6,
            color_tainted: 0x99ffcc,
            color_tainted_condition: 0xe6a0ff,
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            os_transition_patterns: vec![WOW64_TRANSITION.to_string()],
        }
    }
}

impl Options {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&read(path)?)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.show_extra_debug_info {
            LevelFilter::Trace
        } else if self.show_debug_info {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    pub fn is_blacklisted(&self, callee: &str) -> bool {
        self.blacklist.iter().any(|name| name == callee)
    }

    pub fn is_os_transition(&self, disassembly: &str) -> bool {
        self.os_transition_patterns
            .iter()
            .any(|pattern| disassembly.contains(pattern.as_str()))
    }

    /// The ceiling, if throttling is on. Zero means off.
    pub fn throttle(&self) -> Option<u64> {
        self.limit_instructions_tracing.filter(|limit| *limit > 0)
    }
}
