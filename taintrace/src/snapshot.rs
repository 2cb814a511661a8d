use std::collections::BTreeMap;

use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};

use crate::debugger::Debugger;
use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteModification {
    pub original: u8,
    pub modified: u8,
}

/// Memory and registers as they were when the snapshot was taken, plus
/// every byte written since.
///
/// Bytes are captured while the debuggee sits on the writing instruction,
/// before it executes, so the first value seen for an address is the
/// value to restore.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Snapshot {
    registers: Vec<(String, u64)>,
    memory: BTreeMap<u64, ByteModification>,
}

impl Snapshot {
    pub fn take<D: Debugger>(debugger: &D) -> Self {
        Self {
            registers: debugger.registers(),
            memory: BTreeMap::new(),
        }
    }

    pub fn add_modification(&mut self, address: u64, value: u8) {
        self.memory
            .entry(address)
            .and_modify(|m| m.modified = value)
            .or_insert(ByteModification {
                original: value,
                modified: value,
            });
    }

    pub fn get(&self, address: u64) -> Option<&ByteModification> {
        self.memory.get(&address)
    }

    pub fn registers(&self) -> &[(String, u64)] {
        &self.registers
    }

    pub fn modifications(&self) -> impl Iterator<Item = (u64, &ByteModification)> {
        self.memory.iter().map(|(addr, m)| (*addr, m))
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Write every saved byte and register back into the debuggee.
    pub fn restore<D: Debugger>(&self, debugger: &mut D) -> Result<()> {
        for (address, m) in self.memory.iter() {
            debugger.write_memory(*address, &[m.original])?;
        }
        for (name, value) in self.registers.iter() {
            if let Err(e) = debugger.set_register(name, *value) {
                warn!("Could not restore register {}: {}", name, e);
            }
        }
        debug!(
            "Snapshot restored ({} bytes, {} registers)",
            self.memory.len(),
            self.registers.len()
        );
        Ok(())
    }
}
