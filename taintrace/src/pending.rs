use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do when the debuggee reaches a pending address.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Resume analysis, used after skipping a blacklisted call.
    EnableTrigger,
    DisableTrigger,
    /// Taint a buffer and start analyzing, e.g. after `read` returns.
    TaintMemory { address: u64, size: usize },
    SymbolizeMemory { address: u64, size: usize },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    pub address: u64,
    /// Leave the breakpoint in place and keep the action for the next hit.
    pub ignore_breakpoint: bool,
    pub kind: ActionKind,
}

impl PendingAction {
    pub fn one_shot(address: u64, kind: ActionKind) -> Self {
        Self {
            address,
            ignore_breakpoint: false,
            kind,
        }
    }

    pub fn persistent(address: u64, kind: ActionKind) -> Self {
        Self {
            address,
            ignore_breakpoint: true,
            kind,
        }
    }
}

/// At most one action per address.
#[derive(Debug, Clone, Default)]
pub struct PendingActions {
    actions: BTreeMap<u64, PendingAction>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: PendingAction) -> Result<()> {
        if self.actions.contains_key(&action.address) {
            return Err(Error::DuplicateAction(action.address));
        }
        self.actions.insert(action.address, action);
        Ok(())
    }

    pub fn get(&self, address: u64) -> Option<&PendingAction> {
        self.actions.get(&address)
    }

    pub fn remove(&mut self, address: u64) -> Option<PendingAction> {
        self.actions.remove(&address)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.actions.contains_key(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
