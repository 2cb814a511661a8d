use serde_derive::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as DisplayResult};

use crate::semantics::SymbolicId;

/// A branch decision taken while its condition was symbolized.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathConstraint {
    pub pc_id: SymbolicId,
    pub condition_addr: u64,
    pub taken_addr: u64,
    pub not_taken_addr: u64,
    pub bound: usize,
}

impl PathConstraint {
    /// Label used when offering to solve this branch.
    pub fn label(&self) -> String {
        format!(
            "{}. {:#x} -> {:#x}",
            self.bound, self.condition_addr, self.taken_addr
        )
    }
}

impl Display for PathConstraint {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        write!(
            f,
            "#{} {:#x}: taken {:#x}, not taken {:#x} (pc expr {})",
            self.bound, self.condition_addr, self.taken_addr, self.not_taken_addr, self.pc_id
        )
    }
}

/// Append-only; ordinals are the insertion index.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PathConstraintLog {
    constraints: Vec<PathConstraint>,
}

impl PathConstraintLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        pc_id: SymbolicId,
        condition_addr: u64,
        taken_addr: u64,
        not_taken_addr: u64,
    ) -> &PathConstraint {
        let bound = self.constraints.len();
        self.constraints.push(PathConstraint {
            pc_id,
            condition_addr,
            taken_addr,
            not_taken_addr,
            bound,
        });
        &self.constraints[bound]
    }

    pub fn get(&self, bound: usize) -> Option<&PathConstraint> {
        self.constraints.get(bound)
    }

    /// Every decision recorded at one branch, in execution order.
    pub fn at_address(&self, condition_addr: u64) -> impl Iterator<Item = &PathConstraint> {
        self.constraints
            .iter()
            .filter(move |c| c.condition_addr == condition_addr)
    }

    /// The constraints leading up to and including `bound`.
    pub fn prefix(&self, bound: usize) -> &[PathConstraint] {
        let end = (bound + 1).min(self.constraints.len());
        &self.constraints[..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathConstraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}
