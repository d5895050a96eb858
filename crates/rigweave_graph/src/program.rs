// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiled operator programs and their publication slot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of a compiled program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Copy the value of an output pin into an input pin
    Copy {
        /// Source pin path
        source: String,
        /// Target pin path
        target: String,
    },
    /// Run a side-effecting node
    Exec {
        /// Node name
        node: String,
        /// Operation name
        operation: String,
    },
    /// End of program
    Done,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy { source, target } => write!(f, "Copy {source}\u{2192}{target}"),
            Self::Exec { node, .. } => write!(f, "Exec {node}"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Linear program produced by the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProgram {
    /// Operators in execution order, ending with [`Operator::Done`]
    pub operators: Vec<Operator>,
    /// Structural version of the graph this was compiled from
    pub version: u64,
}

impl OperatorProgram {
    /// Number of operators, `Done` included
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether the program has no operators at all
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Iterate over the operators
    pub fn iter(&self) -> std::slice::Iter<'_, Operator> {
        self.operators.iter()
    }
}

impl fmt::Display for OperatorProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, operator) in self.operators.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operator}")?;
        }
        write!(f, "]")
    }
}

/// Shared slot readers take the latest complete program from
#[derive(Debug, Clone, Default)]
pub struct ProgramSlot {
    current: Arc<RwLock<Option<Arc<OperatorProgram>>>>,
}

impl ProgramSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a finished program, returning the one it replaces
    pub fn publish(&self, program: OperatorProgram) -> Option<Arc<OperatorProgram>> {
        self.current.write().replace(Arc::new(program))
    }

    /// Latest published program
    pub fn current(&self) -> Option<Arc<OperatorProgram>> {
        self.current.read().clone()
    }

    /// Version of the latest published program
    pub fn version(&self) -> Option<u64> {
        self.current.read().as_ref().map(|program| program.version)
    }
}
