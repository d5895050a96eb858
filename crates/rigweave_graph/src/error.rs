// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types.

use thiserror::Error;

/// Reason a link cannot be made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkRejection {
    /// One of the pins does not exist
    #[error("pin does not exist")]
    MissingPin,

    /// Both ends are on the same node
    #[error("source and target are on the same node")]
    SameNode,

    /// Both pins point the same way
    #[error("source and target have the same direction")]
    SameDirection,

    /// Source is an input pin
    #[error("source pin is not an output")]
    SourceNotOutput,

    /// Target is an output pin
    #[error("target pin is not an input")]
    TargetNotInput,

    /// Value types differ
    #[error("cannot link {source_type} to {target_type}")]
    IncompatibleTypes {
        /// Source value type
        source_type: String,
        /// Target value type
        target_type: String,
    },

    /// Constant target fed from a non-constant source
    #[error("target pin only accepts constant sources")]
    ConstantTarget,

    /// Same link already exists
    #[error("link already exists")]
    Duplicate,

    /// Link would close a loop
    #[error("link would create a cycle")]
    Cycle,
}

/// Graph mutation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Pin not found
    #[error("Pin not found: {0}")]
    PinNotFound(String),

    /// Link not found
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    /// Operation not in the registry
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Name cannot be used
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Pin is not an array
    #[error("Pin is not an array: {0}")]
    NotAnArray(String),

    /// Array element out of range
    #[error("Array index {index} out of range for {pin} (size {size})")]
    ArrayIndexOutOfRange {
        /// Array pin path
        pin: String,
        /// Requested index
        index: usize,
        /// Current size
        size: usize,
    },

    /// Default literal does not fit the pin
    #[error("Invalid default value {value:?} for {pin}")]
    InvalidDefault {
        /// Pin path
        pin: String,
        /// Offending literal
        value: String,
    },

    /// Link rejected by validation
    #[error("Cannot link {source_pin} to {target_pin}: {reason}")]
    LinkRejected {
        /// Source pin path
        source_pin: String,
        /// Target pin path
        target_pin: String,
        /// Why
        reason: LinkRejection,
    },

    /// Reparenting would form a loop in the node hierarchy
    #[error("Cannot parent {node} under {parent}: hierarchy cycle")]
    HierarchyCycle {
        /// Child node
        node: String,
        /// Requested parent
        parent: String,
    },

    /// No action bracket is open
    #[error("No action is being recorded")]
    NoOpenAction,

    /// A recorded change no longer matches the graph
    #[error("Cannot apply recorded change: {0}")]
    Inconsistent(String),
}

/// Result type for graph mutations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Undo/redo errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Undo or redo called while an action bracket is open
    #[error("Cannot replay while recording {0:?}")]
    Recording(String),

    /// An inverse could not be applied; replay stopped part-way
    #[error("Replay of {title:?} failed: {source}")]
    Desync {
        /// Title of the action being replayed
        title: String,
        /// Underlying failure
        source: GraphError,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Dependency cycle among the given nodes
    #[error("Cycle between nodes: {}", nodes.join(", "))]
    Cycle {
        /// Names of the nodes forming the cycle
        nodes: Vec<String>,
    },

    /// Graph is internally inconsistent
    #[error("Structural error: {0}")]
    Structure(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON write error
    #[error("Failed to write config: {0}")]
    Write(#[from] ron::Error),

    /// Value out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}
