// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::pin::PinRef;
use serde::{Deserialize, Serialize};

/// A directed link from an output pin to an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Source (output) pin
    pub source: PinRef,
    /// Target (input) pin
    pub target: PinRef,
}

impl Link {
    /// Create a new link
    pub fn new(source: PinRef, target: PinRef) -> Self {
        Self { source, target }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node: usize) -> bool {
        self.source.node == node || self.target.node == node
    }

    /// Check if this link involves a specific pin
    pub fn involves_pin(&self, pin: PinRef) -> bool {
        self.source == pin || self.target == pin
    }
}
