// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications.
//!
//! The controller queues one event per applied change and hands the queue
//! to observers once the outermost mutation has finished, so observers
//! always see a consistent graph.

use crate::graph::Graph;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Something that changed in a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// Node added
    NodeAdded(String),
    /// Node removed
    NodeRemoved(String),
    /// Node renamed
    NodeRenamed {
        /// Name before
        old: String,
        /// Name after
        new: String,
    },
    /// Node position changed
    NodeMoved(String),
    /// Node size changed
    NodeResized(String),
    /// Node color changed
    NodeRecolored(String),
    /// Node text or hierarchy parent changed
    NodeChanged(String),
    /// Link added
    LinkAdded {
        /// Source pin path
        source: String,
        /// Target pin path
        target: String,
    },
    /// Link removed
    LinkRemoved {
        /// Source pin path
        source: String,
        /// Target pin path
        target: String,
    },
    /// Array element added
    PinAdded(String),
    /// Array element removed
    PinRemoved(String),
    /// Pin default or expanded flag changed
    PinChanged(String),
    /// Node selected
    NodeSelected(String),
    /// Node deselected
    NodeDeselected(String),
}

/// Receives graph change notifications
pub trait GraphObserver: Send {
    /// Called once per event after the mutation that caused it completed
    fn on_event(&mut self, event: &GraphEvent, graph: &Graph);
}

impl<F> GraphObserver for F
where
    F: FnMut(&GraphEvent, &Graph) + Send,
{
    fn on_event(&mut self, event: &GraphEvent, graph: &Graph) {
        self(event, graph);
    }
}

/// Observer that records events into a shared buffer
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<GraphEvent>>>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl GraphObserver for EventLog {
    fn on_event(&mut self, event: &GraphEvent, _graph: &Graph) {
        self.events.lock().push(event.clone());
    }
}
