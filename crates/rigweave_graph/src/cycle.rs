// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cycle detection for candidate links.
//!
//! A link from a pin on node `A` to a pin on node `B` closes a loop iff `A`
//! is reachable from `B` by following existing links forward (or `A == B`).
//! While the user drags a wire from one pin, the same endpoint is tested
//! against many candidates, so the walk from that endpoint is cached.

use crate::graph::Graph;
use crate::pin::{PinDirection, PinRef};

/// Nodes reachable from `start` following links forward, `start` included
pub fn downstream_nodes(graph: &Graph, start: usize) -> Vec<bool> {
    walk(graph, start, true)
}

/// Nodes `start` depends on following links backward, `start` included
pub fn upstream_nodes(graph: &Graph, start: usize) -> Vec<bool> {
    walk(graph, start, false)
}

fn walk(graph: &Graph, start: usize, forward: bool) -> Vec<bool> {
    let mut adjacency = vec![Vec::new(); graph.node_count()];
    for link in graph.links() {
        let (from, to) = if forward {
            (link.source.node, link.target.node)
        } else {
            (link.target.node, link.source.node)
        };
        adjacency[from].push(to);
    }

    let mut visited = vec![false; graph.node_count()];
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if std::mem::replace(&mut visited[node], true) {
            continue;
        }
        stack.extend(adjacency[node].iter().copied().filter(|&next| !visited[next]));
    }
    visited
}

/// Reachability cache keyed by a cycle-check subject pin
#[derive(Debug, Clone, Default)]
pub struct CycleChecker {
    subject: Option<PinRef>,
    version: u64,
    visited: Vec<bool>,
}

impl CycleChecker {
    /// Create an empty checker
    pub fn new() -> Self {
        Self::default()
    }

    /// Current subject pin, if a cache is held
    pub fn subject(&self) -> Option<PinRef> {
        self.subject
    }

    /// Cache the walk for links through `pin`.
    ///
    /// An input pin caches its node's dependents (candidates there would
    /// loop), an output pin caches its node's dependencies.
    pub fn prepare(&mut self, graph: &Graph, pin: PinRef) {
        let Some(direction) = graph.pin(pin).map(|p| p.direction) else {
            self.reset();
            return;
        };
        self.visited = match direction {
            PinDirection::Input => downstream_nodes(graph, pin.node),
            PinDirection::Output => upstream_nodes(graph, pin.node),
        };
        self.subject = Some(pin);
        self.version = graph.version();
    }

    /// Drop the cache
    pub fn reset(&mut self) {
        self.subject = None;
        self.visited.clear();
    }

    /// Whether linking `source` to `target` would close a loop
    pub fn would_cycle(&self, graph: &Graph, source: PinRef, target: PinRef) -> bool {
        if source.node == target.node {
            return true;
        }

        if self.subject.is_some() && self.version == graph.version() {
            if self.subject == Some(target) {
                return self.visited.get(source.node).copied().unwrap_or(false);
            }
            if self.subject == Some(source) {
                return self.visited.get(target.node).copied().unwrap_or(false);
            }
        }

        downstream_nodes(graph, target.node)[source.node]
    }
}
