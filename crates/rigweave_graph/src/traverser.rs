// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reachability from the execution entry points.
//!
//! Side-effecting nodes are reached by following execution-context links
//! forward from the entries. Everything those nodes read is then collected
//! by walking their data inputs backward. That walk only crosses pure
//! nodes; a side-effecting node runs only when execution reaches it.

use crate::graph::Graph;
use std::collections::{BTreeSet, HashMap};

/// Result of a traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reachability {
    /// Nodes that take part in execution
    pub reachable: BTreeSet<usize>,
    /// Nodes reached along the execution chain, in discovery order
    pub executed: Vec<usize>,
    /// Everything else, in index order
    pub unreachable: Vec<usize>,
}

impl Reachability {
    /// Whether `node` takes part in execution
    pub fn contains(&self, node: usize) -> bool {
        self.reachable.contains(&node)
    }
}

/// Graph traverser with memoized per-node dependency sets
#[derive(Debug, Default)]
pub struct Traverser {
    version: Option<u64>,
    dependencies: HashMap<usize, Vec<usize>>,
}

impl Traverser {
    /// Create a new traverser
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute what the given entries reach
    pub fn compute(&mut self, graph: &Graph, entries: &[usize]) -> Reachability {
        self.sync(graph);

        let mut reachable = BTreeSet::new();
        let mut executed = Vec::new();
        let mut stack: Vec<usize> = entries.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if node >= graph.node_count() || !reachable.insert(node) {
                continue;
            }
            executed.push(node);
            let next: Vec<usize> = graph
                .outgoing_links(node)
                .filter(|(_, link)| graph.pin(link.source).is_some_and(|pin| pin.is_execute_context()))
                .map(|(_, link)| link.target.node)
                .collect();
            stack.extend(next.into_iter().rev());
        }

        for &node in &executed {
            reachable.extend(self.dependencies_of(graph, node).iter().copied());
        }

        let unreachable = (0..graph.node_count())
            .filter(|node| !reachable.contains(node))
            .collect();
        Reachability {
            reachable,
            executed,
            unreachable,
        }
    }

    /// Every pure node `node` reads data from, directly or transitively
    pub fn dependencies_of(&mut self, graph: &Graph, node: usize) -> &[usize] {
        self.sync(graph);
        self.dependencies
            .entry(node)
            .or_insert_with(|| collect_dependencies(graph, node))
    }

    /// Drop memoized sets if the graph changed since they were computed
    fn sync(&mut self, graph: &Graph) {
        if self.version != Some(graph.version()) {
            self.dependencies.clear();
            self.version = Some(graph.version());
        }
    }
}

fn collect_dependencies(graph: &Graph, node: usize) -> Vec<usize> {
    let mut visited = vec![false; graph.node_count()];
    let mut stack = vec![node];
    let mut found = Vec::new();
    while let Some(current) = stack.pop() {
        for (_, link) in graph.incoming_links(current) {
            let is_exec = graph.pin(link.target).is_some_and(|pin| pin.is_execute_context());
            let source = link.source.node;
            if is_exec || source == node || std::mem::replace(&mut visited[source], true) {
                continue;
            }
            if graph.nodes()[source].is_mutable() {
                continue;
            }
            found.push(source);
            stack.push(source);
        }
    }
    found.sort_unstable();
    found
}
