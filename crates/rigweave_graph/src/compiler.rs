// SPDX-License-Identifier: MIT OR Apache-2.0
//! Linearizes a graph into an operator program.
//!
//! Every reachable function or parameter node becomes a vertex, every link
//! between two vertices an edge. The order is a Kahn sort driven by a rank:
//! nodes are ranked along the execution chain, and each node's data
//! dependencies are ranked right before it. Ties never depend on hash order,
//! so the same graph always compiles to the same program.

use crate::error::CompileError;
use crate::graph::Graph;
use crate::link::Link;
use crate::node::NodeKind;
use crate::pin::{Pin, PinRef};
use crate::program::{Operator, OperatorProgram};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// Result type for compilation
pub type Result<T> = std::result::Result<T, CompileError>;

/// Compile the `reachable` part of `graph`.
///
/// Fails without a partial program when the vertices form a cycle.
pub fn compile(graph: &Graph, reachable: &BTreeSet<usize>) -> Result<OperatorProgram> {
    let node_count = graph.node_count();
    if let Some(&missing) = reachable.iter().find(|&&node| node >= node_count) {
        return Err(CompileError::Structure(format!(
            "reachable node {missing} does not exist"
        )));
    }

    let mut is_vertex = vec![false; node_count];
    for &node in reachable {
        is_vertex[node] = matches!(
            graph.nodes()[node].kind,
            NodeKind::Function { .. } | NodeKind::Parameter { .. }
        );
    }

    let mut successors = vec![Vec::new(); node_count];
    let mut data_predecessors = vec![Vec::new(); node_count];
    let mut exec_successors = vec![Vec::new(); node_count];
    for link in graph.links() {
        let (source, target) = (link.source.node, link.target.node);
        if source == target || !is_vertex[source] || !is_vertex[target] {
            continue;
        }
        push_unique(&mut successors[source], target);
        if is_execute_link(graph, link.source) {
            push_unique(&mut exec_successors[source], target);
        } else {
            push_unique(&mut data_predecessors[target], source);
        }
    }

    let vertices: Vec<usize> = (0..node_count).filter(|&node| is_vertex[node]).collect();
    let rank = rank_vertices(graph, &vertices, &data_predecessors, &exec_successors);
    let order = sort(&vertices, &successors, &rank);

    if order.len() < vertices.len() {
        let mut placed = vec![false; node_count];
        for &node in &order {
            placed[node] = true;
        }
        let remaining: Vec<usize> = vertices.iter().copied().filter(|&node| !placed[node]).collect();
        let cycle = smallest_cycle(&remaining, &successors, node_count).ok_or_else(|| {
            CompileError::Structure("sort stalled without a cycle".to_string())
        })?;
        let nodes: Vec<String> = cycle
            .into_iter()
            .map(|node| graph.nodes()[node].name.clone())
            .collect();
        tracing::warn!("Compile aborted, cycle between {}", nodes.join(", "));
        return Err(CompileError::Cycle { nodes });
    }

    let operators = emit(graph, &order, &is_vertex);
    tracing::info!(
        "Compiled {} vertices into {} operators (graph version {})",
        order.len(),
        operators.len(),
        graph.version()
    );
    Ok(OperatorProgram {
        operators,
        version: graph.version(),
    })
}

fn push_unique(list: &mut Vec<usize>, value: usize) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn is_execute_link(graph: &Graph, source: PinRef) -> bool {
    graph.pin(source).is_some_and(Pin::is_execute_context)
}

/// Depth-first ranking: a node's data dependencies first, then the node,
/// then whatever it hands execution to.
struct Ranker<'a> {
    data_predecessors: &'a [Vec<usize>],
    exec_successors: &'a [Vec<usize>],
    rank: Vec<Option<usize>>,
    active: Vec<bool>,
    next: usize,
}

impl Ranker<'_> {
    fn visit(&mut self, node: usize) {
        if self.rank[node].is_some() || self.active[node] {
            return;
        }

        self.active[node] = true;
        let predecessors = self.data_predecessors;
        for &dependency in &predecessors[node] {
            self.visit(dependency);
        }
        self.active[node] = false;

        self.rank[node] = Some(self.next);
        self.next += 1;

        let successors = self.exec_successors;
        for &next in &successors[node] {
            self.visit(next);
        }
    }
}

fn rank_vertices(
    graph: &Graph,
    vertices: &[usize],
    data_predecessors: &[Vec<usize>],
    exec_successors: &[Vec<usize>],
) -> Vec<usize> {
    let node_count = graph.node_count();
    let mut ranker = Ranker {
        data_predecessors,
        exec_successors,
        rank: vec![None; node_count],
        active: vec![false; node_count],
        next: 0,
    };

    let entries = vertices.iter().copied().filter(|&node| graph.nodes()[node].is_entry());
    for node in entries.chain(vertices.iter().copied()) {
        ranker.visit(node);
    }
    ranker.rank.into_iter().map(|rank| rank.unwrap_or(usize::MAX)).collect()
}

/// Kahn sort, always taking the lowest-ranked ready vertex
fn sort(vertices: &[usize], successors: &[Vec<usize>], rank: &[usize]) -> Vec<usize> {
    let mut in_degree = vec![0usize; successors.len()];
    for &node in vertices {
        for &next in &successors[node] {
            in_degree[next] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = vertices
        .iter()
        .filter(|&&node| in_degree[node] == 0)
        .map(|&node| Reverse((rank[node], node)))
        .collect();

    let mut order = Vec::with_capacity(vertices.len());
    while let Some(Reverse((_, node))) = ready.pop() {
        order.push(node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((rank[next], next)));
            }
        }
    }
    order
}

/// Smallest strongly connected component with more than one vertex
fn smallest_cycle(remaining: &[usize], successors: &[Vec<usize>], node_count: usize) -> Option<Vec<usize>> {
    let mut inside = vec![false; node_count];
    for &node in remaining {
        inside[node] = true;
    }

    let mut tarjan = Tarjan {
        successors,
        inside: &inside,
        index: vec![None; node_count],
        low: vec![0; node_count],
        on_stack: vec![false; node_count],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for &node in remaining {
        if tarjan.index[node].is_none() {
            tarjan.connect(node);
        }
    }

    tarjan
        .components
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|mut component| {
            component.sort_unstable();
            component
        })
        .min_by_key(|component| (component.len(), component[0]))
}

struct Tarjan<'a> {
    successors: &'a [Vec<usize>],
    inside: &'a [bool],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn connect(&mut self, node: usize) {
        self.index[node] = Some(self.next);
        self.low[node] = self.next;
        self.next += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        let successors = self.successors;
        for &next in &successors[node] {
            if !self.inside[next] {
                continue;
            }
            match self.index[next] {
                None => {
                    self.connect(next);
                    self.low[node] = self.low[node].min(self.low[next]);
                }
                Some(index) if self.on_stack[next] => {
                    self.low[node] = self.low[node].min(index);
                }
                Some(_) => {}
            }
        }

        if Some(self.low[node]) == self.index[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

fn emit(graph: &Graph, order: &[usize], is_vertex: &[bool]) -> Vec<Operator> {
    let mut placed = vec![false; graph.node_count()];
    let mut operators = Vec::new();
    let copy = |link: &Link| Operator::Copy {
        source: graph.pin_path(link.source, true),
        target: graph.pin_path(link.target, true),
    };

    for &node in order {
        for (_, link) in graph.incoming_links(node) {
            let source = link.source.node;
            if is_vertex[source] && placed[source] && !is_execute_link(graph, link.source) {
                operators.push(copy(link));
            }
        }

        let current = &graph.nodes()[node];
        if current.is_mutable() {
            operators.push(Operator::Exec {
                node: current.name.clone(),
                operation: current.operation().unwrap_or_default().to_string(),
            });
        }

        for (_, link) in graph.outgoing_links(node) {
            let target = link.target.node;
            if is_vertex[target] && placed[target] && !is_execute_link(graph, link.source) {
                operators.push(copy(link));
            }
        }

        placed[node] = true;
    }

    operators.push(Operator::Done);
    operators
}
