// SPDX-License-Identifier: MIT OR Apache-2.0
//! Randomized structural properties of the controller and compiler.

use proptest::prelude::*;
use rigweave_graph::compiler;
use rigweave_graph::{
    Graph, GraphConfig, GraphController, LinkRejection, Node, Operator, Pin, PinDirection, PinRef,
};
use std::collections::BTreeSet;
use std::sync::Arc;

const OPERATIONS: [&str; 5] = ["FloatAdd", "MakeVector", "ArraySum", "SetTranslation", "PrintFloat"];

#[derive(Debug, Clone)]
enum Step {
    Add(usize),
    Link(usize, usize),
    Unlink(usize),
    Remove(usize),
    Resize(usize, usize),
    SetDefault(usize, u8),
    Rename(usize),
    Move(usize, i16),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0..OPERATIONS.len()).prop_map(Step::Add),
        4 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Link(a, b)),
        1 => any::<usize>().prop_map(Step::Unlink),
        1 => any::<usize>().prop_map(Step::Remove),
        1 => (any::<usize>(), 0usize..5).prop_map(|(a, n)| Step::Resize(a, n)),
        1 => (any::<usize>(), any::<u8>()).prop_map(|(a, v)| Step::SetDefault(a, v)),
        1 => any::<usize>().prop_map(Step::Rename),
        1 => (any::<usize>(), any::<i16>()).prop_map(|(a, x)| Step::Move(a, x)),
    ]
}

fn controller() -> GraphController {
    let config = GraphConfig {
        auto_insert_entry: false,
        ..GraphConfig::default()
    };
    GraphController::new(Arc::new(rigweave_graph::standard_registry()), config)
}

fn pin_paths(graph: &Graph, keep: impl Fn(&Pin) -> bool) -> Vec<String> {
    let mut paths = Vec::new();
    for node in graph.nodes() {
        for pin in node.pins() {
            if keep(pin) {
                paths.push(graph.pin_path(pin.pin_ref(), true));
            }
        }
    }
    paths
}

fn pick<T: Clone>(items: &[T], seed: usize) -> Option<T> {
    (!items.is_empty()).then(|| items[seed % items.len()].clone())
}

/// Apply a step, ignoring rejections
fn apply(c: &mut GraphController, step: &Step) {
    let graph = c.graph();
    let names: Vec<String> = graph.nodes().iter().map(|node| node.name.clone()).collect();
    let _ = match *step {
        Step::Add(op) => c.add_function_node(OPERATIONS[op], [0.0, 0.0], None).map(drop),
        Step::Link(a, b) => {
            let outputs = pin_paths(graph, |pin| pin.direction == PinDirection::Output);
            let inputs = pin_paths(graph, |pin| pin.direction == PinDirection::Input);
            match (pick(&outputs, a), pick(&inputs, b)) {
                (Some(source), Some(target)) => c.make_link(&source, &target),
                _ => Ok(()),
            }
        }
        Step::Unlink(a) => match pick(graph.links(), a) {
            Some(link) => {
                let source = graph.pin_path(link.source, true);
                let target = graph.pin_path(link.target, true);
                c.break_link(&source, &target)
            }
            None => Ok(()),
        },
        Step::Remove(a) => match pick(&names, a) {
            Some(name) => c.remove_node(&name),
            None => Ok(()),
        },
        Step::Resize(a, size) => {
            let arrays = pin_paths(graph, Pin::is_array);
            match pick(&arrays, a) {
                Some(path) => c.set_pin_array_size(&path, size, None).map(drop),
                None => Ok(()),
            }
        }
        Step::SetDefault(a, value) => {
            let leaves = pin_paths(graph, |pin| {
                pin.direction == PinDirection::Input && pin.value_type == rigweave_graph::ValueType::float()
            });
            match pick(&leaves, a) {
                Some(path) => c.set_pin_default_value(&path, &format!("{value}.5")),
                None => Ok(()),
            }
        }
        Step::Rename(a) => match pick(&names, a) {
            Some(name) => c.rename_node(&name, "Renamed").map(drop),
            None => Ok(()),
        },
        Step::Move(a, x) => match pick(&names, a) {
            Some(name) => c.set_node_position(&name, [f32::from(x), 0.0]),
            None => Ok(()),
        },
    };
}

fn shape(graph: &Graph) -> (Vec<Node>, Vec<rigweave_graph::Link>) {
    (graph.nodes().to_vec(), graph.links().to_vec())
}

/// Brute-force: is `to` reachable from `from` along links
fn reaches(graph: &Graph, from: usize, to: usize) -> bool {
    let mut seen = vec![false; graph.node_count()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if std::mem::replace(&mut seen[node], true) {
            continue;
        }
        for link in graph.links() {
            if link.source.node == node {
                stack.push(link.target.node);
            }
        }
    }
    false
}

fn all_pins(graph: &Graph) -> Vec<PinRef> {
    graph
        .nodes()
        .iter()
        .flat_map(|node| node.pins().iter().map(Pin::pin_ref))
        .collect()
}

proptest! {
    #[test]
    fn test_store_stays_consistent(steps in prop::collection::vec(step(), 1..60)) {
        let mut c = controller();
        for step in &steps {
            apply(&mut c, step);
            prop_assert_eq!(c.graph().validate(), Ok(()));
        }

        // Property: an input pin is fed by at most one link
        let targets: BTreeSet<PinRef> = c.graph().links().iter().map(|link| link.target).collect();
        prop_assert_eq!(targets.len(), c.graph().link_count());
    }

    #[test]
    fn test_undo_redo_restores_exact_indices(steps in prop::collection::vec(step(), 1..40)) {
        let mut c = controller();
        let mut shapes = vec![shape(c.graph())];
        for step in &steps {
            let depth = c.history().undo_depth();
            apply(&mut c, step);
            if c.history().undo_depth() > depth {
                shapes.push(shape(c.graph()));
            } else {
                prop_assert_eq!(&shape(c.graph()), shapes.last().unwrap());
            }
        }

        for expected in shapes.iter().rev().skip(1) {
            c.undo().unwrap();
            prop_assert_eq!(&shape(c.graph()), expected);
        }
        prop_assert!(!c.can_undo());

        for expected in shapes.iter().skip(1) {
            c.redo().unwrap();
            prop_assert_eq!(&shape(c.graph()), expected);
        }
        prop_assert!(!c.can_redo());
    }

    #[test]
    fn test_can_link_matches_dfs_oracle(
        steps in prop::collection::vec(step(), 1..40),
        probes in prop::collection::vec((any::<usize>(), any::<usize>()), 1..20),
    ) {
        let mut c = controller();
        for step in &steps {
            apply(&mut c, step);
        }
        let pins = all_pins(c.graph());
        for (a, b) in probes {
            let (Some(source), Some(target)) = (pick(&pins, a), pick(&pins, b)) else {
                continue;
            };
            let loops = source.node == target.node || reaches(c.graph(), target.node, source.node);
            let result = c.can_link_pins(source, target);
            match &result {
                Ok(()) => prop_assert!(!loops),
                Err(LinkRejection::Cycle) => prop_assert!(loops),
                Err(_) => {}
            }

            // Property: the prepared cache never changes the answer
            let path = c.graph().pin_path(target, true);
            c.prepare_cycle_checking(&path).unwrap();
            prop_assert_eq!(c.can_link_pins(source, target), result);
            c.reset_cycle_check();
        }
    }

    #[test]
    fn test_array_resize_is_idempotent(initial in 0usize..5, size in 0usize..6) {
        let mut c = controller();
        c.add_function_node("ArraySum", [0.0, 0.0], Some("Sum")).unwrap();
        let literal = format!(
            "({})",
            (0..initial).map(|i| format!("{i}.5")).collect::<Vec<_>>().join(",")
        );
        c.set_pin_default_value("Sum.Values", &literal).unwrap();
        let values = c.graph().find_pin("Sum.Values").unwrap();
        let before = c.graph().pin_default_value(values);

        let changed = c.set_pin_array_size("Sum.Values", size, None).unwrap();
        prop_assert_eq!(changed, size != initial);
        prop_assert!(!c.set_pin_array_size("Sum.Values", size, None).unwrap());
        prop_assert_eq!(c.graph().pin(values).unwrap().array_size(), Some(size));

        let fill = if initial == 0 { "0.0".to_string() } else { format!("{}.5", initial - 1) };
        for slot in initial..size {
            let element = c.graph().find_pin(&format!("Sum.Values.{slot}")).unwrap();
            prop_assert_eq!(c.graph().pin_default_value(element), fill.clone());
        }

        if changed {
            c.undo().unwrap();
            prop_assert_eq!(c.graph().pin_default_value(values), before);
        }
    }

    #[test]
    fn test_compiled_order_respects_links(
        adds in 1usize..5,
        prints in 1usize..5,
        wiring in prop::collection::vec((any::<usize>(), any::<usize>()), 0..30),
    ) {
        let mut c = controller();
        for _ in 0..adds {
            c.add_function_node("FloatAdd", [0.0, 0.0], None).unwrap();
        }
        for _ in 0..prints {
            c.add_function_node("PrintFloat", [0.0, 0.0], None).unwrap();
        }
        for (a, b) in wiring {
            apply(&mut c, &Step::Link(a, b));
        }

        let graph = c.graph();
        let all: BTreeSet<usize> = (0..graph.node_count()).collect();
        let program = compiler::compile(graph, &all).unwrap();
        prop_assert_eq!(program.operators.last(), Some(&Operator::Done));

        let exec_position = |name: &str| {
            program.iter().position(|op| matches!(op, Operator::Exec { node, .. } if node == name))
        };
        let copy_position = |source: &str, target: &str| {
            let matching: Vec<usize> = program
                .iter()
                .enumerate()
                .filter(|(_, op)| matches!(op, Operator::Copy { source: s, target: t } if s == source && t == target))
                .map(|(i, _)| i)
                .collect();
            matching
        };

        for node in graph.nodes().iter().filter(|node| node.is_mutable()) {
            let count = program
                .iter()
                .filter(|op| matches!(op, Operator::Exec { node: n, .. } if *n == node.name))
                .count();
            prop_assert_eq!(count, 1);
        }

        for link in graph.links() {
            let source_node = &graph.nodes()[link.source.node];
            let target_node = &graph.nodes()[link.target.node];
            if graph.pin(link.source).unwrap().is_execute_context() {
                prop_assert!(exec_position(&source_node.name) < exec_position(&target_node.name));
                continue;
            }

            let source = graph.pin_path(link.source, true);
            let target = graph.pin_path(link.target, true);
            let copies = copy_position(&source, &target);
            prop_assert_eq!(copies.len(), 1);
            let copy = copies[0];
            if target_node.is_mutable() {
                prop_assert!(Some(copy) < exec_position(&target_node.name));
            }

            // Values flow forward: anything feeding the source is copied first
            for upstream in graph.links().iter().filter(|l| l.target.node == link.source.node) {
                if graph.pin(upstream.source).unwrap().is_execute_context() {
                    continue;
                }
                let earlier = copy_position(
                    &graph.pin_path(upstream.source, true),
                    &graph.pin_path(upstream.target, true),
                );
                prop_assert!(earlier[0] < copy);
            }
        }
    }
}
