// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end compile scenarios through the public API.

use rigweave_graph::compiler;
use rigweave_graph::{
    GraphConfig, GraphController, OperationDescriptor, OperationRegistry,
    PortSignature, ProgramSlot, ValueType,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The standard operations plus a pure source `X` and a side-effecting sink reading `Y`
fn source_sink_registry() -> OperationRegistry {
    let mut registry = rigweave_graph::standard_registry();
    registry.register(OperationDescriptor::pure(
        "Source",
        vec![PortSignature::output("X", ValueType::float())],
    ));
    registry.register(OperationDescriptor::mutable(
        "Sink",
        vec![PortSignature::input("Y", ValueType::float())],
    ));
    registry
}

#[test]
fn test_copy_then_exec_then_unlinked() {
    let mut c = GraphController::new(Arc::new(source_sink_registry()), GraphConfig::default());
    c.add_function_node("Source", [0.0, 0.0], Some("A")).unwrap();
    c.add_function_node("Sink", [200.0, 0.0], Some("B")).unwrap();
    assert_eq!(c.graph().entry_nodes().len(), 1);
    c.make_link("A.X", "B.Y").unwrap();

    let a = c.graph().node_index("A").unwrap();
    let b = c.graph().node_index("B").unwrap();
    let explicit = BTreeSet::from([a, b]);
    let program = compiler::compile(c.graph(), &explicit).unwrap();
    assert_eq!(program.to_string(), "[Copy A.X\u{2192}B.Y, Exec B, Done]");

    let reachability = c.reachability();
    assert!(reachability.contains(a) && reachability.contains(b));
    assert!(reachability.unreachable.is_empty());
    let program = c.compile().unwrap();
    assert_eq!(
        program.to_string(),
        "[Exec BeginExecution, Copy A.X\u{2192}B.Y, Exec B, Done]"
    );

    // Feed B.Y from a constant instead of A
    c.set_pin_default_value("B.Y", "3.0").unwrap();
    c.break_link("A.X", "B.Y").unwrap();
    let y = c.graph().find_pin("B.Y").unwrap();
    assert_eq!(c.graph().pin_default_value(y), "3.0");

    let program = compiler::compile(c.graph(), &explicit).unwrap();
    assert_eq!(program.to_string(), "[Exec B, Done]");
    assert_eq!(c.reachability().unreachable, vec![a]);
    let program = c.compile().unwrap();
    assert_eq!(program.to_string(), "[Exec BeginExecution, Exec B, Done]");

    c.undo().unwrap();
    assert!(c.reachability().unreachable.is_empty());
    let program = compiler::compile(c.graph(), &explicit).unwrap();
    assert_eq!(program.len(), 3);
}

#[test]
fn test_unreached_nodes_are_left_out() {
    let mut c = GraphController::default();
    c.add_function_node("PrintFloat", [0.0, 0.0], Some("Log")).unwrap();
    c.add_function_node("FloatAdd", [0.0, 0.0], Some("Used")).unwrap();
    c.add_function_node("FloatAdd", [0.0, 0.0], Some("Unused")).unwrap();
    c.add_comment_node("ignored", [0.0, 0.0], [100.0, 100.0]).unwrap();
    c.make_link("Used.Result", "Log.Value").unwrap();

    let reachability = c.reachability();
    let unused = c.graph().node_index("Unused").unwrap();
    let comment = c.graph().node_index("Comment").unwrap();
    assert_eq!(reachability.unreachable, vec![unused, comment]);

    let program = c.compile().unwrap();
    assert_eq!(
        program.to_string(),
        "[Exec BeginExecution, Copy Used.Result\u{2192}Log.Value, Exec Log, Done]"
    );
    assert_eq!(program.version, c.graph().version());
}

#[test]
fn test_graph_without_entry_compiles_to_done() {
    let mut c = GraphController::default();
    c.add_function_node("PrintFloat", [0.0, 0.0], Some("Log")).unwrap();
    let slot = ProgramSlot::new();
    slot.publish(c.compile().unwrap());
    let published = slot.version();

    c.remove_node("BeginExecution").unwrap();
    let program = c.compile().unwrap();
    assert_eq!(program.to_string(), "[Done]");
    assert_eq!(slot.version(), published);
    assert!(slot.current().unwrap().len() > 1);
}
