// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference host for rigweave graphs.
//!
//! Builds a small rig, compiles it on a background thread whenever it is
//! asked to, and publishes each finished program to a shared slot that a
//! runtime would read from.
//!
//! Usage: `rigweave [config.ron]`

use rigweave_graph::compiler;
use rigweave_graph::{
    CompileError, ConfigError, Graph, GraphConfig, GraphController, GraphError, GraphEvent,
    HistoryError, OperatorProgram, ParameterDirection, ProgramSlot, Traverser, ValueType,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("Compile thread panicked")]
    CompileThread,
}

type Result<T> = std::result::Result<T, HostError>;

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rigweave=info,rigweave_graph=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rigweave host v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        tracing::error!("Host failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            GraphConfig::load(&path)?
        }
        None => GraphConfig::default(),
    };
    tracing::debug!("Config:\n{}", config.to_ron()?);

    let mut controller = GraphController::new(Arc::new(rigweave_graph::standard_registry()), config);
    controller.subscribe(|event: &GraphEvent, graph: &Graph| {
        tracing::debug!("{event:?} (version {})", graph.version());
    });

    let slot = ProgramSlot::new();
    build_rig(&mut controller)?;
    publish(&slot, compile_in_background(controller.graph())?);

    // Detach the offset; the translation now only depends on the parameter
    controller.break_link("Offset.Result", "Compose.Y")?;
    publish(&slot, compile_in_background(controller.graph())?);

    controller.undo()?;
    publish(&slot, compile_in_background(controller.graph())?);

    match controller.history().snapshot_ron() {
        Ok(session) => println!("{session}"),
        Err(e) => tracing::warn!("Could not snapshot history: {e}"),
    }
    Ok(())
}

/// Lift the hip bone by a parameter plus a fixed offset, and log the offset
fn build_rig(controller: &mut GraphController) -> Result<()> {
    controller.begin_action(rigweave_graph::ActionType::NodeAdded, "Build rig");

    let height = controller.add_parameter_node(
        "Height",
        ValueType::float(),
        ParameterDirection::Input,
        Some("10.0"),
        [-600.0, 0.0],
    )?;
    let offset = controller.add_function_node("FloatAdd", [-600.0, 150.0], Some("Offset"))?;
    controller.set_pin_default_value(&format!("{offset}.A"), "2.5")?;

    let compose = controller.add_function_node("MakeVector", [-300.0, 0.0], Some("Compose"))?;
    controller.make_link(&format!("{height}.Value"), &format!("{compose}.Z"))?;
    controller.make_link(&format!("{offset}.Result"), &format!("{compose}.Y"))?;

    let set = controller.add_function_node("SetTranslation", [0.0, 0.0], Some("LiftHip"))?;
    controller.set_pin_default_value(&format!("{set}.Item"), "Hip")?;
    controller.make_link(&format!("{compose}.Result"), &format!("{set}.Value"))?;

    let print = controller.add_function_node("PrintFloat", [300.0, 0.0], Some("Report"))?;
    controller.make_link(&format!("{set}.Then"), &format!("{print}.Execute"))?;
    controller.make_link(&format!("{offset}.Result"), &format!("{print}.Value"))?;

    controller.end_action()?;
    tracing::info!(
        "Built rig with {} nodes and {} links",
        controller.graph().node_count(),
        controller.graph().link_count()
    );
    Ok(())
}

/// Compile a snapshot of `graph` on a worker thread
fn compile_in_background(graph: &Graph) -> Result<OperatorProgram> {
    let snapshot = graph.clone();
    let worker = thread::spawn(move || {
        let entries = snapshot.entry_nodes();
        let reachability = Traverser::new().compute(&snapshot, &entries);
        compiler::compile(&snapshot, &reachability.reachable)
    });
    let program = worker.join().map_err(|_| HostError::CompileThread)??;
    Ok(program)
}

fn publish(slot: &ProgramSlot, program: OperatorProgram) {
    let version = program.version;
    println!("{program}");
    match slot.publish(program) {
        Some(previous) => tracing::info!("Published program v{version}, replacing v{}", previous.version),
        None => tracing::info!("Published program v{version}"),
    }
}
