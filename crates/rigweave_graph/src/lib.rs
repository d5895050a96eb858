// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rig node graph model and compiler.
//!
//! A rig graph is a directed graph of typed nodes. Function nodes call
//! operations from an [`OperationRegistry`], parameter nodes expose values
//! to the host, and comment nodes annotate. Pins unfold: struct pins have a
//! child per field and array pins a child per element, all of which can be
//! linked individually.
//!
//! ## Architecture
//!
//! - [`Graph`] stores nodes, pins and links in dense, index-addressed arrays
//! - [`GraphController`] is the only mutation path; every edit is validated,
//!   recorded as an undoable [`Action`] and reported as a [`GraphEvent`]
//! - [`Traverser`] finds what the execution entry points reach
//! - [`compiler`] turns the reachable part into a linear [`OperatorProgram`]
//!
//! ```
//! use rigweave_graph::GraphController;
//!
//! let mut controller = GraphController::default();
//! let print = controller.add_function_node("PrintFloat", [0.0, 0.0], None).unwrap();
//! let add = controller.add_function_node("FloatAdd", [-200.0, 80.0], None).unwrap();
//! controller
//!     .make_link(&format!("{add}.Result"), &format!("{print}.Value"))
//!     .unwrap();
//!
//! let program = controller.compile().unwrap();
//! assert_eq!(
//!     program.to_string(),
//!     "[Exec BeginExecution, Copy FloatAdd.Result\u{2192}PrintFloat.Value, Exec PrintFloat, Done]"
//! );
//! ```

pub mod action;
pub mod compiler;
pub mod config;
pub mod controller;
pub mod cycle;
pub mod error;
pub mod event;
pub mod graph;
pub mod history;
pub mod link;
pub mod node;
pub mod pin;
pub mod program;
pub mod registry;
pub mod topology;
pub mod traverser;
pub mod types;

pub use action::{Action, ActionType, Change};
pub use config::GraphConfig;
pub use controller::GraphController;
pub use error::{CompileError, ConfigError, GraphError, HistoryError, LinkRejection};
pub use event::{EventLog, GraphEvent, GraphObserver};
pub use graph::Graph;
pub use history::ActionStack;
pub use link::Link;
pub use node::{Node, NodeKind, ParameterDirection};
pub use pin::{Pin, PinDirection, PinRef};
pub use program::{Operator, OperatorProgram, ProgramSlot};
pub use registry::{standard_registry, OperationDescriptor, OperationRegistry, PortSignature};
pub use traverser::{Reachability, Traverser};
pub use types::ValueType;
