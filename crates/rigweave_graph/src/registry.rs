// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operation descriptors and the registry function nodes are created from.
//!
//! The registry is owned by the host; the graph only reads it when a
//! function node's pins are expanded.

use crate::pin::PinDirection;
use crate::types::ValueType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Operation that starts execution
pub const BEGIN_EXECUTION: &str = "BeginExecution";

/// Name of the execution context input of side-effecting operations
pub const EXECUTE_PIN: &str = "Execute";

/// Name of the execution context output
pub const THEN_PIN: &str = "Then";

/// Signature of one port of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSignature {
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PinDirection,
    /// Value type
    pub value_type: ValueType,
    /// Default literal, `None` uses the type default
    pub default: Option<String>,
    /// Whether only constant sources may feed this port
    pub constant: bool,
}

impl PortSignature {
    /// Create a new input port
    pub fn input(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PinDirection::Input,
            value_type,
            default: None,
            constant: false,
        }
    }

    /// Create a new output port
    pub fn output(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PinDirection::Output,
            value_type,
            default: None,
            constant: false,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Mark as constant-only
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }
}

/// Metadata describing an operation a function node calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Unique operation name
    pub name: String,
    /// Description
    pub description: String,
    /// Ports in declaration order
    pub ports: Vec<PortSignature>,
    /// Whether calling the operation mutates state outside its outputs
    pub has_side_effects: bool,
}

impl OperationDescriptor {
    /// Create a pure operation
    pub fn pure(name: impl Into<String>, ports: Vec<PortSignature>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            ports,
            has_side_effects: false,
        }
    }

    /// Create a side-effecting operation with execution context ports prepended
    pub fn mutable(name: impl Into<String>, ports: Vec<PortSignature>) -> Self {
        let mut all = vec![
            PortSignature::input(EXECUTE_PIN, ValueType::execute_context()),
            PortSignature::output(THEN_PIN, ValueType::execute_context()),
        ];
        all.extend(ports);
        Self {
            name: name.into(),
            description: String::new(),
            ports: all,
            has_side_effects: true,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the operation takes an execution context input
    pub fn has_execute_input(&self) -> bool {
        self.ports
            .iter()
            .any(|port| port.direction == PinDirection::Input && port.value_type.is_execute_context())
    }
}

/// Registry of available operations
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: IndexMap<String, OperationDescriptor>,
}

impl OperationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation, replacing any previous one with the same name
    pub fn register(&mut self, descriptor: OperationDescriptor) {
        self.operations.insert(descriptor.name.clone(), descriptor);
    }

    /// Get an operation by name
    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    /// Get all registered operations
    pub fn operations(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values()
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Create the registry of built-in rig operations
pub fn standard_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();

    // Entry point
    registry.register(OperationDescriptor {
        name: BEGIN_EXECUTION.to_string(),
        description: "Starts the forward solve".to_string(),
        ports: vec![PortSignature::output(THEN_PIN, ValueType::execute_context())],
        has_side_effects: true,
    });

    // Math
    registry.register(
        OperationDescriptor::pure(
            "FloatAdd",
            vec![
                PortSignature::input("A", ValueType::float()),
                PortSignature::input("B", ValueType::float()),
                PortSignature::output("Result", ValueType::float()),
            ],
        )
        .with_description("Adds two floats"),
    );
    registry.register(
        OperationDescriptor::pure(
            "FloatMultiply",
            vec![
                PortSignature::input("A", ValueType::float()).with_default("1.0"),
                PortSignature::input("B", ValueType::float()).with_default("1.0"),
                PortSignature::output("Result", ValueType::float()),
            ],
        )
        .with_description("Multiplies two floats"),
    );
    registry.register(
        OperationDescriptor::pure(
            "MakeVector",
            vec![
                PortSignature::input("X", ValueType::float()),
                PortSignature::input("Y", ValueType::float()),
                PortSignature::input("Z", ValueType::float()),
                PortSignature::output("Result", ValueType::vector()),
            ],
        )
        .with_description("Builds a vector from components"),
    );
    registry.register(
        OperationDescriptor::pure(
            "ArraySum",
            vec![
                PortSignature::input("Values", ValueType::array_of(ValueType::float()))
                    .with_default("(0.0,0.0)"),
                PortSignature::output("Sum", ValueType::float()),
            ],
        )
        .with_description("Sums an array of floats"),
    );

    // Hierarchy
    registry.register(
        OperationDescriptor::mutable(
            "SetTransform",
            vec![
                PortSignature::input("Item", ValueType::name()).constant(),
                PortSignature::input("Value", ValueType::transform()),
                PortSignature::input("Weight", ValueType::float()).with_default("1.0"),
            ],
        )
        .with_description("Writes a global transform to a hierarchy item"),
    );
    registry.register(
        OperationDescriptor::mutable(
            "SetTranslation",
            vec![
                PortSignature::input("Item", ValueType::name()).constant(),
                PortSignature::input("Value", ValueType::vector()),
            ],
        )
        .with_description("Writes a translation to a hierarchy item"),
    );

    // Debugging
    registry.register(
        OperationDescriptor::mutable(
            "PrintFloat",
            vec![PortSignature::input("Value", ValueType::float())],
        )
        .with_description("Logs a float"),
    );

    registry
}
