// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node inputs/outputs.

use crate::types::{split_compound, split_struct, ValueType};
use serde::{Deserialize, Serialize};

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin
    Input,
    /// Output pin
    Output,
}

/// Address of a pin: owning node index and pin index within that node.
///
/// Both indices are dense and shift when nodes or pins before them are
/// removed, so a `PinRef` is only valid until the next structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinRef {
    /// Node index
    pub node: usize,
    /// Pin index within the node
    pub pin: usize,
}

impl PinRef {
    /// Create a new pin reference
    pub fn new(node: usize, pin: usize) -> Self {
        Self { node, pin }
    }
}

/// A pin on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    /// Pin name, unique among its siblings
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Value type
    pub value_type: ValueType,
    /// Default literal, only meaningful on leaf pins
    pub default_value: String,
    /// Whether the pin's children are shown expanded
    pub expanded: bool,
    /// Whether the pin only accepts constant sources
    pub constant: bool,
    pub(crate) node: usize,
    pub(crate) index: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) links: Vec<usize>,
}

impl Pin {
    /// Index of the owning node
    pub fn node(&self) -> usize {
        self.node
    }

    /// Index of this pin within its node
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reference to this pin
    pub fn pin_ref(&self) -> PinRef {
        PinRef::new(self.node, self.index)
    }

    /// Parent pin index, `None` for top-level pins
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Child pin indices in order
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Indices of links attached to this pin
    pub fn links(&self) -> &[usize] {
        &self.links
    }

    /// Whether this pin carries an execution context
    pub fn is_execute_context(&self) -> bool {
        self.value_type.is_execute_context()
    }

    /// Whether this pin is an array
    pub fn is_array(&self) -> bool {
        self.value_type.is_array()
    }

    /// Number of array elements (child count), `None` if not an array
    pub fn array_size(&self) -> Option<usize> {
        self.is_array().then_some(self.children.len())
    }

    /// Whether the pin has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Owned description of a pin subtree.
///
/// Used to create pins from descriptors and to snapshot removed pins so
/// that undo can put them back exactly as they were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinTemplate {
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Value type
    pub value_type: ValueType,
    /// Default literal for leaves
    pub default_value: String,
    /// Expanded flag
    pub expanded: bool,
    /// Constant flag
    pub constant: bool,
    /// Child templates
    pub children: Vec<PinTemplate>,
}

impl PinTemplate {
    /// Build a pin subtree for `value_type`, unfolding structs and arrays.
    ///
    /// `default` may be a compound literal; missing or malformed parts fall
    /// back to the field or type default.
    pub fn from_type(
        name: impl Into<String>,
        direction: PinDirection,
        value_type: &ValueType,
        default: Option<&str>,
        constant: bool,
    ) -> Self {
        let mut template = Self {
            name: name.into(),
            direction,
            value_type: value_type.clone(),
            default_value: String::new(),
            expanded: false,
            constant,
            children: Vec::new(),
        };

        match value_type {
            ValueType::Struct(ty) => {
                let overrides = default.and_then(split_struct).unwrap_or_default();
                for field in &ty.fields {
                    let field_default = overrides
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map(|(_, value)| value.as_str())
                        .or(field.default.as_deref());
                    template.children.push(Self::from_type(
                        field.name.clone(),
                        direction,
                        &field.value_type,
                        field_default,
                        constant,
                    ));
                }
            }
            ValueType::Array(element) => {
                let elements = default.and_then(split_compound).unwrap_or_default();
                for (index, element_default) in elements.iter().enumerate() {
                    template.children.push(Self::from_type(
                        index.to_string(),
                        direction,
                        element,
                        Some(element_default),
                        constant,
                    ));
                }
            }
            _ => {
                template.default_value = default
                    .map(str::to_string)
                    .unwrap_or_else(|| value_type.default_value());
            }
        }

        template
    }

    /// Number of pins in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }

    /// Flatten into pre-order pins whose indices start at `base`
    pub(crate) fn flatten(self, node: usize, base: usize, parent: Option<usize>) -> Vec<Pin> {
        let mut out = Vec::with_capacity(self.count());
        self.flatten_into(&mut out, node, base, parent);
        out
    }

    fn flatten_into(self, out: &mut Vec<Pin>, node: usize, base: usize, parent: Option<usize>) {
        let slot = out.len();
        out.push(Pin {
            name: self.name,
            direction: self.direction,
            value_type: self.value_type,
            default_value: self.default_value,
            expanded: self.expanded,
            constant: self.constant,
            node,
            index: base + slot,
            parent,
            children: Vec::new(),
            links: Vec::new(),
        });
        for child in self.children {
            let child_index = base + out.len();
            out[slot].children.push(child_index);
            child.flatten_into(out, node, base, Some(base + slot));
        }
    }
}
