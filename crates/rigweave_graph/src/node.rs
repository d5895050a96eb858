// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.

use crate::pin::{Pin, PinTemplate};
use crate::registry::BEGIN_EXECUTION;
use crate::types::ValueType;
use serde::{Deserialize, Serialize};

/// Default node size in graph units
pub const DEFAULT_NODE_SIZE: [f32; 2] = [200.0, 100.0];

/// Direction of a parameter node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterDirection {
    /// Value supplied by the host, read by the graph
    Input,
    /// Value written by the graph, read by the host
    Output,
    /// Internal variable, not exposed to the host
    Hidden,
}

/// What a node is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Call of an operation from the registry
    Function {
        /// Operation descriptor name
        operation: String,
        /// Cached side-effect flag of the operation
        has_side_effects: bool,
    },
    /// Graph parameter
    Parameter {
        /// Parameter direction
        direction: ParameterDirection,
        /// Parameter value type
        value_type: ValueType,
    },
    /// Free text annotation
    Comment,
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique display name
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Position in the graph UI
    pub position: [f32; 2],
    /// Size in the graph UI
    pub size: [f32; 2],
    /// Custom color (optional)
    pub color: Option<[u8; 3]>,
    /// Free text (comment body)
    pub text: String,
    /// Selection state
    pub selected: bool,
    pub(crate) index: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) owner: Option<String>,
    pub(crate) pins: Vec<Pin>,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, position: [f32; 2]) -> Self {
        Self {
            name,
            kind,
            position,
            size: DEFAULT_NODE_SIZE,
            color: None,
            text: String::new(),
            selected: false,
            index: 0,
            parent: None,
            owner: None,
            pins: Vec::new(),
        }
    }

    /// Index of this node in the graph
    pub fn index(&self) -> usize {
        self.index
    }

    /// Hierarchy parent (Reparent / SetSpace), if any
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Node this one was inserted for, removed together with it
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// All pins in pre-order
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    /// Get a pin by index
    pub fn pin(&self, index: usize) -> Option<&Pin> {
        self.pins.get(index)
    }

    /// Top-level pins in declaration order
    pub fn top_level_pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter().filter(|pin| pin.parent.is_none())
    }

    /// Operation name for function nodes
    pub fn operation(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Function { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Whether the node has side effects and must be ordered by execution
    pub fn is_mutable(&self) -> bool {
        matches!(self.kind, NodeKind::Function { has_side_effects: true, .. })
    }

    /// Whether this node starts execution
    pub fn is_entry(&self) -> bool {
        self.operation() == Some(BEGIN_EXECUTION)
    }

    /// Find a child of `parent` (or a top-level pin) by name
    pub fn find_child(&self, parent: Option<usize>, name: &str) -> Option<usize> {
        match parent {
            Some(parent) => self.pins[parent]
                .children
                .iter()
                .copied()
                .find(|&child| self.pins[child].name == name),
            None => self
                .pins
                .iter()
                .position(|pin| pin.parent.is_none() && pin.name == name),
        }
    }

    /// One past the last pin index of the subtree rooted at `pin`
    pub fn subtree_end(&self, pin: usize) -> usize {
        let mut end = pin + 1;
        while end < self.pins.len() && self.is_descendant(end, pin) {
            end += 1;
        }
        end
    }

    /// Whether `pin` lies below `ancestor`
    pub fn is_descendant(&self, pin: usize, ancestor: usize) -> bool {
        let mut current = self.pins[pin].parent;
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.pins[index].parent;
        }
        false
    }

    /// Snapshot the pin subtree rooted at `pin`
    pub fn capture_pin(&self, pin: usize) -> PinTemplate {
        let source = &self.pins[pin];
        PinTemplate {
            name: source.name.clone(),
            direction: source.direction,
            value_type: source.value_type.clone(),
            default_value: source.default_value.clone(),
            expanded: source.expanded,
            constant: source.constant,
            children: source
                .children
                .iter()
                .map(|&child| self.capture_pin(child))
                .collect(),
        }
    }
}

/// Everything needed to re-create a removed node at its old index.
///
/// Links are not part of the snapshot; they are recorded as separate
/// link actions next to the node action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node index at capture time
    pub index: usize,
    /// Node name
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Position
    pub position: [f32; 2],
    /// Size
    pub size: [f32; 2],
    /// Color
    pub color: Option<[u8; 3]>,
    /// Free text
    pub text: String,
    /// Selection state
    pub selected: bool,
    /// Hierarchy parent by name
    pub parent: Option<String>,
    /// Owning node by name
    #[serde(default)]
    pub owner: Option<String>,
    /// Top-level pin subtrees
    pub pins: Vec<PinTemplate>,
}

impl NodeSnapshot {
    /// Rebuild the node; the caller resolves the hierarchy parent
    pub(crate) fn to_node(&self) -> Node {
        let mut node = Node::new(self.name.clone(), self.kind.clone(), self.position);
        node.size = self.size;
        node.color = self.color;
        node.text = self.text.clone();
        node.selected = self.selected;
        node.owner = self.owner.clone();
        for template in &self.pins {
            let base = node.pins.len();
            node.pins.extend(template.clone().flatten(self.index, base, None));
        }
        node.index = self.index;
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PinDirection;

    fn node_with_transform() -> Node {
        let mut node = Node::new(
            "SetTransform".to_string(),
            NodeKind::Function {
                operation: "SetTransform".to_string(),
                has_side_effects: true,
            },
            [0.0, 0.0],
        );
        node.pins = PinTemplate::from_type(
            "Value",
            PinDirection::Input,
            &ValueType::transform(),
            None,
            false,
        )
        .flatten(0, 0, None);
        node
    }

    #[test]
    fn test_subtree_bounds() {
        let node = node_with_transform();
        assert_eq!(node.subtree_end(0), node.pins.len());
        assert_eq!(node.subtree_end(1), 5);
        assert_eq!(node.subtree_end(5), 6);
        assert!(node.is_descendant(7, 6));
        assert!(!node.is_descendant(7, 1));
    }

    #[test]
    fn test_find_child() {
        let node = node_with_transform();
        let scale = node.find_child(Some(0), "Scale").unwrap();
        assert_eq!(node.find_child(Some(scale), "Y"), Some(scale + 2));
        assert_eq!(node.find_child(None, "Value"), Some(0));
        assert!(node.find_child(None, "Scale").is_none());
        assert!(node.is_mutable());
    }

    #[test]
    fn test_capture_round_trip() {
        let node = node_with_transform();
        let template = node.capture_pin(0);
        assert_eq!(template.clone().flatten(0, 0, None), node.pins);
        assert_eq!(template.count(), node.pins.len());
    }
}
