// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes, pins and links.
//!
//! Nodes and links live in dense arrays and refer to each other only by
//! index. Structural edits (see `topology`) shift indices and then run a
//! single [`Graph::reindex`] pass that restores every derived field.

use crate::link::Link;
use crate::node::{Node, NodeSnapshot};
use crate::pin::{Pin, PinDirection, PinRef};
use crate::types::{join_array, join_struct, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A rig node graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes by index
    pub(crate) nodes: Vec<Node>,
    /// Links by index
    pub(crate) links: Vec<Link>,
    /// Node name to index
    lookup: IndexMap<String, usize>,
    /// Bumped by every structural edit
    version: u64,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            links: Vec::new(),
            lookup: IndexMap::new(),
            version: 0,
        }
    }

    /// Structural version, changes whenever nodes, pins or links change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get a node by index
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Get a node by name
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_index(name).map(|index| &self.nodes[index])
    }

    /// Index of the node with the given name
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Get all nodes
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a link by index
    pub fn link(&self, index: usize) -> Option<&Link> {
        self.links.get(index)
    }

    /// Get all links
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Get a pin
    pub fn pin(&self, pin: PinRef) -> Option<&Pin> {
        self.nodes.get(pin.node)?.pins.get(pin.pin)
    }

    /// Capture a node so it can be re-created at the same index
    pub fn snapshot_node(&self, index: usize) -> Option<NodeSnapshot> {
        let node = self.nodes.get(index)?;
        Some(NodeSnapshot {
            index,
            name: node.name.clone(),
            kind: node.kind.clone(),
            position: node.position,
            size: node.size,
            color: node.color,
            text: node.text.clone(),
            selected: node.selected,
            parent: node.parent.map(|parent| self.nodes[parent].name.clone()),
            owner: node.owner.clone(),
            pins: node
                .pins
                .iter()
                .filter(|pin| pin.parent.is_none())
                .map(|pin| node.capture_pin(pin.index))
                .collect(),
        })
    }

    /// Names of the selected nodes in index order
    pub fn selection(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.selected)
            .map(|node| node.name.clone())
            .collect()
    }

    /// Index of the link between two pins
    pub fn find_link(&self, source: PinRef, target: PinRef) -> Option<usize> {
        self.links
            .iter()
            .position(|link| link.source == source && link.target == target)
    }

    /// Links leaving any pin of `node`
    pub fn outgoing_links(&self, node: usize) -> impl Iterator<Item = (usize, &Link)> {
        self.links
            .iter()
            .enumerate()
            .filter(move |(_, link)| link.source.node == node)
    }

    /// Links arriving at any pin of `node`
    pub fn incoming_links(&self, node: usize) -> impl Iterator<Item = (usize, &Link)> {
        self.links
            .iter()
            .enumerate()
            .filter(move |(_, link)| link.target.node == node)
    }

    /// Nodes that start execution
    pub fn entry_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|node| node.is_entry())
            .map(Node::index)
            .collect()
    }

    /// Resolve a `Node.Pin.Sub` path
    pub fn find_pin(&self, path: &str) -> Option<PinRef> {
        let (node, pin_path) = path.split_once('.')?;
        self.find_pin_in(self.node_index(node)?, pin_path)
    }

    /// Resolve a `Pin.Sub` path on a node
    pub fn find_pin_in(&self, node: usize, path: &str) -> Option<PinRef> {
        let owner = self.nodes.get(node)?;
        let mut current = None;
        for segment in path.split('.') {
            current = Some(owner.find_child(current, segment)?);
        }
        current.map(|pin| PinRef::new(node, pin))
    }

    /// Dotted path of a pin, optionally prefixed with the node name
    pub fn pin_path(&self, pin: PinRef, include_node: bool) -> String {
        let Some(node) = self.nodes.get(pin.node) else {
            return String::new();
        };

        let mut segments = Vec::new();
        let mut current = Some(pin.pin);
        while let Some(index) = current {
            segments.push(node.pins[index].name.as_str());
            current = node.pins[index].parent;
        }
        if include_node {
            segments.push(node.name.as_str());
        }
        segments.reverse();
        segments.join(".")
    }

    /// Default value of a pin, composing compound literals from the leaves
    pub fn pin_default_value(&self, pin: PinRef) -> String {
        let Some(node) = self.nodes.get(pin.node) else {
            return String::new();
        };
        compose_default(node, pin.pin)
    }

    /// Return `base` if it is free, else `base_1`, `base_2`, …
    ///
    /// The base is sanitized first, see [`sanitize_name`].
    pub fn safe_new_name(&self, base: &str) -> String {
        let sanitized = sanitize_name(base);
        if !self.lookup.contains_key(&sanitized) {
            return sanitized;
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{sanitized}_{suffix}");
            if !self.lookup.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Pins that exclude `pin` as a link target: its ancestors and descendants
    pub fn related_pins(&self, pin: PinRef) -> Vec<PinRef> {
        let Some(node) = self.nodes.get(pin.node) else {
            return Vec::new();
        };

        let mut related = Vec::new();
        let mut current = node.pins[pin.pin].parent;
        while let Some(index) = current {
            related.push(PinRef::new(pin.node, index));
            current = node.pins[index].parent;
        }
        related.extend((pin.pin + 1..node.subtree_end(pin.pin)).map(|index| PinRef::new(pin.node, index)));
        related
    }

    /// Restore every derived field after an index shift.
    ///
    /// Renumbers node and pin indices, rebuilds the name lookup and the
    /// per-pin link lists. A link pointing at a missing pin is an invariant
    /// violation and panics.
    pub(crate) fn reindex(&mut self) {
        self.lookup.clear();
        for (node_index, node) in self.nodes.iter_mut().enumerate() {
            node.index = node_index;
            self.lookup.insert(node.name.clone(), node_index);
            for (pin_index, pin) in node.pins.iter_mut().enumerate() {
                pin.node = node_index;
                pin.index = pin_index;
                pin.links.clear();
            }
        }

        for (link_index, link) in self.links.iter().enumerate() {
            for end in [link.source, link.target] {
                let pin = self
                    .nodes
                    .get_mut(end.node)
                    .and_then(|node| node.pins.get_mut(end.pin))
                    .unwrap_or_else(|| panic!("link {link_index} points at missing pin {end:?}"));
                pin.links.push(link_index);
            }
        }

        self.version += 1;
        debug_assert_eq!(self.validate(), Ok(()));
    }

    /// Check every structural invariant, describing the first violation
    pub fn validate(&self) -> Result<(), String> {
        if self.lookup.len() != self.nodes.len() {
            return Err("node names are not unique".to_string());
        }

        for (node_index, node) in self.nodes.iter().enumerate() {
            if node.index != node_index || self.lookup.get(&node.name) != Some(&node_index) {
                return Err(format!("node {} has a stale index", node.name));
            }
            if let Some(parent) = node.parent {
                if parent >= self.nodes.len() || parent == node_index {
                    return Err(format!("node {} has an invalid parent", node.name));
                }
            }

            for (pin_index, pin) in node.pins.iter().enumerate() {
                let path = self.pin_path(PinRef::new(node_index, pin_index), true);
                if pin.node != node_index || pin.index != pin_index {
                    return Err(format!("pin {path} has a stale index"));
                }
                if let Some(parent) = pin.parent {
                    if parent >= pin_index || !node.pins[parent].children.contains(&pin_index) {
                        return Err(format!("pin {path} is not listed by its parent"));
                    }
                }
                for (slot, &child) in pin.children.iter().enumerate() {
                    if child >= node.pins.len() || node.pins[child].parent != Some(pin_index) {
                        return Err(format!("pin {path} lists a foreign child"));
                    }
                    if pin.is_array() && node.pins[child].name != slot.to_string() {
                        return Err(format!("array pin {path} has misnamed elements"));
                    }
                }
                for &link in &pin.links {
                    if !self.links.get(link).is_some_and(|l| l.involves_pin(pin.pin_ref())) {
                        return Err(format!("pin {path} lists a dangling link {link}"));
                    }
                }
            }
        }

        for (link_index, link) in self.links.iter().enumerate() {
            let (Some(source), Some(target)) = (self.pin(link.source), self.pin(link.target)) else {
                return Err(format!("link {link_index} is dangling"));
            };
            if source.direction != PinDirection::Output || target.direction != PinDirection::Input {
                return Err(format!("link {link_index} has wrong directions"));
            }
            if !source.links.contains(&link_index) || !target.links.contains(&link_index) {
                return Err(format!("link {link_index} is not listed by its pins"));
            }
        }

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Replace characters other than ASCII alphanumerics and `_` with `_`.
///
/// An empty name becomes `Node`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "Node".to_string()
    } else {
        sanitized
    }
}

fn compose_default(node: &Node, pin: usize) -> String {
    let target = &node.pins[pin];
    match &target.value_type {
        ValueType::Struct(_) if !target.children.is_empty() => join_struct(
            target
                .children
                .iter()
                .map(|&child| (node.pins[child].name.clone(), compose_default(node, child))),
        ),
        ValueType::Array(_) => join_array(
            target
                .children
                .iter()
                .map(|&child| compose_default(node, child)),
        ),
        _ => target.default_value.clone(),
    }
}
