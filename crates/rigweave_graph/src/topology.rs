// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural edits on the graph store.
//!
//! Every primitive here works in two phases: it first computes which
//! indices move (a contiguous range, since pin subtrees are stored in
//! pre-order), then shifts all references in one pass and calls
//! [`Graph::reindex`]. None of them records actions or checks user-level
//! preconditions; callers in `controller` do that. Violated preconditions
//! here are programmer errors and panic.

use crate::graph::Graph;
use crate::link::Link;
use crate::node::{Node, ParameterDirection};
use crate::pin::{PinDirection, PinRef, PinTemplate};
use crate::registry::OperationDescriptor;
use crate::types::ValueType;

/// Pin subtrees for a function node calling `descriptor`
pub fn pins_for_operation(descriptor: &OperationDescriptor) -> Vec<PinTemplate> {
    descriptor
        .ports
        .iter()
        .map(|port| {
            PinTemplate::from_type(
                port.name.clone(),
                port.direction,
                &port.value_type,
                port.default.as_deref(),
                port.constant,
            )
        })
        .collect()
}

/// Pin subtree for a parameter node.
///
/// Input and hidden parameters expose their value as an output pin,
/// output parameters consume it through an input pin.
pub fn pins_for_parameter(
    direction: ParameterDirection,
    value_type: &ValueType,
    default: Option<&str>,
) -> Vec<PinTemplate> {
    let pin_direction = match direction {
        ParameterDirection::Input | ParameterDirection::Hidden => PinDirection::Output,
        ParameterDirection::Output => PinDirection::Input,
    };
    vec![PinTemplate::from_type("Value", pin_direction, value_type, default, false)]
}

impl Graph {
    /// Insert `node` at `index`, shifting later nodes up
    pub(crate) fn insert_node(&mut self, index: usize, mut node: Node) {
        assert!(index <= self.nodes.len(), "node index {index} out of range");

        let shift = |i: usize| if i >= index { i + 1 } else { i };
        for link in &mut self.links {
            link.source.node = shift(link.source.node);
            link.target.node = shift(link.target.node);
        }
        for existing in &mut self.nodes {
            existing.parent = existing.parent.map(shift);
        }

        node.parent = None;
        for pin in &mut node.pins {
            pin.links.clear();
        }
        self.nodes.insert(index, node);
        self.reindex();
    }

    /// Remove the node at `index`; it must have no links and no hierarchy children
    pub(crate) fn remove_node_at(&mut self, index: usize) -> Node {
        assert!(
            !self.links.iter().any(|link| link.involves_node(index)),
            "node {index} still has links"
        );
        assert!(
            !self.nodes.iter().any(|node| node.parent == Some(index)),
            "node {index} still has hierarchy children"
        );

        let node = self.nodes.remove(index);
        let shift = |i: usize| if i > index { i - 1 } else { i };
        for link in &mut self.links {
            link.source.node = shift(link.source.node);
            link.target.node = shift(link.target.node);
        }
        for existing in &mut self.nodes {
            existing.parent = existing.parent.map(shift);
        }
        self.reindex();
        node
    }

    /// Set the hierarchy parent of a node
    pub(crate) fn set_parent_raw(&mut self, node: usize, parent: Option<usize>) {
        self.nodes[node].parent = parent;
    }

    /// Rename a node; the name must be free
    pub(crate) fn rename_raw(&mut self, node: usize, name: String) {
        assert!(
            self.node_index(&name).map_or(true, |existing| existing == node),
            "node name {name} is taken"
        );
        self.nodes[node].name = name;
        self.reindex();
    }

    /// Insert a link at `index`, shifting later links up
    pub(crate) fn insert_link(&mut self, index: usize, link: Link) {
        assert!(index <= self.links.len(), "link index {index} out of range");
        self.links.insert(index, link);
        self.reindex();
    }

    /// Remove the link at `index`; later link indices shift down by one
    pub(crate) fn remove_link_at(&mut self, index: usize) -> Link {
        let link = self.links.remove(index);
        self.reindex();
        link
    }

    /// Insert a pin subtree as child number `slot` of `parent`.
    ///
    /// Returns the index of the new subtree root. Array elements are
    /// renumbered afterwards.
    pub(crate) fn insert_pin_subtree(
        &mut self,
        node_index: usize,
        parent: usize,
        slot: usize,
        template: PinTemplate,
    ) -> usize {
        let count = template.count();
        let node = &mut self.nodes[node_index];
        let children = &node.pins[parent].children;
        assert!(slot <= children.len(), "child slot {slot} out of range");
        let position = match children.get(slot) {
            Some(&child) => child,
            None => node.subtree_end(parent),
        };

        let shift = |i: usize| if i >= position { i + count } else { i };
        for pin in &mut node.pins {
            pin.parent = pin.parent.map(shift);
            for child in &mut pin.children {
                *child = shift(*child);
            }
        }
        let new_pins = template.flatten(node_index, position, Some(parent));
        node.pins.splice(position..position, new_pins);
        node.pins[parent].children.insert(slot, position);
        renumber_elements(node, parent);

        for link in &mut self.links {
            for end in [&mut link.source, &mut link.target] {
                if end.node == node_index {
                    end.pin = shift(end.pin);
                }
            }
        }

        self.reindex();
        position
    }

    /// Remove the subtree rooted at `pin`, returning its snapshot.
    ///
    /// No link may touch the subtree.
    pub(crate) fn remove_pin_subtree(&mut self, pin: PinRef) -> PinTemplate {
        let node = &mut self.nodes[pin.node];
        let start = pin.pin;
        let end = node.subtree_end(start);
        let count = end - start;
        assert!(
            !self.links.iter().any(|link| {
                [link.source, link.target]
                    .iter()
                    .any(|end_ref| end_ref.node == pin.node && (start..end).contains(&end_ref.pin))
            }),
            "pin subtree {pin:?} still has links"
        );

        let template = node.capture_pin(start);
        let parent = node.pins[start].parent;
        node.pins.drain(start..end);

        let shift = |i: usize| if i >= end { i - count } else { i };
        for existing in &mut node.pins {
            existing.parent = existing.parent.map(shift);
            existing.children.retain(|&child| child != start);
            for child in &mut existing.children {
                *child = shift(*child);
            }
        }
        if let Some(parent) = parent {
            renumber_elements(node, parent);
        }

        for link in &mut self.links {
            for end_ref in [&mut link.source, &mut link.target] {
                if end_ref.node == pin.node {
                    end_ref.pin = shift(end_ref.pin);
                }
            }
        }

        self.reindex();
        template
    }

    /// Overwrite the default and expanded flag of a single pin
    pub(crate) fn set_pin_state_raw(&mut self, pin: PinRef, default_value: String, expanded: bool) {
        let target = &mut self.nodes[pin.node].pins[pin.pin];
        target.default_value = default_value;
        target.expanded = expanded;
    }

    /// Mutable access for cosmetic node fields
    pub(crate) fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }
}

/// Array elements are named after their position
fn renumber_elements(node: &mut Node, parent: usize) {
    if !node.pins[parent].is_array() {
        return;
    }
    let children = node.pins[parent].children.clone();
    for (slot, child) in children.into_iter().enumerate() {
        node.pins[child].name = slot.to_string();
    }
}
