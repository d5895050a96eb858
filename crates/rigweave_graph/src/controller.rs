// SPDX-License-Identifier: MIT OR Apache-2.0
//! The mutation API.
//!
//! [`GraphController`] owns a [`Graph`] and is the only way to change it.
//! Every public mutation runs inside an action bracket: it validates its
//! arguments, then applies primitive changes one at a time, each recorded
//! as an action and queued as an event. If a later step fails, everything
//! the bracket already applied is rolled back. Observers see the queued
//! events once the outermost bracket closes.

use crate::action::{Action, ActionType, Change, NodeProperty, PinState};
use crate::compiler;
use crate::config::GraphConfig;
use crate::cycle::CycleChecker;
use crate::error::{CompileError, GraphError, HistoryError, LinkRejection, Result};
use crate::event::{GraphEvent, GraphObserver};
use crate::graph::{sanitize_name, Graph};
use crate::history::ActionStack;
use crate::link::Link;
use crate::node::{NodeKind, NodeSnapshot, ParameterDirection, DEFAULT_NODE_SIZE};
use crate::pin::{PinDirection, PinRef, PinTemplate};
use crate::program::OperatorProgram;
use crate::registry::{standard_registry, OperationRegistry, BEGIN_EXECUTION, EXECUTE_PIN, THEN_PIN};
use crate::topology::{pins_for_operation, pins_for_parameter};
use crate::traverser::{Reachability, Traverser};
use crate::types::{split_compound, split_struct, OpaqueType, PrimitiveType, ValueType};
use std::sync::Arc;

/// Offset of an auto-inserted entry node from the node it drives
const ENTRY_OFFSET: [f32; 2] = [-250.0, 0.0];

/// Owns a graph and applies every change to it
pub struct GraphController {
    graph: Graph,
    registry: Arc<OperationRegistry>,
    config: GraphConfig,
    history: ActionStack,
    cycle: CycleChecker,
    traverser: Traverser,
    observers: Vec<Box<dyn GraphObserver>>,
    /// Events waiting for the outermost bracket to close
    pending: Vec<GraphEvent>,
    /// Length of `pending` when each open bracket began
    event_marks: Vec<usize>,
    /// Nesting depth of `without_undo`
    suspended: usize,
}

impl GraphController {
    /// Create a controller for an empty graph
    pub fn new(registry: Arc<OperationRegistry>, config: GraphConfig) -> Self {
        Self::with_graph(Graph::default(), registry, config)
    }

    /// Take ownership of an existing graph
    pub fn with_graph(graph: Graph, registry: Arc<OperationRegistry>, config: GraphConfig) -> Self {
        Self {
            graph,
            registry,
            history: ActionStack::with_max_depth(config.max_undo_depth),
            config,
            cycle: CycleChecker::new(),
            traverser: Traverser::new(),
            observers: Vec::new(),
            pending: Vec::new(),
            event_marks: Vec::new(),
            suspended: 0,
        }
    }

    /// The graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Give the graph back
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// The operation registry
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Undo/redo history
    pub fn history(&self) -> &ActionStack {
        &self.history
    }

    /// Mutable history, for restoring a persisted session
    pub fn history_mut(&mut self) -> &mut ActionStack {
        &mut self.history
    }

    /// Register an observer for change events
    pub fn subscribe(&mut self, observer: impl GraphObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node calling `operation`, returning its name.
    ///
    /// The name defaults to the operation name and is uniqued.
    pub fn add_function_node(
        &mut self,
        operation: &str,
        position: [f32; 2],
        name: Option<&str>,
    ) -> Result<String> {
        let descriptor = self
            .registry
            .get(operation)
            .cloned()
            .ok_or_else(|| GraphError::UnknownOperation(operation.to_string()))?;

        self.bracket(ActionType::NodeAdded, format!("Add {operation} node"), |this| {
            let name = this.graph.safe_new_name(name.unwrap_or(operation));
            let kind = NodeKind::Function {
                operation: descriptor.name.clone(),
                has_side_effects: descriptor.has_side_effects,
            };
            let snapshot = this.new_snapshot(name.clone(), kind, position, pins_for_operation(&descriptor));
            this.apply(Change::NodeAdded(snapshot))?;

            if this.config.auto_insert_entry
                && descriptor.has_side_effects
                && descriptor.has_execute_input()
                && this.graph.entry_nodes().is_empty()
            {
                this.insert_entry_for(&name, position)?;
            }
            Ok(name)
        })
    }

    fn insert_entry_for(&mut self, node: &str, position: [f32; 2]) -> Result<()> {
        let Some(descriptor) = self.registry.get(BEGIN_EXECUTION).cloned() else {
            return Ok(());
        };
        let entry = self.graph.safe_new_name(BEGIN_EXECUTION);
        let kind = NodeKind::Function {
            operation: descriptor.name.clone(),
            has_side_effects: descriptor.has_side_effects,
        };
        let position = [position[0] + ENTRY_OFFSET[0], position[1] + ENTRY_OFFSET[1]];
        let mut snapshot = self.new_snapshot(entry.clone(), kind, position, pins_for_operation(&descriptor));
        snapshot.owner = Some(node.to_string());
        self.apply(Change::NodeAdded(snapshot))?;
        tracing::debug!("Inserted entry node {entry} for {node}");
        self.make_link(&format!("{entry}.{THEN_PIN}"), &format!("{node}.{EXECUTE_PIN}"))
    }

    /// Add a parameter node, returning its uniqued name
    pub fn add_parameter_node(
        &mut self,
        name: &str,
        value_type: ValueType,
        direction: ParameterDirection,
        default: Option<&str>,
        position: [f32; 2],
    ) -> Result<String> {
        if let Some(value) = default.filter(|value| !is_valid_literal(&value_type, value)) {
            return Err(GraphError::InvalidDefault {
                pin: format!("{name}.Value"),
                value: value.to_string(),
            });
        }
        self.bracket(ActionType::NodeAdded, format!("Add parameter {name}"), |this| {
            let name = this.graph.safe_new_name(name);
            let pins = pins_for_parameter(direction, &value_type, default);
            let kind = NodeKind::Parameter {
                direction,
                value_type,
            };
            let snapshot = this.new_snapshot(name.clone(), kind, position, pins);
            this.apply(Change::NodeAdded(snapshot))?;
            Ok(name)
        })
    }

    /// Add a comment node, returning its name
    pub fn add_comment_node(&mut self, text: &str, position: [f32; 2], size: [f32; 2]) -> Result<String> {
        self.bracket(ActionType::NodeAdded, "Add comment".to_string(), |this| {
            let name = this.graph.safe_new_name("Comment");
            let mut snapshot = this.new_snapshot(name.clone(), NodeKind::Comment, position, Vec::new());
            snapshot.text = text.to_string();
            snapshot.size = size;
            this.apply(Change::NodeAdded(snapshot))?;
            Ok(name)
        })
    }

    fn new_snapshot(
        &self,
        name: String,
        kind: NodeKind,
        position: [f32; 2],
        pins: Vec<PinTemplate>,
    ) -> NodeSnapshot {
        NodeSnapshot {
            index: self.graph.node_count(),
            name,
            kind,
            position,
            size: DEFAULT_NODE_SIZE,
            color: None,
            text: String::new(),
            selected: false,
            parent: None,
            owner: None,
            pins,
        }
    }

    /// Remove a node together with its links.
    ///
    /// Hierarchy children of the node are detached first. An entry node
    /// inserted for this node goes with it unless it still drives other
    /// nodes, in which case it is released.
    pub fn remove_node(&mut self, name: &str) -> Result<()> {
        self.bracket(ActionType::NodeRemoved, format!("Remove {name}"), |this| {
            let index = this.resolve_node(name)?;
            let owned: Vec<String> = this
                .graph
                .nodes()
                .iter()
                .filter(|node| node.owner() == Some(name))
                .map(|node| node.name.clone())
                .collect();

            let links: Vec<usize> = this
                .graph
                .links()
                .iter()
                .enumerate()
                .filter(|(_, link)| link.involves_node(index))
                .map(|(link_index, _)| link_index)
                .collect();
            for link in links.into_iter().rev() {
                this.remove_link_recorded(link)?;
            }

            let children: Vec<String> = this
                .graph
                .nodes()
                .iter()
                .filter(|node| node.parent() == Some(index))
                .map(|node| node.name.clone())
                .collect();
            for child in children {
                this.apply(Change::NodeChanged {
                    node: child,
                    before: NodeProperty::Parent(Some(name.to_string())),
                    after: NodeProperty::Parent(None),
                })?;
            }

            let snapshot = this
                .graph
                .snapshot_node(index)
                .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))?;
            this.apply(Change::NodeRemoved(snapshot))?;

            for entry in owned {
                let entry_index = this.existing_node(&entry)?;
                if this.graph.outgoing_links(entry_index).next().is_some() {
                    this.apply(Change::NodeChanged {
                        node: entry,
                        before: NodeProperty::Owner(Some(name.to_string())),
                        after: NodeProperty::Owner(None),
                    })?;
                } else {
                    tracing::debug!("Removing entry node {entry} with {name}");
                    this.remove_node(&entry)?;
                }
            }
            Ok(())
        })
    }

    /// Rename a node, returning the name it ended up with
    pub fn rename_node(&mut self, old: &str, new: &str) -> Result<String> {
        self.resolve_node(old)?;
        if new.trim().is_empty() {
            return Err(GraphError::InvalidName(new.to_string()));
        }
        if sanitize_name(new) == old {
            return Ok(old.to_string());
        }

        self.bracket(ActionType::NodeRenamed, format!("Rename {old} to {new}"), |this| {
            let name = this.graph.safe_new_name(new);
            this.apply(Change::NodeRenamed {
                old: old.to_string(),
                new: name.clone(),
            })?;
            Ok(name)
        })
    }

    /// Reparent a node in the node hierarchy, `None` detaches it
    pub fn set_node_parent(&mut self, node: &str, parent: Option<&str>) -> Result<()> {
        let index = self.resolve_node(node)?;
        if let Some(parent) = parent {
            let mut current = Some(self.resolve_node(parent)?);
            while let Some(ancestor) = current {
                if ancestor == index {
                    return Err(GraphError::HierarchyCycle {
                        node: node.to_string(),
                        parent: parent.to_string(),
                    });
                }
                current = self.graph.nodes()[ancestor].parent();
            }
        }
        self.set_property(node, NodeProperty::Parent(parent.map(str::to_string)))
    }

    /// Place a node in the space of another node; same as [`set_node_parent`](Self::set_node_parent)
    pub fn set_node_space(&mut self, node: &str, space: Option<&str>) -> Result<()> {
        self.set_node_parent(node, space)
    }

    /// Move a node
    pub fn set_node_position(&mut self, node: &str, position: [f32; 2]) -> Result<()> {
        self.set_property(node, NodeProperty::Position(position))
    }

    /// Resize a node
    pub fn set_node_size(&mut self, node: &str, size: [f32; 2]) -> Result<()> {
        self.set_property(node, NodeProperty::Size(size))
    }

    /// Set or clear a node's custom color
    pub fn set_node_color(&mut self, node: &str, color: Option<[u8; 3]>) -> Result<()> {
        self.set_property(node, NodeProperty::Color(color))
    }

    /// Set a node's free text
    pub fn set_node_text(&mut self, node: &str, text: &str) -> Result<()> {
        self.set_property(node, NodeProperty::Text(text.to_string()))
    }

    fn set_property(&mut self, node: &str, after: NodeProperty) -> Result<()> {
        let title = format!("Set {} of {node}", after.name());
        self.bracket(ActionType::NodeChanged, title, |this| {
            let index = this.resolve_node(node)?;
            let current = &this.graph.nodes()[index];
            let before = match &after {
                NodeProperty::Position(_) => NodeProperty::Position(current.position),
                NodeProperty::Size(_) => NodeProperty::Size(current.size),
                NodeProperty::Color(_) => NodeProperty::Color(current.color),
                NodeProperty::Text(_) => NodeProperty::Text(current.text.clone()),
                NodeProperty::Parent(_) => NodeProperty::Parent(
                    current
                        .parent()
                        .map(|parent| this.graph.nodes()[parent].name.clone()),
                ),
                NodeProperty::Owner(_) => NodeProperty::Owner(current.owner.clone()),
            };
            if before == after {
                return Ok(());
            }
            this.apply(Change::NodeChanged {
                node: node.to_string(),
                before,
                after,
            })
        })
    }

    /// Replace the selection with exactly `names`
    pub fn set_selection(&mut self, names: &[&str]) -> Result<()> {
        self.bracket(ActionType::Selection, "Change selection".to_string(), |this| {
            for name in names {
                this.resolve_node(name)?;
            }
            let before = this.graph.selection();
            let after: Vec<String> = this
                .graph
                .nodes()
                .iter()
                .filter(|node| names.contains(&node.name.as_str()))
                .map(|node| node.name.clone())
                .collect();
            if before == after {
                return Ok(());
            }
            this.apply(Change::Selection { before, after })
        })
    }

    /// Add a node to or remove it from the selection
    pub fn select_node(&mut self, name: &str, selected: bool) -> Result<()> {
        self.resolve_node(name)?;
        let mut names = self.graph.selection();
        if selected {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        } else {
            names.retain(|existing| existing != name);
        }
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.set_selection(&names)
    }

    /// Deselect everything
    pub fn clear_selection(&mut self) -> Result<()> {
        self.set_selection(&[])
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Check whether `source` may be linked to `target` (pin paths)
    pub fn can_link(&self, source: &str, target: &str) -> Result<()> {
        let source_ref = self.resolve_pin(source)?;
        let target_ref = self.resolve_pin(target)?;
        self.can_link_pins(source_ref, target_ref)
            .map_err(|reason| GraphError::LinkRejected {
                source_pin: source.to_string(),
                target_pin: target.to_string(),
                reason,
            })
    }

    /// Check whether a link between two pins is allowed
    pub fn can_link_pins(&self, source: PinRef, target: PinRef) -> std::result::Result<(), LinkRejection> {
        let (Some(source_pin), Some(target_pin)) = (self.graph.pin(source), self.graph.pin(target)) else {
            return Err(LinkRejection::MissingPin);
        };

        if source.node == target.node {
            return Err(LinkRejection::SameNode);
        }
        if source_pin.direction == target_pin.direction {
            return Err(LinkRejection::SameDirection);
        }
        if source_pin.direction != PinDirection::Output {
            return Err(LinkRejection::SourceNotOutput);
        }
        if target_pin.direction != PinDirection::Input {
            return Err(LinkRejection::TargetNotInput);
        }
        if !source_pin.value_type.can_link_to(&target_pin.value_type) {
            return Err(LinkRejection::IncompatibleTypes {
                source_type: source_pin.value_type.to_string(),
                target_type: target_pin.value_type.to_string(),
            });
        }
        if target_pin.constant && !source_pin.constant {
            return Err(LinkRejection::ConstantTarget);
        }
        if self.graph.find_link(source, target).is_some() {
            return Err(LinkRejection::Duplicate);
        }

        let would_cycle = if self.config.cycle_cache {
            self.cycle.would_cycle(&self.graph, source, target)
        } else {
            CycleChecker::new().would_cycle(&self.graph, source, target)
        };
        if would_cycle {
            return Err(LinkRejection::Cycle);
        }
        Ok(())
    }

    /// Cache reachability for repeated link checks through `pin`
    pub fn prepare_cycle_checking(&mut self, pin: &str) -> Result<()> {
        let pin = self.resolve_pin(pin)?;
        if self.config.cycle_cache {
            self.cycle.prepare(&self.graph, pin);
        }
        Ok(())
    }

    /// Drop the cycle-check cache
    pub fn reset_cycle_check(&mut self) {
        self.cycle.reset();
    }

    /// Link two pins, replacing whatever fed the target before
    pub fn make_link(&mut self, source: &str, target: &str) -> Result<()> {
        self.bracket(ActionType::LinkAdded, format!("Link {source} to {target}"), |this| {
            let source_ref = this.resolve_pin(source)?;
            let target_ref = this.resolve_pin(target)?;
            if let Err(reason) = this.can_link_pins(source_ref, target_ref) {
                if reason == LinkRejection::Cycle {
                    tracing::warn!("Rejected link {source} -> {target}: would create a cycle");
                }
                return Err(GraphError::LinkRejected {
                    source_pin: source.to_string(),
                    target_pin: target.to_string(),
                    reason,
                });
            }

            let mut occupied = this.graph.related_pins(target_ref);
            occupied.push(target_ref);
            let replaced: Vec<usize> = this
                .graph
                .links()
                .iter()
                .enumerate()
                .filter(|(_, link)| occupied.contains(&link.target))
                .map(|(index, _)| index)
                .collect();
            for index in replaced.into_iter().rev() {
                this.remove_link_recorded(index)?;
            }

            let change = Change::LinkAdded {
                index: this.graph.link_count(),
                source: this.graph.pin_path(source_ref, true),
                target: this.graph.pin_path(target_ref, true),
            };
            this.apply(change)
        })
    }

    /// Remove the link between two pins
    pub fn break_link(&mut self, source: &str, target: &str) -> Result<()> {
        self.bracket(ActionType::LinkRemoved, format!("Unlink {source} from {target}"), |this| {
            let source_ref = this.resolve_pin(source)?;
            let target_ref = this.resolve_pin(target)?;
            let index = this
                .graph
                .find_link(source_ref, target_ref)
                .ok_or_else(|| GraphError::LinkNotFound(format!("{source} -> {target}")))?;
            this.remove_link_recorded(index)
        })
    }

    /// Remove every link arriving at (`as_input`) or leaving `pin`,
    /// returning how many were removed
    pub fn break_links(&mut self, pin: &str, as_input: bool) -> Result<usize> {
        self.bracket(ActionType::LinkRemoved, format!("Break links of {pin}"), |this| {
            let pin_ref = this.resolve_pin(pin)?;
            let doomed: Vec<usize> = this
                .graph
                .links()
                .iter()
                .enumerate()
                .filter(|(_, link)| {
                    if as_input {
                        link.target == pin_ref
                    } else {
                        link.source == pin_ref
                    }
                })
                .map(|(index, _)| index)
                .collect();
            let count = doomed.len();
            for index in doomed.into_iter().rev() {
                this.remove_link_recorded(index)?;
            }
            Ok(count)
        })
    }

    fn remove_link_recorded(&mut self, index: usize) -> Result<()> {
        let link = *self
            .graph
            .link(index)
            .ok_or_else(|| GraphError::LinkNotFound(index.to_string()))?;
        let change = Change::LinkRemoved {
            index,
            source: self.graph.pin_path(link.source, true),
            target: self.graph.pin_path(link.target, true),
        };
        self.apply(change)
    }

    // ------------------------------------------------------------------
    // Pins
    // ------------------------------------------------------------------

    /// Set a pin's default value.
    ///
    /// Compound literals are distributed over the child pins; arrays are
    /// resized to the number of elements in the literal.
    pub fn set_pin_default_value(&mut self, pin: &str, value: &str) -> Result<()> {
        self.bracket(ActionType::PinChanged, format!("Set {pin}"), |this| {
            let pin_ref = this.resolve_pin(pin)?;
            this.assign_default(pin_ref, value)
        })
    }

    fn assign_default(&mut self, pin: PinRef, value: &str) -> Result<()> {
        let invalid = |graph: &Graph| GraphError::InvalidDefault {
            pin: graph.pin_path(pin, true),
            value: value.to_string(),
        };
        let Some(current) = self.graph.pin(pin) else {
            return Err(GraphError::PinNotFound(format!("{pin:?}")));
        };
        let value_type = current.value_type.clone();
        let expanded = current.expanded;
        let is_leaf = current.is_leaf();

        match value_type {
            ValueType::Struct(_) if !is_leaf => {
                let fields = split_struct(value).ok_or_else(|| invalid(&self.graph))?;
                for (field, field_value) in fields {
                    let child = self.graph.nodes()[pin.node]
                        .find_child(Some(pin.pin), &field)
                        .ok_or_else(|| invalid(&self.graph))?;
                    self.assign_default(PinRef::new(pin.node, child), &field_value)?;
                }
                Ok(())
            }
            ValueType::Array(_) => {
                let elements = split_compound(value).ok_or_else(|| invalid(&self.graph))?;
                self.resize_array(pin, elements.len(), None)?;
                for (slot, element) in elements.iter().enumerate() {
                    let child = self.graph.nodes()[pin.node].pins()[pin.pin].children()[slot];
                    self.assign_default(PinRef::new(pin.node, child), element)?;
                }
                Ok(())
            }
            leaf => {
                if !is_valid_leaf(&leaf, value) {
                    return Err(invalid(&self.graph));
                }
                self.set_pin_state(pin, value.to_string(), expanded)
            }
        }
    }

    /// Show or hide a pin's children
    pub fn set_pin_expansion(&mut self, pin: &str, expanded: bool) -> Result<()> {
        self.bracket(ActionType::PinChanged, format!("Expand {pin}"), |this| {
            let pin_ref = this.resolve_pin(pin)?;
            let default = this.graph.nodes()[pin_ref.node].pins()[pin_ref.pin]
                .default_value
                .clone();
            this.set_pin_state(pin_ref, default, expanded)
        })
    }

    fn set_pin_state(&mut self, pin: PinRef, default_value: String, expanded: bool) -> Result<()> {
        let current = &self.graph.nodes()[pin.node].pins()[pin.pin];
        let before = PinState {
            default_value: current.default_value.clone(),
            expanded: current.expanded,
        };
        let after = PinState {
            default_value,
            expanded,
        };
        if before == after {
            return Ok(());
        }
        let path = self.graph.pin_path(pin, true);
        self.apply(Change::PinChanged {
            pin: path,
            before,
            after,
        })
    }

    /// Resize an array pin.
    ///
    /// New elements take `default`, else the last element's value, else
    /// the element type default. Removed elements lose their links first.
    /// Returns `false` when the array already has `size` elements.
    pub fn set_pin_array_size(&mut self, pin: &str, size: usize, default: Option<&str>) -> Result<bool> {
        let array = self.resolve_pin(pin)?;
        let current = self.array_children(array)?.len();
        if current == size {
            return Ok(false);
        }
        let action_type = if size > current {
            ActionType::PinAdded
        } else {
            ActionType::PinRemoved
        };
        self.bracket(action_type, format!("Resize {pin} to {size}"), |this| {
            this.resize_array(array, size, default)
        })
    }

    /// Insert an array element at `index`, returning its path
    pub fn insert_array_pin(&mut self, pin: &str, index: usize, default: Option<&str>) -> Result<String> {
        let array = self.resolve_pin(pin)?;
        let size = self.array_children(array)?.len();
        if index > size {
            return Err(GraphError::ArrayIndexOutOfRange {
                pin: pin.to_string(),
                index,
                size,
            });
        }
        self.bracket(ActionType::PinAdded, format!("Insert element into {pin}"), |this| {
            let element = this.insert_element(array, index, default)?;
            Ok(this.graph.pin_path(element, true))
        })
    }

    /// Append an array element, returning its path
    pub fn add_array_pin(&mut self, pin: &str, default: Option<&str>) -> Result<String> {
        let array = self.resolve_pin(pin)?;
        let size = self.array_children(array)?.len();
        self.insert_array_pin(pin, size, default)
    }

    /// Remove one array element; later elements are renumbered
    pub fn remove_array_pin(&mut self, element: &str) -> Result<()> {
        let element_ref = self.resolve_pin(element)?;
        let node = &self.graph.nodes()[element_ref.node];
        let array = match node.pins()[element_ref.pin].parent() {
            Some(parent) if node.pins()[parent].is_array() => PinRef::new(element_ref.node, parent),
            _ => return Err(GraphError::NotAnArray(element.to_string())),
        };
        let slot = node.pins()[array.pin]
            .children()
            .iter()
            .position(|&child| child == element_ref.pin)
            .ok_or_else(|| GraphError::PinNotFound(element.to_string()))?;

        self.bracket(ActionType::PinRemoved, format!("Remove {element}"), |this| {
            this.remove_element(array, slot)
        })
    }

    fn array_children(&self, array: PinRef) -> Result<Vec<usize>> {
        match self.graph.pin(array) {
            Some(pin) if pin.is_array() => Ok(pin.children().to_vec()),
            _ => Err(GraphError::NotAnArray(self.graph.pin_path(array, true))),
        }
    }

    fn resize_array(&mut self, array: PinRef, size: usize, default: Option<&str>) -> Result<bool> {
        let current = self.array_children(array)?.len();
        if size > current {
            for slot in current..size {
                self.insert_element(array, slot, default)?;
            }
        } else {
            for slot in (size..current).rev() {
                self.remove_element(array, slot)?;
            }
        }
        Ok(current != size)
    }

    fn insert_element(&mut self, array: PinRef, slot: usize, default: Option<&str>) -> Result<PinRef> {
        let children = self.array_children(array)?;
        let pin = &self.graph.nodes()[array.node].pins()[array.pin];
        let element_type = pin
            .value_type
            .element_type()
            .cloned()
            .ok_or_else(|| GraphError::NotAnArray(self.graph.pin_path(array, true)))?;
        if let Some(value) = default.filter(|value| !is_valid_literal(&element_type, value)) {
            return Err(GraphError::InvalidDefault {
                pin: self.graph.pin_path(array, true),
                value: value.to_string(),
            });
        }
        let value = match default {
            Some(value) => Some(value.to_string()),
            None => children
                .last()
                .map(|&last| self.graph.pin_default_value(PinRef::new(array.node, last))),
        };
        let element = PinTemplate::from_type(
            slot.to_string(),
            pin.direction,
            &element_type,
            value.as_deref(),
            pin.constant,
        );

        let path = self.graph.pin_path(array, true);
        self.apply(Change::PinAdded {
            array: path,
            slot,
            element,
        })?;

        let child = self.array_children(array)?[slot];
        Ok(PinRef::new(array.node, child))
    }

    fn remove_element(&mut self, array: PinRef, slot: usize) -> Result<()> {
        let children = self.array_children(array)?;
        let Some(&child) = children.get(slot) else {
            return Err(GraphError::ArrayIndexOutOfRange {
                pin: self.graph.pin_path(array, true),
                index: slot,
                size: children.len(),
            });
        };

        let element = PinRef::new(array.node, child);
        for link in self.subtree_links(element).into_iter().rev() {
            self.remove_link_recorded(link)?;
        }

        let template = self.graph.nodes()[array.node].capture_pin(child);
        let path = self.graph.pin_path(array, true);
        self.apply(Change::PinRemoved {
            array: path,
            slot,
            element: template,
        })
    }

    /// Links touching any pin of the subtree rooted at `pin`, ascending
    fn subtree_links(&self, pin: PinRef) -> Vec<usize> {
        let end = self.graph.nodes()[pin.node].subtree_end(pin.pin);
        let inside = |end_ref: PinRef| end_ref.node == pin.node && (pin.pin..end).contains(&end_ref.pin);
        self.graph
            .links()
            .iter()
            .enumerate()
            .filter(|(_, link)| inside(link.source) || inside(link.target))
            .map(|(index, _)| index)
            .collect()
    }

    // ------------------------------------------------------------------
    // Transactions and history
    // ------------------------------------------------------------------

    /// Open a bracket grouping the following mutations into one undo step
    pub fn begin_action(&mut self, action_type: ActionType, title: impl Into<String>) {
        self.open(action_type, title);
    }

    /// Close the bracket opened by [`begin_action`](Self::begin_action)
    pub fn end_action(&mut self) -> Result<()> {
        if !self.history.is_recording() {
            return Err(GraphError::NoOpenAction);
        }
        self.close();
        Ok(())
    }

    /// Close the open bracket and roll back everything it did
    pub fn cancel_action(&mut self) -> Result<()> {
        if !self.history.is_recording() {
            return Err(GraphError::NoOpenAction);
        }
        self.abort();
        Ok(())
    }

    /// Run `body` without adding anything to the undo stack
    pub fn without_undo<T>(&mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        self.suspended += 1;
        let result = body(self);
        self.suspended -= 1;
        result
    }

    /// Whether there is something to undo
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether there is something to redo
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Title of the action [`undo`](Self::undo) would revert
    pub fn undo_title(&self) -> Option<&str> {
        self.history.undo_title()
    }

    /// Title of the action [`redo`](Self::redo) would re-apply
    pub fn redo_title(&self) -> Option<&str> {
        self.history.redo_title()
    }

    /// Revert the latest action.
    ///
    /// If an inverse no longer matches the graph, replay stops where it
    /// failed and the action is dropped from the history.
    pub fn undo(&mut self) -> std::result::Result<(), HistoryError> {
        if let Some(title) = self.history.recording_title() {
            return Err(HistoryError::Recording(title.to_string()));
        }
        let action = self.history.pop_undo()?;
        tracing::debug!("Undo {:?}", action.title);

        let result = self.replay(&action, false);
        self.flush_events();
        match result {
            Ok(()) => {
                self.history.push_redo(action);
                Ok(())
            }
            Err(source) => {
                tracing::warn!("Undo of {:?} stopped part-way: {source}", action.title);
                Err(HistoryError::Desync {
                    title: action.title,
                    source,
                })
            }
        }
    }

    /// Re-apply the latest undone action
    pub fn redo(&mut self) -> std::result::Result<(), HistoryError> {
        if let Some(title) = self.history.recording_title() {
            return Err(HistoryError::Recording(title.to_string()));
        }
        let action = self.history.pop_redo()?;
        tracing::debug!("Redo {:?}", action.title);

        let result = self.replay(&action, true);
        self.flush_events();
        match result {
            Ok(()) => {
                self.history.push_undo(action);
                Ok(())
            }
            Err(source) => {
                tracing::warn!("Redo of {:?} stopped part-way: {source}", action.title);
                Err(HistoryError::Desync {
                    title: action.title,
                    source,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    /// Nodes reached from the graph's entry nodes
    pub fn reachability(&mut self) -> Reachability {
        let entries = self.graph.entry_nodes();
        self.traverser.compute(&self.graph, &entries)
    }

    /// Compile everything reachable from the entry nodes
    pub fn compile(&mut self) -> std::result::Result<OperatorProgram, CompileError> {
        let reachability = self.reachability();
        compiler::compile(&self.graph, &reachability.reachable)
    }

    // ------------------------------------------------------------------
    // Brackets and replay
    // ------------------------------------------------------------------

    fn bracket<T>(
        &mut self,
        action_type: ActionType,
        title: String,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.open(action_type, title);
        let result = body(self);
        match &result {
            Ok(_) => self.close(),
            Err(err) => {
                tracing::debug!("Rolling back: {err}");
                self.abort();
            }
        }
        result
    }

    fn open(&mut self, action_type: ActionType, title: impl Into<String>) {
        self.event_marks.push(self.pending.len());
        self.history.begin(action_type, title);
    }

    fn close(&mut self) {
        self.event_marks.pop();
        if let Some(action) = self.history.end() {
            if self.suspended == 0 {
                tracing::debug!("Recorded {:?} ({} changes)", action.title, action.change_count());
                self.history.commit(action);
            }
        }
        self.flush_events();
    }

    fn abort(&mut self) {
        let mark = self.event_marks.pop().unwrap_or(0);
        if let Some(partial) = self.history.cancel() {
            if let Err(err) = self.replay(&partial, false) {
                panic!("rollback of {:?} failed: {err}", partial.title);
            }
        }
        self.pending.truncate(mark);
    }

    /// Apply a change and record it in the innermost bracket
    fn apply(&mut self, change: Change) -> Result<()> {
        self.perform(&change, true)?;
        let title = self.history.recording_title().unwrap_or_default().to_string();
        tracing::debug!("{} in {title:?}", change.action_type());
        if let Some(action) = self.history.record(Action::primitive(title, change)) {
            if self.suspended == 0 {
                self.history.commit(action);
            }
            self.flush_events();
        }
        Ok(())
    }

    fn replay(&mut self, action: &Action, forward: bool) -> Result<()> {
        if forward {
            if let Some(change) = &action.change {
                self.perform(change, true)?;
            }
            for sub_action in &action.sub_actions {
                self.replay(sub_action, true)?;
            }
        } else {
            for sub_action in action.sub_actions.iter().rev() {
                self.replay(sub_action, false)?;
            }
            if let Some(change) = &action.change {
                self.perform(change, false)?;
            }
        }
        Ok(())
    }

    fn flush_events(&mut self) {
        if self.history.is_recording() || self.pending.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending);
        for event in &events {
            for observer in &mut self.observers {
                observer.on_event(event, &self.graph);
            }
        }
    }

    /// Apply `change` (or its inverse) to the store without recording it
    fn perform(&mut self, change: &Change, forward: bool) -> Result<()> {
        match change {
            Change::NodeAdded(snapshot) if forward => self.restore_node(snapshot),
            Change::NodeRemoved(snapshot) if !forward => self.restore_node(snapshot),
            Change::NodeAdded(snapshot) | Change::NodeRemoved(snapshot) => self.drop_node(snapshot),
            Change::NodeRenamed { old, new } => {
                let (from, to) = if forward { (old, new) } else { (new, old) };
                let index = self.existing_node(from)?;
                if self.graph.node_index(to).is_some() {
                    return Err(inconsistent(format!("node {to} already exists")));
                }
                self.graph.rename_raw(index, to.clone());
                for owned in 0..self.graph.node_count() {
                    if self.graph.nodes()[owned].owner() == Some(from.as_str()) {
                        self.graph.node_mut(owned).owner = Some(to.clone());
                    }
                }
                self.pending.push(GraphEvent::NodeRenamed {
                    old: from.clone(),
                    new: to.clone(),
                });
                Ok(())
            }
            Change::NodeChanged { node, before, after } => {
                self.set_property_raw(node, if forward { after } else { before })
            }
            Change::LinkAdded { index, source, target } if forward => {
                self.restore_link(*index, source, target)
            }
            Change::LinkRemoved { index, source, target } if !forward => {
                self.restore_link(*index, source, target)
            }
            Change::LinkAdded { index, source, target } | Change::LinkRemoved { index, source, target } => {
                self.drop_link(*index, source, target)
            }
            Change::PinAdded { array, slot, element } if forward => {
                self.restore_element(array, *slot, element)
            }
            Change::PinRemoved { array, slot, element } if !forward => {
                self.restore_element(array, *slot, element)
            }
            Change::PinAdded { array, slot, .. } | Change::PinRemoved { array, slot, .. } => {
                self.drop_element(array, *slot)
            }
            Change::PinChanged { pin, before, after } => {
                let state = if forward { after } else { before };
                let pin_ref = self.existing_pin(pin)?;
                self.graph
                    .set_pin_state_raw(pin_ref, state.default_value.clone(), state.expanded);
                self.pending.push(GraphEvent::PinChanged(pin.clone()));
                Ok(())
            }
            Change::Selection { before, after } => self.select_raw(if forward { after } else { before }),
        }
    }

    fn restore_node(&mut self, snapshot: &NodeSnapshot) -> Result<()> {
        if snapshot.index > self.graph.node_count() {
            return Err(inconsistent(format!(
                "node index {} is past the end",
                snapshot.index
            )));
        }
        if self.graph.node_index(&snapshot.name).is_some() {
            return Err(inconsistent(format!("node {} already exists", snapshot.name)));
        }
        if let Some(parent) = &snapshot.parent {
            self.existing_node(parent)?;
        }

        self.graph.insert_node(snapshot.index, snapshot.to_node());
        if let Some(parent) = &snapshot.parent {
            let parent = self.graph.node_index(parent);
            self.graph.set_parent_raw(snapshot.index, parent);
        }
        self.pending.push(GraphEvent::NodeAdded(snapshot.name.clone()));
        Ok(())
    }

    fn drop_node(&mut self, snapshot: &NodeSnapshot) -> Result<()> {
        let index = self.existing_node(&snapshot.name)?;
        if index != snapshot.index {
            return Err(inconsistent(format!(
                "node {} is at index {index}, expected {}",
                snapshot.name, snapshot.index
            )));
        }
        if self.graph.links().iter().any(|link| link.involves_node(index)) {
            return Err(inconsistent(format!("node {} still has links", snapshot.name)));
        }
        if self.graph.nodes().iter().any(|node| node.parent() == Some(index)) {
            return Err(inconsistent(format!("node {} still has children", snapshot.name)));
        }

        self.graph.remove_node_at(index);
        self.pending.push(GraphEvent::NodeRemoved(snapshot.name.clone()));
        Ok(())
    }

    fn set_property_raw(&mut self, node: &str, value: &NodeProperty) -> Result<()> {
        let index = self.existing_node(node)?;
        let name = node.to_string();
        let event = match value {
            NodeProperty::Position(position) => {
                self.graph.node_mut(index).position = *position;
                GraphEvent::NodeMoved(name)
            }
            NodeProperty::Size(size) => {
                self.graph.node_mut(index).size = *size;
                GraphEvent::NodeResized(name)
            }
            NodeProperty::Color(color) => {
                self.graph.node_mut(index).color = *color;
                GraphEvent::NodeRecolored(name)
            }
            NodeProperty::Text(text) => {
                self.graph.node_mut(index).text = text.clone();
                GraphEvent::NodeChanged(name)
            }
            NodeProperty::Parent(parent) => {
                let parent = match parent {
                    Some(parent) => Some(self.existing_node(parent)?),
                    None => None,
                };
                self.graph.set_parent_raw(index, parent);
                GraphEvent::NodeChanged(name)
            }
            NodeProperty::Owner(owner) => {
                self.graph.node_mut(index).owner = owner.clone();
                GraphEvent::NodeChanged(name)
            }
        };
        self.pending.push(event);
        Ok(())
    }

    fn restore_link(&mut self, index: usize, source: &str, target: &str) -> Result<()> {
        let source_ref = self.existing_pin(source)?;
        let target_ref = self.existing_pin(target)?;
        if index > self.graph.link_count() {
            return Err(inconsistent(format!("link index {index} is past the end")));
        }
        if self.graph.find_link(source_ref, target_ref).is_some() {
            return Err(inconsistent(format!("link {source} -> {target} already exists")));
        }

        self.graph.insert_link(index, Link::new(source_ref, target_ref));
        self.pending.push(GraphEvent::LinkAdded {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    fn drop_link(&mut self, index: usize, source: &str, target: &str) -> Result<()> {
        let source_ref = self.existing_pin(source)?;
        let target_ref = self.existing_pin(target)?;
        if self.graph.link(index) != Some(&Link::new(source_ref, target_ref)) {
            return Err(inconsistent(format!("link {index} is not {source} -> {target}")));
        }

        self.graph.remove_link_at(index);
        self.pending.push(GraphEvent::LinkRemoved {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    fn restore_element(&mut self, array: &str, slot: usize, element: &PinTemplate) -> Result<()> {
        let array_ref = self.existing_pin(array)?;
        let size = match self.graph.pin(array_ref) {
            Some(pin) if pin.is_array() => pin.children().len(),
            _ => return Err(inconsistent(format!("{array} is not an array"))),
        };
        if slot > size {
            return Err(inconsistent(format!("{array} has no slot {slot}")));
        }

        let root = self
            .graph
            .insert_pin_subtree(array_ref.node, array_ref.pin, slot, element.clone());
        let path = self.graph.pin_path(PinRef::new(array_ref.node, root), true);
        self.pending.push(GraphEvent::PinAdded(path));
        Ok(())
    }

    fn drop_element(&mut self, array: &str, slot: usize) -> Result<()> {
        let array_ref = self.existing_pin(array)?;
        let child = match self.graph.pin(array_ref) {
            Some(pin) if pin.is_array() => pin.children().get(slot).copied(),
            _ => None,
        }
        .ok_or_else(|| inconsistent(format!("{array} has no element {slot}")))?;

        let element = PinRef::new(array_ref.node, child);
        if !self.subtree_links(element).is_empty() {
            return Err(inconsistent(format!("{array}.{slot} still has links")));
        }
        let path = self.graph.pin_path(element, true);
        self.graph.remove_pin_subtree(element);
        self.pending.push(GraphEvent::PinRemoved(path));
        Ok(())
    }

    fn select_raw(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            self.existing_node(name)?;
        }
        for index in 0..self.graph.node_count() {
            let node = self.graph.node_mut(index);
            let selected = names.contains(&node.name);
            if node.selected != selected {
                node.selected = selected;
                let name = node.name.clone();
                self.pending.push(if selected {
                    GraphEvent::NodeSelected(name)
                } else {
                    GraphEvent::NodeDeselected(name)
                });
            }
        }
        Ok(())
    }

    fn resolve_node(&self, name: &str) -> Result<usize> {
        self.graph
            .node_index(name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    fn resolve_pin(&self, path: &str) -> Result<PinRef> {
        self.graph
            .find_pin(path)
            .ok_or_else(|| GraphError::PinNotFound(path.to_string()))
    }

    fn existing_node(&self, name: &str) -> Result<usize> {
        self.graph
            .node_index(name)
            .ok_or_else(|| inconsistent(format!("node {name} is missing")))
    }

    fn existing_pin(&self, path: &str) -> Result<PinRef> {
        self.graph
            .find_pin(path)
            .ok_or_else(|| inconsistent(format!("pin {path} is missing")))
    }
}

impl Default for GraphController {
    fn default() -> Self {
        Self::new(Arc::new(standard_registry()), GraphConfig::default())
    }
}

fn inconsistent(message: String) -> GraphError {
    GraphError::Inconsistent(message)
}

/// Whether `value` is a literal of `value_type`; struct literals may name a subset of fields
fn is_valid_literal(value_type: &ValueType, value: &str) -> bool {
    match value_type {
        ValueType::Struct(ty) => split_struct(value).is_some_and(|fields| {
            fields.iter().all(|(name, field_value)| {
                ty.fields
                    .iter()
                    .find(|field| field.name == *name)
                    .is_some_and(|field| is_valid_literal(&field.value_type, field_value))
            })
        }),
        ValueType::Array(element) => split_compound(value)
            .is_some_and(|elements| elements.iter().all(|item| is_valid_literal(element, item))),
        leaf => is_valid_leaf(leaf, value),
    }
}

fn is_valid_leaf(value_type: &ValueType, value: &str) -> bool {
    match value_type {
        ValueType::Primitive(PrimitiveType::Bool) => {
            matches!(value, "True" | "False" | "true" | "false")
        }
        ValueType::Primitive(PrimitiveType::Int) => value.parse::<i64>().is_ok(),
        ValueType::Primitive(PrimitiveType::Float) => value.parse::<f64>().is_ok(),
        ValueType::Opaque(OpaqueType::Quat) => split_struct(value).is_some(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLog;

    fn controller() -> GraphController {
        GraphController::default()
    }

    /// Structural content, ignoring the version counter
    fn shape(graph: &Graph) -> (Vec<crate::node::Node>, Vec<Link>) {
        (graph.nodes().to_vec(), graph.links().to_vec())
    }

    #[test]
    fn test_auto_inserted_entry_is_one_undo_step() {
        let mut c = controller();
        let set = c.add_function_node("SetTranslation", [300.0, 0.0], None).unwrap();
        assert_eq!(set, "SetTranslation");
        assert_eq!(c.graph().node_count(), 2);
        assert_eq!(c.graph().entry_nodes(), vec![1]);
        assert!(c.graph().find_link(
            c.graph().find_pin("BeginExecution.Then").unwrap(),
            c.graph().find_pin("SetTranslation.Execute").unwrap()
        ).is_some());
        assert_eq!(c.graph().nodes()[1].position, [50.0, 0.0]);

        c.add_function_node("PrintFloat", [0.0, 0.0], None).unwrap();
        assert_eq!(c.graph().entry_nodes().len(), 1);

        c.undo().unwrap();
        c.undo().unwrap();
        assert_eq!(c.graph().node_count(), 0);
        assert!(!c.can_undo());
    }

    #[test]
    fn test_make_link_replaces_existing_input() {
        // Whole-struct link replaces the link into its X child
        let mut c = controller();
        c.add_function_node("MakeVector", [0.0, 0.0], Some("A")).unwrap();
        c.add_function_node("SetTranslation", [0.0, 0.0], Some("S")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("F")).unwrap();
        c.make_link("F.Result", "S.Value.X").unwrap();
        let before = shape(c.graph());
        c.make_link("A.Result", "S.Value").unwrap();
        assert_eq!(c.graph().link_count(), 2);
        let x = c.graph().find_pin("S.Value.X").unwrap();
        assert!(c.graph().pin(x).unwrap().links().is_empty());

        c.undo().unwrap();
        assert_eq!(shape(c.graph()), before);
    }

    #[test]
    fn test_link_rejections() {
        let mut c = controller();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("A")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("B")).unwrap();
        c.add_function_node("MakeVector", [0.0, 0.0], Some("V")).unwrap();
        c.add_function_node("SetTranslation", [0.0, 0.0], Some("S")).unwrap();
        c.add_parameter_node("Bone", ValueType::name(), ParameterDirection::Input, Some("Hip"), [0.0, 0.0])
            .unwrap();

        let reason = |result: Result<()>| match result {
            Err(GraphError::LinkRejected { reason, .. }) => reason,
            other => panic!("expected rejection, got {other:?}"),
        };
        assert_eq!(reason(c.can_link("A.Result", "A.A")), LinkRejection::SameNode);
        assert_eq!(reason(c.can_link("A.Result", "B.Result")), LinkRejection::SameDirection);
        assert_eq!(reason(c.can_link("A.A", "B.Result")), LinkRejection::SourceNotOutput);
        assert!(matches!(
            reason(c.can_link("V.Result", "A.A")),
            LinkRejection::IncompatibleTypes { .. }
        ));
        assert_eq!(reason(c.can_link("Bone.Value", "S.Item")), LinkRejection::ConstantTarget);

        c.make_link("A.Result", "B.A").unwrap();
        assert_eq!(reason(c.can_link("A.Result", "B.A")), LinkRejection::Duplicate);
        assert_eq!(reason(c.can_link("B.Result", "A.B")), LinkRejection::Cycle);

        c.prepare_cycle_checking("A.B").unwrap();
        assert_eq!(reason(c.can_link("B.Result", "A.B")), LinkRejection::Cycle);
        c.reset_cycle_check();
        assert!(matches!(c.can_link("X.Result", "A.B"), Err(GraphError::PinNotFound(_))));
    }

    #[test]
    fn test_remove_node_undo_restores_indices() {
        let mut c = controller();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("A")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("B")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("C")).unwrap();
        c.make_link("A.Result", "B.A").unwrap();
        c.make_link("B.Result", "C.A").unwrap();
        c.make_link("A.Result", "C.B").unwrap();
        c.set_node_parent("C", Some("B")).unwrap();
        let before = shape(c.graph());

        c.remove_node("B").unwrap();
        assert_eq!(c.graph().node_count(), 2);
        assert_eq!(c.graph().link_count(), 1);
        assert_eq!(c.graph().node_by_name("C").unwrap().parent(), None);
        assert_eq!(c.graph().validate(), Ok(()));

        c.undo().unwrap();
        assert_eq!(shape(c.graph()), before);

        c.redo().unwrap();
        assert_eq!(c.graph().node_count(), 2);
        assert_eq!(c.undo_title(), Some("Remove B"));
    }

    #[test]
    fn test_remove_node_takes_its_entry() {
        let mut c = controller();
        c.add_function_node("PrintFloat", [0.0, 0.0], Some("P")).unwrap();
        assert_eq!(c.graph().nodes()[1].owner(), Some("P"));
        let before = shape(c.graph());

        c.remove_node("P").unwrap();
        assert_eq!(c.graph().node_count(), 0);
        assert_eq!(c.undo_title(), Some("Remove P"));
        c.undo().unwrap();
        assert_eq!(shape(c.graph()), before);

        // An entry that still drives other nodes stays and is released
        c.rename_node("P", "Log").unwrap();
        assert_eq!(c.graph().node_by_name("BeginExecution").unwrap().owner(), Some("Log"));
        c.add_function_node("PrintFloat", [0.0, 0.0], Some("Q")).unwrap();
        c.make_link("BeginExecution.Then", "Q.Execute").unwrap();
        c.remove_node("Log").unwrap();
        assert_eq!(c.graph().node_count(), 2);
        assert_eq!(c.graph().node_by_name("BeginExecution").unwrap().owner(), None);
        assert_eq!(c.graph().validate(), Ok(()));

        c.undo().unwrap();
        assert_eq!(c.graph().node_by_name("BeginExecution").unwrap().owner(), Some("Log"));
    }

    #[test]
    fn test_rename_uniques_and_sanitizes() {
        let mut c = controller();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("A")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("B")).unwrap();
        assert_eq!(c.rename_node("B", "A").unwrap(), "A_1");
        assert_eq!(c.rename_node("A_1", "my node").unwrap(), "my_node");
        assert_eq!(c.rename_node("my_node", "my node").unwrap(), "my_node");
        assert!(matches!(c.rename_node("my_node", " "), Err(GraphError::InvalidName(_))));
        assert!(c.graph().find_pin("my_node.Result").is_some());
    }

    #[test]
    fn test_hierarchy_cycle_rejected() {
        let mut c = controller();
        for name in ["Root", "Arm", "Hand"] {
            c.add_comment_node(name, [0.0, 0.0], [10.0, 10.0]).unwrap();
        }
        c.set_node_space("Comment_1", Some("Comment")).unwrap();
        c.set_node_space("Comment_2", Some("Comment_1")).unwrap();
        assert!(matches!(
            c.set_node_parent("Comment", Some("Comment_2")),
            Err(GraphError::HierarchyCycle { .. })
        ));
        assert_eq!(c.graph().node_by_name("Comment_2").unwrap().parent(), Some(1));
    }

    #[test]
    fn test_compound_default_distributes_and_resizes() {
        let mut c = controller();
        c.add_function_node("ArraySum", [0.0, 0.0], Some("Sum")).unwrap();
        let values = c.graph().find_pin("Sum.Values").unwrap();
        assert_eq!(c.graph().pin_default_value(values), "(0.0,0.0)");

        c.set_pin_default_value("Sum.Values", "(1.0,2.0,3.0)").unwrap();
        let values = c.graph().find_pin("Sum.Values").unwrap();
        assert_eq!(c.graph().pin(values).unwrap().array_size(), Some(3));
        assert_eq!(c.graph().pin_default_value(values), "(1.0,2.0,3.0)");

        c.undo().unwrap();
        assert_eq!(c.graph().pin_default_value(values), "(0.0,0.0)");
        assert_eq!(c.redo_title(), Some("Set Sum.Values"));
    }

    #[test]
    fn test_failed_mutation_rolls_back() {
        let mut c = controller();
        c.add_function_node("MakeVector", [0.0, 0.0], Some("V")).unwrap();
        c.add_function_node("SetTranslation", [0.0, 0.0], Some("S")).unwrap();
        let log = EventLog::new();
        c.subscribe(log.clone());
        let depth = c.history().undo_depth();
        let before = shape(c.graph());

        let result = c.set_pin_default_value("S.Value", "(X=5.0,Q=1.0)");
        assert!(matches!(result, Err(GraphError::InvalidDefault { .. })));
        assert_eq!(shape(c.graph()), before);
        assert_eq!(c.history().undo_depth(), depth);
        assert!(log.is_empty());

        assert!(c.set_pin_default_value("S.Value.X", "heavy").is_err());
        assert!(c.set_pin_default_value("S.Value.X", "0.5").is_ok());
        assert_eq!(log.take(), vec![GraphEvent::PinChanged("S.Value.X".to_string())]);
    }

    #[test]
    fn test_element_and_parameter_defaults_are_checked() {
        let mut c = controller();
        c.add_function_node("ArraySum", [0.0, 0.0], Some("S")).unwrap();
        let depth = c.history().undo_depth();
        let before = shape(c.graph());

        let invalid = |result: Result<()>| matches!(result, Err(GraphError::InvalidDefault { .. }));
        assert!(invalid(c.set_pin_array_size("S.Values", 3, Some("banana")).map(drop)));
        assert!(invalid(c.insert_array_pin("S.Values", 0, Some("banana")).map(drop)));
        assert!(invalid(c.add_array_pin("S.Values", Some("(1.0)")).map(drop)));
        assert_eq!(shape(c.graph()), before);
        assert_eq!(c.history().undo_depth(), depth);

        assert!(c.set_pin_array_size("S.Values", 3, Some("4.5")).unwrap());
        let values = c.graph().find_pin("S.Values").unwrap();
        assert_eq!(c.graph().pin_default_value(values), "(0.0,0.0,4.5)");

        let mut add = |value_type: ValueType, default: &str| {
            c.add_parameter_node("P", value_type, ParameterDirection::Input, Some(default), [0.0, 0.0])
        };
        assert!(invalid(add(ValueType::float(), "banana").map(drop)));
        assert!(invalid(add(ValueType::vector(), "(X=1.0,W=2.0)").map(drop)));
        assert!(invalid(add(ValueType::vector(), "1.0").map(drop)));
        assert_eq!(add(ValueType::vector(), "(Y=2.0)").unwrap(), "P");
        assert_eq!(c.graph().node_count(), 2);
        let value = c.graph().find_pin("P.Value").unwrap();
        assert_eq!(c.graph().pin_default_value(value), "(X=0.0,Y=2.0,Z=0.0)");
    }

    #[test]
    fn test_array_elements_insert_and_remove() {
        let mut c = controller();
        c.add_function_node("ArraySum", [0.0, 0.0], Some("Sum")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("F")).unwrap();
        c.set_pin_default_value("Sum.Values", "(1.0,2.0)").unwrap();

        let path = c.insert_array_pin("Sum.Values", 1, Some("7.0")).unwrap();
        assert_eq!(path, "Sum.Values.1");
        let values = c.graph().find_pin("Sum.Values").unwrap();
        assert_eq!(c.graph().pin_default_value(values), "(1.0,7.0,2.0)");

        assert_eq!(c.add_array_pin("Sum.Values", None).unwrap(), "Sum.Values.3");
        assert_eq!(c.graph().pin_default_value(values), "(1.0,7.0,2.0,2.0)");

        c.make_link("F.Result", "Sum.Values.2").unwrap();
        c.remove_array_pin("Sum.Values.2").unwrap();
        assert_eq!(c.graph().link_count(), 0);
        assert_eq!(c.graph().pin_default_value(values), "(1.0,7.0,2.0)");

        c.undo().unwrap();
        assert_eq!(c.graph().link_count(), 1);
        assert_eq!(c.graph().links()[0].target, c.graph().find_pin("Sum.Values.2").unwrap());

        assert!(matches!(
            c.insert_array_pin("Sum.Values", 9, None),
            Err(GraphError::ArrayIndexOutOfRange { size: 4, .. })
        ));
        assert!(matches!(c.add_array_pin("F.A", None), Err(GraphError::NotAnArray(_))));
    }

    #[test]
    fn test_grouped_action_and_cancel() {
        let mut c = controller();
        let log = EventLog::new();
        c.subscribe(log.clone());

        c.begin_action(ActionType::NodeAdded, "Add pair");
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("A")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("B")).unwrap();
        c.make_link("A.Result", "B.A").unwrap();
        assert!(log.is_empty());
        c.end_action().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(c.undo_title(), Some("Add pair"));

        c.begin_action(ActionType::NodeRemoved, "Scratch");
        c.remove_node("A").unwrap();
        c.cancel_action().unwrap();
        assert_eq!(c.graph().node_count(), 2);
        assert_eq!(c.graph().link_count(), 1);
        assert_eq!(c.undo_title(), Some("Add pair"));
        assert_eq!(log.len(), 3);
        assert!(matches!(c.end_action(), Err(GraphError::NoOpenAction)));

        c.undo().unwrap();
        assert_eq!(c.graph().node_count(), 0);
        assert_eq!(c.redo_title(), Some("Add pair"));
    }

    #[test]
    fn test_selection_is_undoable() {
        let mut c = controller();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("A")).unwrap();
        c.add_function_node("FloatAdd", [0.0, 0.0], Some("B")).unwrap();
        c.select_node("B", true).unwrap();
        c.select_node("A", true).unwrap();
        assert_eq!(c.graph().selection(), vec!["A", "B"]);

        c.clear_selection().unwrap();
        assert!(c.graph().selection().is_empty());
        c.undo().unwrap();
        assert_eq!(c.graph().selection(), vec!["A", "B"]);
    }

    #[test]
    fn test_cosmetic_changes() {
        let mut c = controller();
        c.add_comment_node("note", [0.0, 0.0], [100.0, 50.0]).unwrap();
        c.set_node_position("Comment", [5.0, 5.0]).unwrap();
        c.set_node_size("Comment", [10.0, 10.0]).unwrap();
        c.set_node_color("Comment", Some([255, 0, 0])).unwrap();
        c.set_node_text("Comment", "changed").unwrap();
        let depth = c.history().undo_depth();
        c.set_node_text("Comment", "changed").unwrap();
        assert_eq!(c.history().undo_depth(), depth);

        for _ in 0..4 {
            c.undo().unwrap();
        }
        let node = c.graph().node_by_name("Comment").unwrap();
        assert_eq!(node.position, [0.0, 0.0]);
        assert_eq!(node.size, [100.0, 50.0]);
        assert_eq!(node.color, None);
        assert_eq!(node.text, "note");
    }

    #[test]
    fn test_undo_depth_is_bounded() {
        let config = GraphConfig {
            max_undo_depth: 2,
            ..GraphConfig::default()
        };
        let mut c = GraphController::new(Arc::new(standard_registry()), config);
        for i in 0..4 {
            c.add_comment_node(&i.to_string(), [0.0, 0.0], [1.0, 1.0]).unwrap();
        }
        c.undo().unwrap();
        c.undo().unwrap();
        assert!(matches!(c.undo(), Err(HistoryError::NothingToUndo)));
        assert_eq!(c.graph().node_count(), 2);
    }

    #[test]
    fn test_desync_stops_and_drops_action() {
        let mut source = controller();
        source.add_function_node("FloatAdd", [0.0, 0.0], Some("A")).unwrap();
        let session = source.history().snapshot_ron().unwrap();

        let mut c = controller();
        c.history_mut().restore_ron(&session).unwrap();
        assert!(matches!(c.undo(), Err(HistoryError::Desync { .. })));
        assert!(!c.can_undo());
        assert!(!c.can_redo());
    }

    #[test]
    fn test_without_undo_records_nothing() {
        let mut c = controller();
        c.without_undo(|c| c.add_function_node("FloatAdd", [0.0, 0.0], None))
            .unwrap();
        assert_eq!(c.graph().node_count(), 1);
        assert!(!c.can_undo());
    }

    #[test]
    fn test_events_flush_after_outermost_mutation() {
        let mut c = controller();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        c.subscribe(move |event: &GraphEvent, graph: &Graph| {
            sink.lock().push((event.clone(), graph.node_count()));
        });

        c.add_function_node("PrintFloat", [0.0, 0.0], Some("P")).unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, count)| *count == 2));
        assert_eq!(seen[0].0, GraphEvent::NodeAdded("P".to_string()));
        assert_eq!(seen[1].0, GraphEvent::NodeAdded("BeginExecution".to_string()));
        assert!(matches!(seen[2].0, GraphEvent::LinkAdded { .. }));
    }
}
