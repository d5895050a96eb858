// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recorded, reversible graph mutations.
//!
//! A primitive action carries exactly one [`Change`]; a compound action
//! carries none and replays its sub-actions in order (and their inverses
//! in reverse order). Node and pin references are stored by name and path
//! so an action stays meaningful after unrelated indices shift, and link
//! and node indices are stored so undo restores them exactly.

use crate::node::NodeSnapshot;
use crate::pin::PinTemplate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// A node was added
    NodeAdded,
    /// A node was removed
    NodeRemoved,
    /// A node was renamed
    NodeRenamed,
    /// A cosmetic or hierarchy property of a node changed
    NodeChanged,
    /// A link was added
    LinkAdded,
    /// A link was removed
    LinkRemoved,
    /// An array element was added
    PinAdded,
    /// An array element was removed
    PinRemoved,
    /// A pin default or expanded flag changed
    PinChanged,
    /// The node selection changed
    Selection,
    /// Cleared or unknown action
    Invalid,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Node property touched by [`Change::NodeChanged`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeProperty {
    /// Position in the graph UI
    Position([f32; 2]),
    /// Size in the graph UI
    Size([f32; 2]),
    /// Custom color
    Color(Option<[u8; 3]>),
    /// Free text
    Text(String),
    /// Hierarchy parent by name
    Parent(Option<String>),
    /// Owning node by name
    Owner(Option<String>),
}

impl NodeProperty {
    /// Property name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Position(_) => "Position",
            Self::Size(_) => "Size",
            Self::Color(_) => "Color",
            Self::Text(_) => "Text",
            Self::Parent(_) => "Parent",
            Self::Owner(_) => "Owner",
        }
    }

    fn argument(&self) -> String {
        match self {
            Self::Position([x, y]) | Self::Size([x, y]) => format!("({x},{y})"),
            Self::Color(Some([r, g, b])) => format!("({r},{g},{b})"),
            Self::Color(None) | Self::Parent(None) | Self::Owner(None) => "None".to_string(),
            Self::Text(text) => text.clone(),
            Self::Parent(Some(name)) | Self::Owner(Some(name)) => name.clone(),
        }
    }
}

/// Per-pin state restored by [`Change::PinChanged`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    /// Default literal
    pub default_value: String,
    /// Expanded flag
    pub expanded: bool,
}

/// A single primitive state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// Node inserted at `snapshot.index`
    NodeAdded(NodeSnapshot),
    /// Node removed from `snapshot.index`
    NodeRemoved(NodeSnapshot),
    /// Node renamed
    NodeRenamed {
        /// Name before
        old: String,
        /// Name after
        new: String,
    },
    /// Node property changed
    NodeChanged {
        /// Node name
        node: String,
        /// Value before
        before: NodeProperty,
        /// Value after
        after: NodeProperty,
    },
    /// Link inserted at `index`
    LinkAdded {
        /// Link index
        index: usize,
        /// Source pin path
        source: String,
        /// Target pin path
        target: String,
    },
    /// Link removed from `index`
    LinkRemoved {
        /// Link index
        index: usize,
        /// Source pin path
        source: String,
        /// Target pin path
        target: String,
    },
    /// Array element inserted as child `slot`
    PinAdded {
        /// Array pin path
        array: String,
        /// Element position
        slot: usize,
        /// Element subtree
        element: PinTemplate,
    },
    /// Array element removed from child `slot`
    PinRemoved {
        /// Array pin path
        array: String,
        /// Element position
        slot: usize,
        /// Element subtree as it was
        element: PinTemplate,
    },
    /// Pin default / expanded flag changed
    PinChanged {
        /// Pin path
        pin: String,
        /// State before
        before: PinState,
        /// State after
        after: PinState,
    },
    /// Selection replaced
    Selection {
        /// Selected node names before
        before: Vec<String>,
        /// Selected node names after
        after: Vec<String>,
    },
}

impl Change {
    /// Type tag of this change
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::NodeAdded(_) => ActionType::NodeAdded,
            Self::NodeRemoved(_) => ActionType::NodeRemoved,
            Self::NodeRenamed { .. } => ActionType::NodeRenamed,
            Self::NodeChanged { .. } => ActionType::NodeChanged,
            Self::LinkAdded { .. } => ActionType::LinkAdded,
            Self::LinkRemoved { .. } => ActionType::LinkRemoved,
            Self::PinAdded { .. } => ActionType::PinAdded,
            Self::PinRemoved { .. } => ActionType::PinRemoved,
            Self::PinChanged { .. } => ActionType::PinChanged,
            Self::Selection { .. } => ActionType::Selection,
        }
    }

    /// Plain string arguments for persistence
    pub fn arguments(&self) -> Vec<String> {
        match self {
            Self::NodeAdded(snapshot) | Self::NodeRemoved(snapshot) => vec![
                snapshot.index.to_string(),
                snapshot.name.clone(),
                ron::to_string(snapshot).unwrap_or_default(),
            ],
            Self::NodeRenamed { old, new } => vec![old.clone(), new.clone()],
            Self::NodeChanged { node, before, after } => vec![
                node.clone(),
                before.name().to_string(),
                before.argument(),
                after.argument(),
            ],
            Self::LinkAdded { index, source, target } | Self::LinkRemoved { index, source, target } => {
                vec![index.to_string(), source.clone(), target.clone()]
            }
            Self::PinAdded { array, slot, element } | Self::PinRemoved { array, slot, element } => vec![
                array.clone(),
                slot.to_string(),
                ron::to_string(element).unwrap_or_default(),
            ],
            Self::PinChanged { pin, before, after } => vec![
                pin.clone(),
                before.default_value.clone(),
                after.default_value.clone(),
                before.expanded.to_string(),
                after.expanded.to_string(),
            ],
            Self::Selection { before, after } => vec![before.join(","), after.join(",")],
        }
    }
}

/// A recorded mutation, possibly with nested sub-actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Type tag
    pub action_type: ActionType,
    /// Human-readable title
    pub title: String,
    /// Primitive change, `None` for compound actions
    pub change: Option<Change>,
    /// Nested actions in the order they happened
    pub sub_actions: Vec<Action>,
}

impl Action {
    /// Create a primitive action
    pub fn primitive(title: impl Into<String>, change: Change) -> Self {
        Self {
            action_type: change.action_type(),
            title: title.into(),
            change: Some(change),
            sub_actions: Vec::new(),
        }
    }

    /// Create an empty compound action
    pub fn compound(action_type: ActionType, title: impl Into<String>) -> Self {
        Self {
            action_type,
            title: title.into(),
            change: None,
            sub_actions: Vec::new(),
        }
    }

    /// Whether the action has been cleared
    pub fn is_invalid(&self) -> bool {
        self.action_type == ActionType::Invalid
    }

    /// Whether the action changes nothing
    pub fn is_empty(&self) -> bool {
        self.change.is_none() && self.sub_actions.iter().all(Action::is_empty)
    }

    /// Number of primitive changes in this action tree
    pub fn change_count(&self) -> usize {
        usize::from(self.change.is_some())
            + self.sub_actions.iter().map(Action::change_count).sum::<usize>()
    }

    /// Plain string arguments of the primitive change
    pub fn arguments(&self) -> Vec<String> {
        self.change.as_ref().map(Change::arguments).unwrap_or_default()
    }

    /// Drop the payload, keeping the entry as an `Invalid` placeholder
    pub(crate) fn clear(&mut self) {
        self.action_type = ActionType::Invalid;
        self.title = String::new();
        self.change = None;
        self.sub_actions.clear();
    }
}
