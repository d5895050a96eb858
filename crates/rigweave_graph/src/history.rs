// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo stacks and action bracket recording.
//!
//! The stack only stores actions; applying them is the controller's job.
//! Entries older than the configured depth are cleared in place rather
//! than shifted out, so stack positions stay stable.

use crate::action::{Action, ActionType};
use crate::config::DEFAULT_MAX_UNDO_DEPTH;
use crate::error::HistoryError;
use serde::{Deserialize, Serialize};

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// History statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Live actions in the undo stack
    pub undo_count: usize,
    /// Actions in the redo stack
    pub redo_count: usize,
    /// Undo entries whose payload was cleared
    pub cleared_count: usize,
    /// Maximum live depth
    pub max_depth: usize,
}

#[derive(Serialize, Deserialize)]
struct StackSnapshot {
    undo: Vec<Action>,
    redo: Vec<Action>,
    first_live: usize,
}

/// Undo/redo history with nested action brackets
#[derive(Debug)]
pub struct ActionStack {
    /// Undo stack, oldest first
    undo_stack: Vec<Action>,
    /// Redo stack, next redo last
    redo_stack: Vec<Action>,
    /// Open brackets, innermost last
    open: Vec<Action>,
    /// Entries below this index have been cleared
    first_live: usize,
    /// Maximum live depth
    max_depth: usize,
}

impl ActionStack {
    /// Create a new history manager
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_UNDO_DEPTH)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            open: Vec::new(),
            first_live: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// Open a bracket; mutations until the matching [`end`](Self::end)
    /// become its sub-actions
    pub fn begin(&mut self, action_type: ActionType, title: impl Into<String>) {
        self.open.push(Action::compound(action_type, title));
    }

    /// Whether a bracket is open
    pub fn is_recording(&self) -> bool {
        !self.open.is_empty()
    }

    /// Number of open brackets
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Title of the innermost open bracket
    pub fn recording_title(&self) -> Option<&str> {
        self.open.last().map(|action| action.title.as_str())
    }

    /// Append a finished action to the innermost bracket.
    ///
    /// Returns the action back when no bracket is open.
    pub fn record(&mut self, action: Action) -> Option<Action> {
        match self.open.last_mut() {
            Some(bracket) => {
                bracket.sub_actions.push(action);
                None
            }
            None => Some(action),
        }
    }

    /// Close the innermost bracket.
    ///
    /// Nested brackets are folded into their parent and `None` is returned.
    /// Closing the outermost bracket returns the finished action (or
    /// `None` if it changed nothing); the caller decides whether to
    /// [`commit`](Self::commit) it. A bracket holding a single primitive
    /// collapses into that primitive under the bracket's title.
    pub fn end(&mut self) -> Option<Action> {
        let mut action = self.open.pop()?;
        if action.is_empty() {
            return None;
        }
        if action.sub_actions.len() == 1 && action.sub_actions[0].sub_actions.is_empty() {
            let mut only = action.sub_actions.remove(0);
            only.title = action.title;
            action = only;
        }
        self.record(action)
    }

    /// Close the innermost bracket without keeping it, returning what it
    /// recorded so the caller can roll it back
    pub fn cancel(&mut self) -> Option<Action> {
        self.open.pop()
    }

    /// Push a finished top-level action and clear the redo stack
    pub fn commit(&mut self, action: Action) {
        if action.is_empty() {
            return;
        }
        self.redo_stack.clear();
        self.undo_stack.push(action);
        self.enforce_limit();
    }

    /// Pop the latest live action for undo
    pub fn pop_undo(&mut self) -> Result<Action> {
        if self.undo_stack.len() <= self.first_live {
            return Err(HistoryError::NothingToUndo);
        }
        self.undo_stack.pop().ok_or(HistoryError::NothingToUndo)
    }

    /// Store an undone action for redo
    pub fn push_redo(&mut self, action: Action) {
        self.redo_stack.push(action);
    }

    /// Pop the latest undone action for redo
    pub fn pop_redo(&mut self) -> Result<Action> {
        self.redo_stack.pop().ok_or(HistoryError::NothingToRedo)
    }

    /// Store a redone action without touching the redo stack
    pub fn push_undo(&mut self, action: Action) {
        self.undo_stack.push(action);
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        while self.undo_stack.len() - self.first_live > self.max_depth {
            self.undo_stack[self.first_live].clear();
            self.first_live += 1;
        }
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > self.first_live
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get undo stack depth, cleared entries included
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get redo stack depth
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Undo stack entries, oldest first
    pub fn undo_actions(&self) -> &[Action] {
        &self.undo_stack
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.first_live = 0;
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len() - self.first_live,
            redo_count: self.redo_stack.len(),
            cleared_count: self.first_live,
            max_depth: self.max_depth,
        }
    }

    /// Get description of next undo operation
    pub fn undo_title(&self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.undo_stack.last().map(|action| action.title.as_str())
    }

    /// Get description of next redo operation
    pub fn redo_title(&self) -> Option<&str> {
        self.redo_stack.last().map(|action| action.title.as_str())
    }

    /// Serialize both stacks for session persistence
    pub fn snapshot_ron(&self) -> Result<String> {
        let snapshot = StackSnapshot {
            undo: self.undo_stack.clone(),
            redo: self.redo_stack.clone(),
            first_live: self.first_live,
        };
        ron::to_string(&snapshot).map_err(|e| HistoryError::Serialization(e.to_string()))
    }

    /// Replace both stacks from a snapshot taken with [`snapshot_ron`](Self::snapshot_ron)
    pub fn restore_ron(&mut self, content: &str) -> Result<()> {
        if self.is_recording() {
            return Err(HistoryError::Recording(
                self.recording_title().unwrap_or_default().to_string(),
            ));
        }
        let snapshot: StackSnapshot =
            ron::from_str(content).map_err(|e| HistoryError::Serialization(e.to_string()))?;
        if snapshot.first_live > snapshot.undo.len() {
            return Err(HistoryError::Serialization(
                "cleared entry count exceeds undo stack".to_string(),
            ));
        }
        self.undo_stack = snapshot.undo;
        self.redo_stack = snapshot.redo;
        self.first_live = snapshot.first_live;
        self.enforce_limit();
        Ok(())
    }
}

impl Default for ActionStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Change;

    fn rename(old: &str, new: &str) -> Action {
        Action::primitive(
            format!("Rename {old}"),
            Change::NodeRenamed {
                old: old.to_string(),
                new: new.to_string(),
            },
        )
    }

    #[test]
    fn test_nested_brackets_fold() {
        let mut stack = ActionStack::new();
        stack.begin(ActionType::NodeAdded, "Add node");
        assert!(stack.record(rename("A", "B")).is_none());
        stack.begin(ActionType::LinkAdded, "Link");
        stack.record(rename("B", "C"));
        stack.record(rename("C", "D"));
        assert!(stack.end().is_none());

        let action = stack.end().unwrap();
        assert_eq!(action.title, "Add node");
        assert_eq!(action.sub_actions.len(), 2);
        assert_eq!(action.sub_actions[1].sub_actions.len(), 2);
        assert_eq!(action.change_count(), 3);
        assert!(!stack.is_recording());
    }

    #[test]
    fn test_single_primitive_collapses() {
        let mut stack = ActionStack::new();
        stack.begin(ActionType::NodeRenamed, "Rename node");
        stack.record(rename("A", "B"));
        let action = stack.end().unwrap();
        assert!(action.sub_actions.is_empty());
        assert_eq!(action.title, "Rename node");
        assert!(action.change.is_some());
    }

    #[test]
    fn test_empty_bracket_is_dropped() {
        let mut stack = ActionStack::new();
        stack.begin(ActionType::NodeChanged, "Nothing");
        assert!(stack.end().is_none());
    }

    #[test]
    fn test_limit_clears_oldest_in_place() {
        let mut stack = ActionStack::with_max_depth(2);
        for i in 0..4 {
            stack.commit(rename(&format!("N{i}"), &format!("M{i}")));
        }
        assert_eq!(stack.undo_depth(), 4);
        assert!(stack.undo_actions()[0].is_invalid());
        assert!(stack.undo_actions()[1].is_invalid());
        assert!(stack.undo_actions()[..2].iter().all(|action| action.title.is_empty()));
        assert_eq!(stack.stats().undo_count, 2);

        assert!(stack.pop_undo().is_ok());
        assert!(stack.pop_undo().is_ok());
        assert!(matches!(stack.pop_undo(), Err(HistoryError::NothingToUndo)));
        assert_eq!(stack.undo_depth(), 2);
    }

    #[test]
    fn test_commit_clears_redo() {
        let mut stack = ActionStack::new();
        stack.commit(rename("A", "B"));
        let action = stack.pop_undo().unwrap();
        stack.push_redo(action);
        assert!(stack.can_redo());
        stack.commit(rename("X", "Y"));
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut stack = ActionStack::with_max_depth(1);
        stack.commit(rename("A", "B"));
        stack.commit(rename("B", "C"));
        let content = stack.snapshot_ron().unwrap();

        let mut restored = ActionStack::with_max_depth(1);
        restored.restore_ron(&content).unwrap();
        assert_eq!(restored.stats(), stack.stats());
        assert_eq!(restored.undo_title(), Some("Rename B"));
    }
}
