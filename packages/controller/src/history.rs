//! # Undo/Redo History
//!
//! Stores committed [`OperationGroup`]s.
//!
//! ## Design
//!
//! - Each command commits one group, or appends to the open batch
//! - Undo pops a group and moves it to the redo stack
//! - Redo moves it back
//! - A newly committed group clears the redo stack
//! - Depth is bounded by `max_levels` (0 = unlimited), oldest dropped first
//!
//! The stack never applies edits itself; the controller does, and only moves
//! a group between stacks once its edits went through.

use crate::errors::{ControllerError, ControllerResult};
use crate::operation::{Edit, OperationGroup, Refresh};

/// Edits collected between `begin_batch` and `end_batch`
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub edits: Vec<Edit>,
    pub refresh: Option<Refresh>,
    pub description: Option<String>,
}

impl Batch {
    /// Group to push on the undo stack, `None` when nothing was recorded
    pub fn into_group(self) -> Option<OperationGroup> {
        OperationGroup::new(self.edits).ok().map(|group| {
            group
                .with_refresh(self.refresh)
                .with_description(self.description)
        })
    }
}

/// Linear undo/redo history of operation groups
#[derive(Debug)]
pub struct UndoStack {
    /// Committed groups (most recent last)
    undo_stack: Vec<OperationGroup>,

    /// Undone groups (most recent last)
    redo_stack: Vec<OperationGroup>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    current_batch: Option<Batch>,
}

impl UndoStack {
    /// Create an undo stack keeping the last 100 groups
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    /// Create an undo stack with a custom depth (0 = unlimited)
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Open a batch; fails if one is already open
    pub fn begin_batch(&mut self, description: Option<String>) -> ControllerResult<()> {
        if self.current_batch.is_some() {
            return Err(ControllerError::BatchInProgress);
        }
        self.current_batch = Some(Batch {
            description,
            ..Batch::default()
        });
        Ok(())
    }

    /// Close the open batch and hand it over
    pub fn take_batch(&mut self) -> ControllerResult<Batch> {
        self.current_batch.take().ok_or(ControllerError::NoBatch)
    }

    /// Open batch, if any
    pub fn batch_mut(&mut self) -> Option<&mut Batch> {
        self.current_batch.as_mut()
    }

    /// Check if a batch is open
    pub fn in_batch(&self) -> bool {
        self.current_batch.is_some()
    }

    /// Record a newly committed group
    pub fn push(&mut self, group: OperationGroup) {
        self.undo_stack.push(group);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // A new edit invalidates the undone future
        self.redo_stack.clear();
    }

    /// Take the most recent group to undo
    pub fn pop_undo(&mut self) -> Option<OperationGroup> {
        self.undo_stack.pop()
    }

    /// Take the most recently undone group to redo
    pub fn pop_redo(&mut self) -> Option<OperationGroup> {
        self.redo_stack.pop()
    }

    /// Put back a group after an undo failed
    pub fn restore_undo(&mut self, group: OperationGroup) {
        self.undo_stack.push(group);
    }

    /// Put back a group after a redo failed
    pub fn restore_redo(&mut self, group: OperationGroup) {
        self.redo_stack.push(group);
    }

    /// Move an undone group to the redo stack
    pub fn push_undone(&mut self, group: OperationGroup) {
        self.redo_stack.push(group);
    }

    /// Move a redone group back to the undo stack, keeping the redo stack
    pub fn push_redone(&mut self, group: OperationGroup) {
        self.undo_stack.push(group);
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of groups that can be undone
    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of groups that can be redone
    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Depth bound (0 = unlimited)
    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Drop all history, including an open batch
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    /// Description of the group `undo` would revert
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().and_then(OperationGroup::description)
    }

    /// Description of the group `redo` would re-apply
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().and_then(OperationGroup::description)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Slot;
    use crate::path::{InnerPath, NodePath};

    fn group(delta: isize) -> OperationGroup {
        OperationGroup::single(Edit::Move {
            inner: InnerPath::new(NodePath::root(), "items"),
            slot: Slot::List(0),
            delta,
        })
    }

    #[test]
    fn test_new_stack_is_empty() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert_eq!(stack.max_levels(), 100);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_new_group_clears_redo() {
        let mut stack = UndoStack::new();
        stack.push(group(1));

        let undone = stack.pop_undo().unwrap();
        stack.push_undone(undone);
        assert_eq!(stack.redo_levels(), 1);

        stack.push(group(2));
        assert_eq!(stack.redo_levels(), 0);
        assert_eq!(stack.undo_levels(), 1);
    }

    #[test]
    fn test_oldest_group_dropped_past_limit() {
        let mut stack = UndoStack::with_max_levels(2);
        for delta in 1..=3 {
            stack.push(group(delta));
        }

        assert_eq!(stack.undo_levels(), 2);
        // Oldest dropped first
        assert_eq!(stack.pop_undo(), Some(group(3)));
        assert_eq!(stack.pop_undo(), Some(group(2)));
    }

    #[test]
    fn test_batch_lifecycle() {
        let mut stack = UndoStack::new();
        stack.begin_batch(Some("Reorder".into())).unwrap();
        assert_eq!(
            stack.begin_batch(None),
            Err(ControllerError::BatchInProgress)
        );

        let batch = stack.take_batch().unwrap();
        assert_eq!(batch.description.as_deref(), Some("Reorder"));
        // Nothing recorded
        assert!(batch.into_group().is_none());

        assert_eq!(stack.take_batch().unwrap_err(), ControllerError::NoBatch);
    }
}
