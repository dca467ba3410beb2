//! # Operations
//!
//! An [`Edit`] is a data-only record of one structural change, addressed by
//! paths rather than state handles. Every edit has an exact inverse, so the
//! undo stack only ever stores edits and replays them.
//!
//! ```text
//! OperationGroup
//!   ├─ Operation { edit, nested }   redo: in order
//!   ├─ Operation { edit, nested }   undo: inverted, in reverse order
//!   └─ refresh (optional)           runs last in both directions
//! ```

use crate::errors::{ControllerError, ControllerResult};
use crate::index::Slot;
use crate::path::{InnerPath, NodePath};
use frond_ast::{Block, Leaf, Node, ReplicationStatus};
use serde::{Deserialize, Serialize};

/// Replication, pattern and source of a block, without its members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(default)]
    pub replication: ReplicationStatus,
    pub pattern: Node,
    pub source: Node,
}

impl BlockHeader {
    pub fn of(block: &Block) -> Self {
        Self {
            replication: block.replication,
            pattern: block.pattern.clone(),
            source: block.source.clone(),
        }
    }

    pub fn with_nodes(self, nodes: Vec<Node>) -> Block {
        Block {
            replication: self.replication,
            pattern: self.pattern,
            source: self.source,
            nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Edit {
    /// Insert `node` into a list or an existing block
    Insert {
        inner: InnerPath,
        slot: Slot,
        node: Node,
    },

    /// Remove `node` from a list or from a block that keeps other members
    Remove {
        inner: InnerPath,
        slot: Slot,
        node: Node,
    },

    /// Swap the node at `slot` for another one
    Replace {
        inner: InnerPath,
        slot: Slot,
        before: Node,
        after: Node,
    },

    /// Move a list or block member by `delta` positions
    Move {
        inner: InnerPath,
        slot: Slot,
        delta: isize,
    },

    /// Give an unassigned optional the node `after`; `before` is the item it
    /// retained while unassigned
    Assign {
        inner: InnerPath,
        before: Option<Node>,
        after: Node,
    },

    /// Unassign the optional holding `item`, leaving `restore` retained
    Unassign {
        inner: InnerPath,
        item: Node,
        restore: Option<Node>,
    },

    InsertBlock {
        inner: InnerPath,
        block: usize,
        content: Block,
    },

    RemoveBlock {
        inner: InnerPath,
        block: usize,
        content: Block,
    },

    /// Members from `position` on move into a new block with `header`
    SplitBlock {
        inner: InnerPath,
        block: usize,
        position: usize,
        header: BlockHeader,
    },

    /// Append the following block, whose header was `header`; `position`
    /// is the member count of `block` before the merge
    MergeBlocks {
        inner: InnerPath,
        block: usize,
        position: usize,
        header: BlockHeader,
    },

    MoveBlock {
        inner: InnerPath,
        block: usize,
        delta: isize,
    },

    ChangeReplication {
        inner: InnerPath,
        block: usize,
        before: ReplicationStatus,
        after: ReplicationStatus,
    },

    SetValue {
        owner: NodePath,
        property: String,
        before: Leaf,
        after: Leaf,
    },
}

impl Edit {
    /// Edit that undoes this one
    pub fn invert(&self) -> Edit {
        match self.clone() {
            Edit::Insert { inner, slot, node } => Edit::Remove { inner, slot, node },
            Edit::Remove { inner, slot, node } => Edit::Insert { inner, slot, node },
            Edit::Replace {
                inner,
                slot,
                before,
                after,
            } => Edit::Replace {
                inner,
                slot,
                before: after,
                after: before,
            },
            Edit::Move { inner, slot, delta } => {
                let target = slot
                    .position()
                    .map(|position| (position as isize + delta).max(0) as usize)
                    .map(|position| slot.at(position))
                    .unwrap_or(slot);
                Edit::Move {
                    inner,
                    slot: target,
                    delta: -delta,
                }
            }
            Edit::Assign {
                inner,
                before,
                after,
            } => Edit::Unassign {
                inner,
                item: after,
                restore: before,
            },
            Edit::Unassign {
                inner,
                item,
                restore,
            } => Edit::Assign {
                inner,
                before: restore,
                after: item,
            },
            Edit::InsertBlock {
                inner,
                block,
                content,
            } => Edit::RemoveBlock {
                inner,
                block,
                content,
            },
            Edit::RemoveBlock {
                inner,
                block,
                content,
            } => Edit::InsertBlock {
                inner,
                block,
                content,
            },
            Edit::SplitBlock {
                inner,
                block,
                position,
                header,
            } => Edit::MergeBlocks {
                inner,
                block,
                position,
                header,
            },
            Edit::MergeBlocks {
                inner,
                block,
                position,
                header,
            } => Edit::SplitBlock {
                inner,
                block,
                position,
                header,
            },
            Edit::MoveBlock {
                inner,
                block,
                delta,
            } => Edit::MoveBlock {
                inner,
                block: (block as isize + delta).max(0) as usize,
                delta: -delta,
            },
            Edit::ChangeReplication {
                inner,
                block,
                before,
                after,
            } => Edit::ChangeReplication {
                inner,
                block,
                before: after,
                after: before,
            },
            Edit::SetValue {
                owner,
                property,
                before,
                after,
            } => Edit::SetValue {
                owner,
                property,
                before: after,
                after: before,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Edit::Insert { .. } => "insert",
            Edit::Remove { .. } => "remove",
            Edit::Replace { .. } => "replace",
            Edit::Move { .. } => "move",
            Edit::Assign { .. } => "assign",
            Edit::Unassign { .. } => "unassign",
            Edit::InsertBlock { .. } => "insert_block",
            Edit::RemoveBlock { .. } => "remove_block",
            Edit::SplitBlock { .. } => "split_block",
            Edit::MergeBlocks { .. } => "merge_blocks",
            Edit::MoveBlock { .. } => "move_block",
            Edit::ChangeReplication { .. } => "change_replication",
            Edit::SetValue { .. } => "set_value",
        }
    }
}

/// Trailing notification of a group: re-announce `target` once every edit ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refresh {
    pub target: NodePath,
}

impl Refresh {
    pub fn new(target: NodePath) -> Self {
        Self { target }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub edit: Edit,

    /// Part of a group with more than one operation
    pub nested: bool,
}

/// Non-empty, atomically applied list of operations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationGroup {
    operations: Vec<Operation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<Refresh>,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl OperationGroup {
    pub fn new(edits: Vec<Edit>) -> ControllerResult<Self> {
        if edits.is_empty() {
            return Err(ControllerError::EmptyOperationGroup);
        }

        let nested = edits.len() > 1;
        Ok(Self {
            operations: edits
                .into_iter()
                .map(|edit| Operation { edit, nested })
                .collect(),
            refresh: None,
            description: None,
        })
    }

    pub fn single(edit: Edit) -> Self {
        Self {
            operations: vec![Operation {
                edit,
                nested: false,
            }],
            refresh: None,
            description: None,
        }
    }

    pub fn with_refresh(mut self, refresh: Option<Refresh>) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn refresh(&self) -> Option<&Refresh> {
        self.refresh.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Edits to run for redo, in application order
    pub fn redo_edits(&self) -> Vec<Edit> {
        self.operations.iter().map(|op| op.edit.clone()).collect()
    }

    /// Inverse edits to run for undo, last operation first
    pub fn undo_edits(&self) -> Vec<Edit> {
        self.operations
            .iter()
            .rev()
            .map(|op| op.edit.invert())
            .collect()
    }
}
