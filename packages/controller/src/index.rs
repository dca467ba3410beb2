//! # Indices
//!
//! An index names one child slot of a parent state: the parent's handle,
//! the property name and, for collections, the position(s) in it.
//!
//! - [`BrowsingIndex`] locates a slot that exists now. Every live state is
//!   registered under exactly one browsing index.
//! - [`InsertionIndex`] describes a slot that an insertion will create,
//!   together with the node to put there. Once the insertion commits it is
//!   converted into the browsing index of the new state.
//!
//! Indices are values: shifting siblings never mutates an index, the
//! controller re-registers the shifted states under new ones.

use crate::arena::StateId;
use frond_ast::{Node, ReplicationStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a child inside the property that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Slot {
    Placeholder,
    Optional,
    List(usize),
    Block { block: usize, position: usize },
}

impl Slot {
    pub fn position(&self) -> Option<usize> {
        match self {
            Slot::List(position) | Slot::Block { position, .. } => Some(*position),
            Slot::Placeholder | Slot::Optional => None,
        }
    }

    pub fn block(&self) -> Option<usize> {
        match self {
            Slot::Block { block, .. } => Some(*block),
            _ => None,
        }
    }

    /// Same slot moved to another position in its list or block
    pub fn at(&self, position: usize) -> Slot {
        match self {
            Slot::List(_) => Slot::List(position),
            Slot::Block { block, .. } => Slot::Block {
                block: *block,
                position,
            },
            other => *other,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Placeholder => Ok(()),
            Slot::Optional => write!(f, "?"),
            Slot::List(position) => write!(f, "[{}]", position),
            Slot::Block { block, position } => write!(f, "[{}:{}]", block, position),
        }
    }
}

/// Owner state and property of an inner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InnerRef {
    pub owner: StateId,
    pub property: String,
}

impl InnerRef {
    pub fn new(owner: StateId, property: impl Into<String>) -> Self {
        Self {
            owner,
            property: property.into(),
        }
    }
}

/// Locator of an existing child slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BrowsingIndex {
    Root,
    Placeholder {
        parent: StateId,
        property: String,
    },
    Optional {
        parent: StateId,
        property: String,
    },
    List {
        parent: StateId,
        property: String,
        position: usize,
    },
    Block {
        parent: StateId,
        property: String,
        block: usize,
        position: usize,
    },
}

impl BrowsingIndex {
    pub fn new(parent: StateId, property: impl Into<String>, slot: Slot) -> Self {
        let property = property.into();
        match slot {
            Slot::Placeholder => BrowsingIndex::Placeholder { parent, property },
            Slot::Optional => BrowsingIndex::Optional { parent, property },
            Slot::List(position) => BrowsingIndex::List {
                parent,
                property,
                position,
            },
            Slot::Block { block, position } => BrowsingIndex::Block {
                parent,
                property,
                block,
                position,
            },
        }
    }

    pub fn parent(&self) -> Option<StateId> {
        match self {
            BrowsingIndex::Root => None,
            BrowsingIndex::Placeholder { parent, .. }
            | BrowsingIndex::Optional { parent, .. }
            | BrowsingIndex::List { parent, .. }
            | BrowsingIndex::Block { parent, .. } => Some(*parent),
        }
    }

    pub fn property(&self) -> Option<&str> {
        match self {
            BrowsingIndex::Root => None,
            BrowsingIndex::Placeholder { property, .. }
            | BrowsingIndex::Optional { property, .. }
            | BrowsingIndex::List { property, .. }
            | BrowsingIndex::Block { property, .. } => Some(property),
        }
    }

    pub fn slot(&self) -> Option<Slot> {
        match self {
            BrowsingIndex::Root => None,
            BrowsingIndex::Placeholder { .. } => Some(Slot::Placeholder),
            BrowsingIndex::Optional { .. } => Some(Slot::Optional),
            BrowsingIndex::List { position, .. } => Some(Slot::List(*position)),
            BrowsingIndex::Block {
                block, position, ..
            } => Some(Slot::Block {
                block: *block,
                position: *position,
            }),
        }
    }

    /// Inner that owns the indexed slot
    pub fn inner(&self) -> Option<InnerRef> {
        match (self.parent(), self.property()) {
            (Some(owner), Some(property)) => Some(InnerRef::new(owner, property)),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, BrowsingIndex::Root)
    }
}

impl fmt::Display for BrowsingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.parent(), self.property(), self.slot()) {
            (Some(parent), Some(property), Some(slot)) => {
                write!(f, "{}.{}{}", parent, property, slot)
            }
            _ => write!(f, "root"),
        }
    }
}

/// Locator of a slot an insertion will create, carrying the inserted node
#[derive(Debug, Clone, PartialEq)]
pub enum InsertionIndex {
    List {
        parent: StateId,
        property: String,
        position: usize,
        node: Node,
    },
    ExistingBlock {
        parent: StateId,
        property: String,
        block: usize,
        position: usize,
        node: Node,
    },
    NewBlock {
        parent: StateId,
        property: String,
        block: usize,
        replication: ReplicationStatus,
        pattern: Node,
        source: Node,
        node: Node,
    },
}

impl InsertionIndex {
    pub fn list(parent: StateId, property: impl Into<String>, position: usize, node: Node) -> Self {
        InsertionIndex::List {
            parent,
            property: property.into(),
            position,
            node,
        }
    }

    pub fn existing_block(
        parent: StateId,
        property: impl Into<String>,
        block: usize,
        position: usize,
        node: Node,
    ) -> Self {
        InsertionIndex::ExistingBlock {
            parent,
            property: property.into(),
            block,
            position,
            node,
        }
    }

    pub fn parent(&self) -> StateId {
        match self {
            InsertionIndex::List { parent, .. }
            | InsertionIndex::ExistingBlock { parent, .. }
            | InsertionIndex::NewBlock { parent, .. } => *parent,
        }
    }

    pub fn property(&self) -> &str {
        match self {
            InsertionIndex::List { property, .. }
            | InsertionIndex::ExistingBlock { property, .. }
            | InsertionIndex::NewBlock { property, .. } => property,
        }
    }

    pub fn node(&self) -> &Node {
        match self {
            InsertionIndex::List { node, .. }
            | InsertionIndex::ExistingBlock { node, .. }
            | InsertionIndex::NewBlock { node, .. } => node,
        }
    }

    pub fn inner(&self) -> InnerRef {
        InnerRef::new(self.parent(), self.property())
    }

    pub fn slot(&self) -> Slot {
        match self {
            InsertionIndex::List { position, .. } => Slot::List(*position),
            InsertionIndex::ExistingBlock {
                block, position, ..
            } => Slot::Block {
                block: *block,
                position: *position,
            },
            InsertionIndex::NewBlock { block, .. } => Slot::Block {
                block: *block,
                position: 0,
            },
        }
    }

    /// Browsing index of the inserted node once the insertion is done
    pub fn to_browsing(&self) -> BrowsingIndex {
        BrowsingIndex::new(self.parent(), self.property(), self.slot())
    }
}
