//! Node and block states.

use crate::arena::StateId;
use crate::index::{BrowsingIndex, InnerRef};
use crate::inner::Inner;
use frond_ast::{Block, Node, ReplicationStatus};
use indexmap::IndexMap;

/// Lifecycle stage of a node state.
///
/// A removed state has no stage: its arena entry is gone and every handle
/// to it is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Registered, child inners not populated yet
    Created,
    /// Inners populated; the state can be the owner of a mutation
    Initialized,
    /// Optional slot without an assigned node
    Unassigned,
}

/// Live mirror of one AST node (or of an empty optional slot)
#[derive(Debug, Clone)]
pub struct NodeState {
    pub(crate) index: BrowsingIndex,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) inners: IndexMap<String, Inner>,
}

impl NodeState {
    pub(crate) fn new(index: BrowsingIndex) -> Self {
        Self {
            index,
            lifecycle: Lifecycle::Created,
            inners: IndexMap::new(),
        }
    }

    pub fn index(&self) -> &BrowsingIndex {
        &self.index
    }

    /// Inner holding this state, `None` for the root
    pub fn parent_inner(&self) -> Option<InnerRef> {
        self.index.inner()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether child mutations may target this state
    pub fn is_mutable(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub fn inner(&self, property: &str) -> Option<&Inner> {
        self.inners.get(property)
    }

    /// Inners in property declaration order
    pub fn inners(&self) -> impl Iterator<Item = &Inner> {
        self.inners.values()
    }
}

/// One block of a block-list inner
#[derive(Debug, Clone, PartialEq)]
pub struct BlockState {
    pub(crate) replication: ReplicationStatus,
    pub(crate) pattern: Node,
    pub(crate) source: Node,
    pub(crate) members: Vec<StateId>,
}

impl BlockState {
    pub(crate) fn from_block(block: &Block) -> Self {
        Self {
            replication: block.replication,
            pattern: block.pattern.clone(),
            source: block.source.clone(),
            members: Vec::new(),
        }
    }

    pub fn replication(&self) -> ReplicationStatus {
        self.replication
    }

    pub fn pattern(&self) -> &Node {
        &self.pattern
    }

    pub fn source(&self) -> &Node {
        &self.source
    }

    pub fn members(&self) -> &[StateId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
