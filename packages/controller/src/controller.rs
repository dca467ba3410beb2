//! # Controller
//!
//! Root of the state tree. Owns the AST document, the node states mirroring
//! it, the undo history and the observers.
//!
//! Every command follows the same steps:
//!
//! 1. Build an [`Edit`] describing the change
//! 2. Validate every precondition against the current tree
//! 3. Mutate the AST, then the states, publishing events as they change
//! 4. Record the edit as one undoable group (or into the open batch)
//!
//! A rejected edit returns before step 3, so the document, the states, the
//! history and the observers see nothing of it.

use crate::arena::StateId;
use crate::browse::{browse, descend, descend_mut, validate, InnerBrowse};
use crate::config::ControllerConfig;
use crate::errors::{ControllerError, ControllerResult};
use crate::history::UndoStack;
use crate::index::{BrowsingIndex, InnerRef, InsertionIndex, Slot};
use crate::inner::{BlockListInner, Inner};
use crate::observer::{Event, ObserverRegistry};
use crate::operation::{BlockHeader, Edit, OperationGroup, Refresh};
use crate::path::{InnerPath, NodePath, PathStep};
use crate::state::{BlockState, Lifecycle, NodeState};
use crate::tree::StateTree;
use frond_ast::{AstError, AstHelper, Block, Leaf, Node, ReflectHelper, ReplicationStatus};
use tracing::{debug, info, instrument, warn};

pub struct Controller<H: AstHelper = ReflectHelper> {
    helper: H,
    document: Node,
    tree: StateTree,
    root: StateId,
    history: UndoStack,
    config: ControllerConfig,
}

fn slot_mismatch(inner: &Inner, slot: Slot) -> ControllerError {
    ControllerError::invalid_index(format!(
        "slot {:?} does not fit {:?} property `{}`",
        slot,
        inner.kind(),
        inner.property()
    ))
}

fn split_index(index: &BrowsingIndex) -> ControllerResult<(StateId, &str, Slot)> {
    match (index.parent(), index.property(), index.slot()) {
        (Some(parent), Some(property), Some(slot)) => Ok((parent, property, slot)),
        _ => Err(ControllerError::invalid_index("the root has no parent slot")),
    }
}

impl Controller<ReflectHelper> {
    /// Controller over `document` with the reflecting helper and no observers
    pub fn from_document(document: Node) -> ControllerResult<Self> {
        Self::new(document, ReflectHelper, ObserverRegistry::new())
    }
}

impl<H: AstHelper> Controller<H> {
    pub fn new(document: Node, helper: H, observers: ObserverRegistry) -> ControllerResult<Self> {
        Self::with_config(document, helper, observers, ControllerConfig::default())
    }

    #[instrument(skip_all, fields(kind = %document.kind))]
    pub fn with_config(
        document: Node,
        helper: H,
        observers: ObserverRegistry,
        config: ControllerConfig,
    ) -> ControllerResult<Self> {
        validate(&helper, &document)?;

        let mut tree = StateTree::new(observers);
        let root = tree.create(&helper, BrowsingIndex::Root, Some(&document))?;
        info!(states = tree.states.len(), "State tree built");

        Ok(Self {
            helper,
            document,
            tree,
            root,
            history: UndoStack::with_max_levels(config.max_undo_levels),
            config,
        })
    }

    // ---------------------------------------------------------------------
    // Discovery
    // ---------------------------------------------------------------------

    pub fn root(&self) -> StateId {
        self.root
    }

    pub fn document(&self) -> &Node {
        &self.document
    }

    pub fn helper(&self) -> &H {
        &self.helper
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn observers_mut(&mut self) -> &mut ObserverRegistry {
        &mut self.tree.observers
    }

    pub fn state(&self, id: StateId) -> Option<&NodeState> {
        self.tree.get(id)
    }

    /// State registered under `index`
    pub fn state_at(&self, index: &BrowsingIndex) -> Option<StateId> {
        self.tree.index_map.get(index).copied()
    }

    pub fn state_count(&self) -> usize {
        self.tree.states.len()
    }

    /// Live states with their indices, in no particular order
    pub fn states(&self) -> impl Iterator<Item = (StateId, &NodeState)> {
        self.tree.states.iter()
    }

    pub fn inner(&self, owner: StateId, property: &str) -> ControllerResult<&Inner> {
        self.tree.inner(owner, property)
    }

    /// Validated browsing index of an existing slot
    pub fn index(
        &self,
        parent: StateId,
        property: &str,
        slot: Slot,
    ) -> ControllerResult<BrowsingIndex> {
        let inner = self.tree.inner(parent, property)?;
        inner.check_slot(slot).map_err(|err| {
            ControllerError::invalid_index(format!("{}.{}{}: {}", parent, property, slot, err))
        })?;
        Ok(BrowsingIndex::new(parent, property, slot))
    }

    /// Root-relative path of a live state
    pub fn path_of(&self, id: StateId) -> ControllerResult<NodePath> {
        let mut steps = Vec::new();
        let mut current = id;

        loop {
            let state = self.tree.live(current)?;
            match split_index(&state.index) {
                Ok((parent, property, slot)) => {
                    steps.push(PathStep {
                        property: property.to_string(),
                        slot,
                    });
                    current = parent;
                }
                Err(_) => break,
            }
        }

        steps.reverse();
        Ok(NodePath(steps))
    }

    /// State at `path`
    pub fn resolve(&self, path: &NodePath) -> ControllerResult<StateId> {
        let mut current = self.root;
        for step in path.steps() {
            current = self
                .tree
                .inner(current, &step.property)?
                .child_at(step.slot)
                .ok_or_else(|| ControllerError::invalid_index(format!("no state at {}", path)))?;
        }
        Ok(current)
    }

    /// Validated browsing index of the slot `path` ends in
    pub fn index_at(&self, path: &NodePath) -> ControllerResult<BrowsingIndex> {
        match (path.parent(), path.last()) {
            (Some(parent), Some(step)) => self.index(self.resolve(&parent)?, &step.property, step.slot),
            _ => Ok(BrowsingIndex::Root),
        }
    }

    pub fn node_at(&self, path: &NodePath) -> ControllerResult<&Node> {
        descend(&self.helper, &self.document, path)
    }

    /// Node wrapped by a state, `None` for a stale handle or an unassigned slot
    pub fn node(&self, id: StateId) -> Option<&Node> {
        let path = self.path_of(id).ok()?;
        self.node_at(&path).ok()
    }

    /// Independent deep copy of the node wrapped by `id`
    pub fn clone_node(&self, id: StateId) -> ControllerResult<Node> {
        let path = self.path_of(id)?;
        Ok(self.helper.clone_node(self.node_at(&path)?))
    }

    /// Replay creation events of the whole tree, depth first in declaration
    /// order
    pub fn attach(&self, registry: &mut ObserverRegistry) {
        self.tree.replay_creation(self.root, registry);
    }

    /// Replay removal events of the whole tree in mirror order
    pub fn detach(&self, registry: &mut ObserverRegistry) {
        self.tree.replay_removal(self.root, registry);
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Insert the node carried by `index`, returning where it landed
    pub fn insert(&mut self, index: InsertionIndex) -> ControllerResult<BrowsingIndex> {
        let inner = InnerPath::new(self.path_of(index.parent())?, index.property());
        let landed = index.to_browsing();

        let edit = match index {
            InsertionIndex::List { position, node, .. } => Edit::Insert {
                inner,
                slot: Slot::List(position),
                node,
            },
            InsertionIndex::ExistingBlock {
                block,
                position,
                node,
                ..
            } => Edit::Insert {
                inner,
                slot: Slot::Block { block, position },
                node,
            },
            InsertionIndex::NewBlock {
                block,
                replication,
                pattern,
                source,
                node,
                ..
            } => Edit::InsertBlock {
                inner,
                block,
                content: Block {
                    replication,
                    pattern,
                    source,
                    nodes: vec![node],
                },
            },
        };

        self.commit(edit, None)?;
        Ok(landed)
    }

    /// Remove the node at `index`; removing the sole member of a block
    /// removes the block
    pub fn remove(&mut self, index: &BrowsingIndex) -> ControllerResult<()> {
        let (owner, property, slot) = split_index(index)?;
        let inner = InnerPath::new(self.path_of(owner)?, property);

        let edit = match (self.tree.inner(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => {
                list.check_remove(position)?;
                let node = self.helper.clone_node(self.node_at(&inner.child(slot))?);
                Edit::Remove { inner, slot, node }
            }
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.check_remove_member(block, position)?;
                if blocks.blocks()[block].len() == 1 {
                    let content = self.ast_blocks(&inner)?[block].clone();
                    Edit::RemoveBlock {
                        inner,
                        block,
                        content,
                    }
                } else {
                    let node = self.helper.clone_node(self.node_at(&inner.child(slot))?);
                    Edit::Remove { inner, slot, node }
                }
            }
            (other, slot) => return Err(slot_mismatch(other, slot)),
        };

        self.commit(edit, None)
    }

    /// Replace the node at `index` with `node`; the slot gets a new state
    pub fn replace(&mut self, index: &BrowsingIndex, node: Node) -> ControllerResult<()> {
        let (owner, property, slot) = split_index(index)?;
        let inner = InnerPath::new(self.path_of(owner)?, property);

        let target = self.tree.inner(owner, property)?;
        target.check_slot(slot)?;
        if let Some(child) = target.child_at(slot) {
            if self.tree.expect(child).lifecycle() == Lifecycle::Unassigned {
                return Err(ControllerError::invalid_state(format!(
                    "cannot replace unassigned optional {}",
                    index
                )));
            }
        }

        let before = self.helper.clone_node(self.node_at(&inner.child(slot))?);
        self.commit(
            Edit::Replace {
                inner,
                slot,
                before,
                after: node,
            },
            None,
        )
    }

    /// Move a list or block member by `delta` positions
    pub fn move_state(&mut self, index: &BrowsingIndex, delta: isize) -> ControllerResult<()> {
        let (owner, property, slot) = split_index(index)?;
        let inner = InnerPath::new(self.path_of(owner)?, property);
        self.commit(Edit::Move { inner, slot, delta }, None)
    }

    /// Assign an unassigned optional. Without `node` the retained item is
    /// assigned again.
    pub fn assign(&mut self, index: &BrowsingIndex, node: Option<Node>) -> ControllerResult<()> {
        let (owner, property, _) = self.optional_index(index)?;
        let inner = InnerPath::new(self.path_of(owner)?, property);

        let optional = self.helper.optional(self.node_at(&inner.owner)?, property)?;
        if optional.assigned {
            return Err(ControllerError::invalid_state(format!(
                "optional {} is already assigned",
                index
            )));
        }

        let before = optional
            .item
            .as_deref()
            .map(|item| self.helper.clone_node(item));
        let after = match node.or_else(|| before.clone()) {
            Some(after) => after,
            None => {
                return Err(ControllerError::invalid_state(format!(
                    "optional {} has no retained item to assign",
                    index
                )))
            }
        };

        self.commit(
            Edit::Assign {
                inner,
                before,
                after,
            },
            None,
        )
    }

    /// Unassign an optional, retaining its node for a later `assign`
    pub fn unassign(&mut self, index: &BrowsingIndex) -> ControllerResult<()> {
        let (owner, property, _) = self.optional_index(index)?;
        let inner = InnerPath::new(self.path_of(owner)?, property);

        let optional = self.helper.optional(self.node_at(&inner.owner)?, property)?;
        let item = match optional.item.as_deref() {
            Some(item) if optional.assigned => self.helper.clone_node(item),
            _ => {
                return Err(ControllerError::invalid_state(format!(
                    "optional {} is not assigned",
                    index
                )))
            }
        };

        self.commit(
            Edit::Unassign {
                inner,
                restore: Some(item.clone()),
                item,
            },
            None,
        )
    }

    pub fn insert_block(
        &mut self,
        inner: &InnerRef,
        block: usize,
        content: Block,
    ) -> ControllerResult<()> {
        let (path, _) = self.block_list(inner)?;
        self.commit(
            Edit::InsertBlock {
                inner: path,
                block,
                content,
            },
            None,
        )
    }

    pub fn remove_block(&mut self, inner: &InnerRef, block: usize) -> ControllerResult<()> {
        let (path, blocks) = self.block_list(inner)?;
        blocks.check_block(block)?;
        let content = self.ast_blocks(&path)?[block].clone();
        self.commit(
            Edit::RemoveBlock {
                inner: path,
                block,
                content,
            },
            None,
        )
    }

    /// Split `block` so that members from `position` on form a new block
    /// with the same header
    pub fn split_block(
        &mut self,
        inner: &InnerRef,
        block: usize,
        position: usize,
    ) -> ControllerResult<()> {
        let (path, blocks) = self.block_list(inner)?;
        blocks.check_block(block)?;
        let header = BlockHeader::of(&self.ast_blocks(&path)?[block]);
        let refresh = Refresh::new(path.owner.clone());
        self.commit(
            Edit::SplitBlock {
                inner: path,
                block,
                position,
                header,
            },
            Some(refresh),
        )
    }

    /// Merge the block after `block` into it
    pub fn merge_blocks(&mut self, inner: &InnerRef, block: usize) -> ControllerResult<()> {
        let (path, blocks) = self.block_list(inner)?;
        let position = blocks.check_merge(block)?;
        let header = BlockHeader::of(&self.ast_blocks(&path)?[block + 1]);
        let refresh = Refresh::new(path.owner.clone());
        self.commit(
            Edit::MergeBlocks {
                inner: path,
                block,
                position,
                header,
            },
            Some(refresh),
        )
    }

    pub fn move_block(&mut self, inner: &InnerRef, block: usize, delta: isize) -> ControllerResult<()> {
        let (path, _) = self.block_list(inner)?;
        self.commit(
            Edit::MoveBlock {
                inner: path,
                block,
                delta,
            },
            None,
        )
    }

    pub fn change_replication(
        &mut self,
        inner: &InnerRef,
        block: usize,
        replication: ReplicationStatus,
    ) -> ControllerResult<()> {
        let (path, blocks) = self.block_list(inner)?;
        blocks.check_block(block)?;
        let before = self.ast_blocks(&path)?[block].replication;
        let refresh = Refresh::new(path.owner.clone());
        self.commit(
            Edit::ChangeReplication {
                inner: path,
                block,
                before,
                after: replication,
            },
            Some(refresh),
        )
    }

    /// Change a leaf property of the node wrapped by `state`
    pub fn set_value(
        &mut self,
        state: StateId,
        property: &str,
        value: impl Into<Leaf>,
    ) -> ControllerResult<()> {
        let owner = self.path_of(state)?;
        let before = self.helper.value(self.node_at(&owner)?, property)?.clone();
        self.commit(
            Edit::SetValue {
                owner,
                property: property.to_string(),
                before,
                after: value.into(),
            },
            None,
        )
    }

    /// Revert the most recent group. Returns `false` when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> ControllerResult<bool> {
        if self.history.in_batch() {
            return Err(ControllerError::BatchInProgress);
        }
        let group = match self.history.pop_undo() {
            Some(group) => group,
            None => return Ok(false),
        };

        if let Err(err) = self.apply_all(&group.undo_edits()) {
            self.history.restore_undo(group);
            return Err(err);
        }
        self.run_refresh(group.refresh().cloned());

        info!(
            operations = group.len(),
            description = group.description().unwrap_or_default(),
            "Undo"
        );
        self.history.push_undone(group);
        self.check_invariants();
        Ok(true)
    }

    /// Re-apply the most recently undone group
    pub fn redo(&mut self) -> ControllerResult<bool> {
        if self.history.in_batch() {
            return Err(ControllerError::BatchInProgress);
        }
        let group = match self.history.pop_redo() {
            Some(group) => group,
            None => return Ok(false),
        };

        if let Err(err) = self.apply_all(&group.redo_edits()) {
            self.history.restore_redo(group);
            return Err(err);
        }
        self.run_refresh(group.refresh().cloned());

        info!(
            operations = group.len(),
            description = group.description().unwrap_or_default(),
            "Redo"
        );
        self.history.push_redone(group);
        self.check_invariants();
        Ok(true)
    }

    /// Collect the following commands into one undoable group
    pub fn begin_batch(&mut self, description: Option<String>) -> ControllerResult<()> {
        self.history.begin_batch(description)?;
        debug!("Batch started");
        Ok(())
    }

    /// Close the open batch. Returns `false` if it recorded nothing.
    pub fn end_batch(&mut self) -> ControllerResult<bool> {
        let batch = self.history.take_batch()?;
        let group = match batch.into_group() {
            Some(group) => group,
            None => {
                debug!("Empty batch discarded");
                return Ok(false);
            }
        };

        self.run_refresh(group.refresh().cloned());
        debug!(operations = group.len(), "Batch committed");
        self.history.push(group);
        Ok(true)
    }

    /// Revert everything the open batch did and drop it. Returns the number
    /// of reverted edits.
    pub fn abort_batch(&mut self) -> ControllerResult<usize> {
        let batch = self.history.take_batch()?;
        for edit in batch.edits.iter().rev() {
            self.revert(edit);
        }

        warn!(edits = batch.edits.len(), "Batch aborted");
        self.check_invariants();
        Ok(batch.edits.len())
    }

    /// Refresh `target` once the open batch is committed, undone or redone
    pub fn set_batch_refresh(&mut self, target: StateId) -> ControllerResult<()> {
        let path = self.path_of(target)?;
        let batch = self.history.batch_mut().ok_or(ControllerError::NoBatch)?;
        batch.refresh = Some(Refresh::new(path));
        Ok(())
    }

    /// Apply an externally built group atomically and record it
    #[instrument(skip_all, fields(operations = group.len()))]
    pub fn execute(&mut self, group: OperationGroup) -> ControllerResult<()> {
        if self.history.in_batch() {
            return Err(ControllerError::BatchInProgress);
        }

        self.apply_all(&group.redo_edits())?;
        self.run_refresh(group.refresh().cloned());
        self.history.push(group);
        self.check_invariants();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Check map consistency, reachability and order fidelity against the
    /// document. Returns a description of the first violation.
    pub fn verify(&self) -> Result<(), String> {
        for (index, id) in &self.tree.index_map {
            let state = self
                .tree
                .get(*id)
                .ok_or_else(|| format!("{} maps to removed state {}", index, id))?;
            if state.index != *index {
                return Err(format!(
                    "{} maps to {} which is registered at {}",
                    index, id, state.index
                ));
            }
        }

        for (id, state) in self.tree.states.iter() {
            if self.tree.index_map.get(&state.index) != Some(&id) {
                return Err(format!("state {} at {} is not registered", id, state.index));
            }
        }

        let mut visited = 0;
        self.verify_state(self.root, Some(&self.document), &mut visited)?;
        if visited != self.tree.states.len() {
            return Err(format!(
                "{} live states are unreachable from the root",
                self.tree.states.len() - visited
            ));
        }
        Ok(())
    }

    fn verify_state(&self, id: StateId, node: Option<&Node>, visited: &mut usize) -> Result<(), String> {
        *visited += 1;
        let state = self
            .tree
            .get(id)
            .ok_or_else(|| format!("child state {} is not live", id))?;

        let node = match (node, state.lifecycle()) {
            (Some(node), Lifecycle::Initialized) => node,
            (None, Lifecycle::Unassigned) if state.inners.is_empty() => return Ok(()),
            (node, lifecycle) => {
                return Err(format!(
                    "state {} is {:?} but its node is {}",
                    id,
                    lifecycle,
                    if node.is_some() { "present" } else { "absent" }
                ))
            }
        };

        let browsed = browse(&self.helper, node).map_err(|err| err.to_string())?;
        if browsed.len() != state.inners.len() {
            return Err(format!(
                "state {} has {} inners, node `{}` has {} child properties",
                id,
                state.inners.len(),
                node.kind,
                browsed.len()
            ));
        }

        for (expected, inner) in browsed.iter().zip(state.inners()) {
            let property = inner.property();
            if expected.property() != property || expected.kind() != inner.kind() || inner.owner() != id {
                return Err(format!(
                    "inner `{}` of {} does not match property `{}`",
                    property,
                    id,
                    expected.property()
                ));
            }

            if let (InnerBrowse::Optional { item, .. }, Inner::Optional(single)) = (expected, inner) {
                self.verify_index(id, property, Slot::Optional, single.child())?;
                self.verify_state(single.child(), *item, visited)?;
                continue;
            }

            if let (InnerBrowse::BlockList { blocks, .. }, Inner::BlockList(states)) = (expected, inner) {
                self.verify_blocks(id, property, blocks, states)?;
            }

            let children = expected.children();
            let slots = inner.slots();
            if children.len() != slots.len() {
                return Err(format!(
                    "inner `{}` of {} holds {} states for {} nodes",
                    property,
                    id,
                    slots.len(),
                    children.len()
                ));
            }
            for ((slot, child), (state_slot, child_id)) in children.into_iter().zip(slots) {
                if slot != state_slot {
                    return Err(format!("inner `{}` of {} is out of order at {}", property, id, slot));
                }
                self.verify_index(id, property, slot, child_id)?;
                self.verify_state(child_id, Some(child), visited)?;
            }
        }
        Ok(())
    }

    fn verify_blocks(
        &self,
        owner: StateId,
        property: &str,
        blocks: &[Block],
        states: &BlockListInner,
    ) -> Result<(), String> {
        if blocks.len() != states.block_count() {
            return Err(format!(
                "`{}` of {} mirrors {} blocks, document has {}",
                property,
                owner,
                states.block_count(),
                blocks.len()
            ));
        }

        for (block, (content, state)) in blocks.iter().zip(states.blocks()).enumerate() {
            if state.is_empty() {
                return Err(format!("block {} of `{}` in {} is empty", block, property, owner));
            }
            let same_header = content.replication == state.replication()
                && self.helper.is_equal(&content.pattern, state.pattern())
                && self.helper.is_equal(&content.source, state.source());
            if !same_header || content.nodes.len() != state.len() {
                return Err(format!(
                    "block {} of `{}` in {} differs from the document",
                    block, property, owner
                ));
            }
        }
        Ok(())
    }

    fn verify_index(&self, owner: StateId, property: &str, slot: Slot, child: StateId) -> Result<(), String> {
        let expected = BrowsingIndex::new(owner, property, slot);
        match self.tree.get(child) {
            Some(state) if state.index == expected => Ok(()),
            Some(state) => Err(format!("state {} is at {}, expected {}", child, state.index, expected)),
            None => Err(format!("state {} at {} is not live", child, expected)),
        }
    }

    fn check_invariants(&self) {
        if !self.config.verify_invariants {
            return;
        }
        if let Err(violation) = self.verify() {
            panic!("State tree invariant violated: {}", violation);
        }
    }

    // ---------------------------------------------------------------------
    // Edit application
    // ---------------------------------------------------------------------

    fn commit(&mut self, edit: Edit, refresh: Option<Refresh>) -> ControllerResult<()> {
        self.apply(&edit)?;
        debug!(edit = edit.name(), batched = self.history.in_batch(), "Edit committed");

        match self.history.batch_mut() {
            Some(batch) => {
                batch.edits.push(edit);
                if batch.refresh.is_none() {
                    batch.refresh = refresh;
                }
            }
            None => {
                self.run_refresh(refresh.clone());
                self.history
                    .push(OperationGroup::single(edit).with_refresh(refresh));
            }
        }

        self.check_invariants();
        Ok(())
    }

    /// Apply edits in order; on failure revert the applied ones and return
    /// the error
    ///
    /// Events are held until every edit succeeded and dropped on rollback.
    fn apply_all(&mut self, edits: &[Edit]) -> ControllerResult<()> {
        self.tree.hold_events();
        for (done, edit) in edits.iter().enumerate() {
            if let Err(err) = self.apply(edit) {
                warn!(edit = edit.name(), error = %err, rolled_back = done, "Rolling back group");
                for applied in edits[..done].iter().rev() {
                    self.revert(applied);
                }
                let dropped = self.tree.discard_held();
                debug!(dropped, "Held events discarded");
                return Err(err);
            }
        }
        self.tree.release_held();
        Ok(())
    }

    /// Undo an edit that was just applied; failing here is an invariant breach
    fn revert(&mut self, edit: &Edit) {
        if let Err(err) = self.apply(&edit.invert()) {
            panic!("Reverting {} failed: {}", edit.name(), err);
        }
    }

    fn run_refresh(&mut self, refresh: Option<Refresh>) {
        let refresh = match refresh {
            Some(refresh) => refresh,
            None => return,
        };
        match self.resolve(&refresh.target) {
            Ok(state) => self.tree.emit(Event::StateRefreshed { state }),
            Err(err) => warn!(path = %refresh.target, error = %err, "Refresh target is gone"),
        }
    }

    fn apply(&mut self, edit: &Edit) -> ControllerResult<()> {
        match edit {
            Edit::Insert { inner, slot, node } => self.apply_insert(inner, *slot, node),
            Edit::Remove { inner, slot, node } => self.apply_remove(inner, *slot, node),
            Edit::Replace {
                inner,
                slot,
                before,
                after,
            } => self.apply_replace(inner, *slot, before, after),
            Edit::Move { inner, slot, delta } => self.apply_move(inner, *slot, *delta),
            Edit::Assign {
                inner,
                before,
                after,
            } => self.apply_assign(inner, before.as_ref(), after),
            Edit::Unassign {
                inner,
                item,
                restore,
            } => self.apply_unassign(inner, item, restore.as_ref()),
            Edit::InsertBlock {
                inner,
                block,
                content,
            } => self.apply_insert_block(inner, *block, content),
            Edit::RemoveBlock {
                inner,
                block,
                content,
            } => self.apply_remove_block(inner, *block, content),
            Edit::SplitBlock {
                inner,
                block,
                position,
                header,
            } => self.apply_split(inner, *block, *position, header),
            Edit::MergeBlocks {
                inner,
                block,
                position,
                header,
            } => self.apply_merge(inner, *block, *position, header),
            Edit::MoveBlock {
                inner,
                block,
                delta,
            } => self.apply_move_block(inner, *block, *delta),
            Edit::ChangeReplication {
                inner,
                block,
                before,
                after,
            } => self.apply_change_replication(inner, *block, *before, *after),
            Edit::SetValue {
                owner,
                property,
                before,
                after,
            } => self.apply_set_value(owner, property, before, after),
        }
    }

    fn apply_insert(&mut self, inner: &InnerPath, slot: Slot, node: &Node) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        match (self.tree.inner(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => list.check_insert(position)?,
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.check_insert_member(block, position)?
            }
            (other, slot) => return Err(slot_mismatch(other, slot)),
        }
        self.check_child(&inner.owner, property, node)?;

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        match slot {
            Slot::List(position) => self
                .helper
                .list_mut(parent, property)?
                .insert(position, node.clone()),
            Slot::Block { block, position } => self.helper.block_list_mut(parent, property)?[block]
                .nodes
                .insert(position, node.clone()),
            _ => unreachable!("slot kind checked above"),
        }

        let index = BrowsingIndex::new(owner, property, slot);
        let id = self.tree.allocate(index.clone());
        match (self.tree.inner_mut(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => list.insert(position, id)?,
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.insert_member(block, position, id)?
            }
            _ => unreachable!("slot kind checked above"),
        }
        self.tree.reindex(owner, property);

        let node = descend(&self.helper, &self.document, &inner.child(slot))?;
        self.tree.initialize(&self.helper, id, Some(node))?;
        self.tree.emit(Event::StateInserted { index, state: id });
        Ok(())
    }

    fn apply_remove(&mut self, inner: &InnerPath, slot: Slot, node: &Node) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        match (self.tree.inner(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => list.check_remove(position)?,
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.check_remove_member(block, position)?;
                if blocks.blocks()[block].len() == 1 {
                    return Err(ControllerError::invalid_state(format!(
                        "member {} is the last one of block {}; remove the block instead",
                        position, block
                    )));
                }
            }
            (other, slot) => return Err(slot_mismatch(other, slot)),
        }
        self.expect_node(&inner.child(slot), node)?;

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        match slot {
            Slot::List(position) => {
                self.helper.list_mut(parent, property)?.remove(position);
            }
            Slot::Block { block, position } => {
                self.helper.block_list_mut(parent, property)?[block]
                    .nodes
                    .remove(position);
            }
            _ => unreachable!("slot kind checked above"),
        }

        let id = match (self.tree.inner_mut(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => list.remove(position)?,
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.remove_member(block, position)?
            }
            _ => unreachable!("slot kind checked above"),
        };
        self.tree.destroy(id);
        self.tree.reindex(owner, property);

        self.tree.emit(Event::StateRemoved {
            index: BrowsingIndex::new(owner, property, slot),
            state: id,
        });
        Ok(())
    }

    fn apply_replace(
        &mut self,
        inner: &InnerPath,
        slot: Slot,
        before: &Node,
        after: &Node,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        let current = {
            let target = self.tree.inner(owner, property)?;
            target.check_slot(slot)?;
            target
                .child_at(slot)
                .ok_or_else(|| slot_mismatch(target, slot))?
        };
        if self.tree.expect(current).lifecycle() == Lifecycle::Unassigned {
            return Err(ControllerError::invalid_state(format!(
                "cannot replace unassigned optional {}",
                inner
            )));
        }
        let path = inner.child(slot);
        self.expect_node(&path, before)?;
        self.check_child(&inner.owner, property, after)?;

        *descend_mut(&self.helper, &mut self.document, &path)? = after.clone();

        let index = self.tree.expect(current).index.clone();
        self.tree.destroy(current);
        let id = self.tree.allocate(index.clone());
        self.tree.inner_mut(owner, property)?.replace_child(slot, id)?;
        self.tree.register(id);

        let node = descend(&self.helper, &self.document, &path)?;
        self.tree.initialize(&self.helper, id, Some(node))?;
        self.tree.emit(Event::StateReplaced {
            index,
            old_state: current,
            new_state: id,
        });
        Ok(())
    }

    fn apply_move(&mut self, inner: &InnerPath, slot: Slot, delta: isize) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        let target = match (self.tree.inner(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => list.check_move(position, delta)?,
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.check_move_member(block, position, delta)?
            }
            (other, slot) => return Err(slot_mismatch(other, slot)),
        };

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        let nodes = match slot {
            Slot::List(_) => self.helper.list_mut(parent, property)?,
            Slot::Block { block, .. } => &mut self.helper.block_list_mut(parent, property)?[block].nodes,
            _ => unreachable!("slot kind checked above"),
        };
        if let Some(position) = slot.position() {
            let moved = nodes.remove(position);
            nodes.insert(target, moved);
        }

        let id = match (self.tree.inner_mut(owner, property)?, slot) {
            (Inner::List(list), Slot::List(position)) => {
                list.move_item(position, delta)?;
                list.children()[target]
            }
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.move_member(block, position, delta)?;
                blocks.blocks()[block].members()[target]
            }
            _ => unreachable!("slot kind checked above"),
        };
        self.tree.reindex(owner, property);

        self.tree.emit(Event::StateMoved {
            from: BrowsingIndex::new(owner, property, slot),
            to: BrowsingIndex::new(owner, property, slot.at(target)),
            state: id,
        });
        Ok(())
    }

    fn apply_assign(
        &mut self,
        inner: &InnerPath,
        before: Option<&Node>,
        after: &Node,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        let child = self.optional_child(owner, property)?;
        if self.tree.expect(child).lifecycle() != Lifecycle::Unassigned {
            return Err(ControllerError::invalid_state(format!(
                "optional {} is already assigned",
                inner
            )));
        }

        let retained = self
            .helper
            .optional(self.node_at(&inner.owner)?, property)?
            .item
            .as_deref();
        if !self.same_item(retained, before) {
            return Err(ControllerError::invalid_state(format!(
                "retained item of {} differs from the recorded one",
                inner
            )));
        }
        self.check_child(&inner.owner, property, after)?;

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        let optional = self.helper.optional_mut(parent, property)?;
        optional.item = Some(Box::new(after.clone()));
        optional.assigned = true;

        let node = descend(&self.helper, &self.document, &inner.child(Slot::Optional))?;
        self.tree.populate(&self.helper, child, node)?;
        self.tree.set_lifecycle(child, Lifecycle::Initialized);

        let index = self.tree.expect(child).index.clone();
        self.tree.emit(Event::StateAssigned {
            index,
            state: child,
        });
        Ok(())
    }

    fn apply_unassign(
        &mut self,
        inner: &InnerPath,
        item: &Node,
        restore: Option<&Node>,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        let child = self.optional_child(owner, property)?;
        if self.tree.expect(child).lifecycle() != Lifecycle::Initialized {
            return Err(ControllerError::invalid_state(format!(
                "optional {} is not assigned",
                inner
            )));
        }
        self.expect_node(&inner.child(Slot::Optional), item)?;

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        let optional = self.helper.optional_mut(parent, property)?;
        optional.assigned = false;
        optional.item = restore.cloned().map(Box::new);

        for released in self.tree.take_inners(child).into_values() {
            self.tree.release(released);
        }
        self.tree.set_lifecycle(child, Lifecycle::Unassigned);

        let index = self.tree.expect(child).index.clone();
        self.tree.emit(Event::StateUnassigned {
            index,
            state: child,
        });
        Ok(())
    }

    fn apply_insert_block(
        &mut self,
        inner: &InnerPath,
        block: usize,
        content: &Block,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        self.block_list_at(owner, property)?.check_insert_block(block)?;
        if content.nodes.is_empty() {
            let kind = self.node_at(&inner.owner)?.kind.clone();
            return Err(AstError::EmptyBlock {
                kind,
                property: property.to_string(),
                block,
            }
            .into());
        }
        for member in &content.nodes {
            self.check_child(&inner.owner, property, member)?;
        }

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        self.helper
            .block_list_mut(parent, property)?
            .insert(block, content.clone());

        let owner_ref = InnerRef::new(owner, property);
        self.tree
            .block_list_mut(owner, property)?
            .insert_block(block, BlockState::from_block(content))?;
        self.tree.reindex(owner, property);
        self.tree.emit(Event::BlockStateCreated {
            inner: owner_ref.clone(),
            block,
        });

        for position in 0..content.nodes.len() {
            let slot = Slot::Block { block, position };
            let index = BrowsingIndex::new(owner, property, slot);
            let id = self.tree.allocate(index.clone());
            self.tree
                .block_list_mut(owner, property)?
                .insert_member(block, position, id)?;
            self.tree.register(id);

            let node = descend(&self.helper, &self.document, &inner.child(slot))?;
            self.tree.initialize(&self.helper, id, Some(node))?;
            self.tree.emit(Event::StateInserted { index, state: id });
        }

        self.tree.emit(Event::BlockStateInserted {
            inner: owner_ref,
            block,
        });
        Ok(())
    }

    fn apply_remove_block(
        &mut self,
        inner: &InnerPath,
        block: usize,
        content: &Block,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        self.block_list_at(owner, property)?.check_block(block)?;

        let current = &self.ast_blocks(inner)?[block];
        let same = BlockHeader::of(current) == BlockHeader::of(content)
            && current.nodes.len() == content.nodes.len()
            && current
                .nodes
                .iter()
                .zip(&content.nodes)
                .all(|(a, b)| self.helper.is_equal(a, b));
        if !same {
            return Err(ControllerError::invalid_state(format!(
                "block {} of {} differs from the recorded one",
                block, inner
            )));
        }

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        self.helper.block_list_mut(parent, property)?.remove(block);

        let removed = self
            .tree
            .block_list_mut(owner, property)?
            .remove_block(block)?;
        self.tree.reindex(owner, property);

        for (position, id) in removed.members().iter().enumerate() {
            self.tree.destroy(*id);
            self.tree.emit(Event::StateRemoved {
                index: BrowsingIndex::new(owner, property, Slot::Block { block, position }),
                state: *id,
            });
        }
        self.tree.emit(Event::BlockStateRemoved {
            inner: InnerRef::new(owner, property),
            block,
        });
        Ok(())
    }

    fn apply_split(
        &mut self,
        inner: &InnerPath,
        block: usize,
        position: usize,
        header: &BlockHeader,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        self.block_list_at(owner, property)?
            .check_split(block, position)?;

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        let blocks = self.helper.block_list_mut(parent, property)?;
        let tail = blocks[block].nodes.split_off(position);
        blocks.insert(block + 1, header.clone().with_nodes(tail));

        let tail = BlockState {
            replication: header.replication,
            pattern: header.pattern.clone(),
            source: header.source.clone(),
            members: Vec::new(),
        };
        self.tree
            .block_list_mut(owner, property)?
            .split(block, position, tail)?;
        self.tree.reindex(owner, property);

        let owner_ref = InnerRef::new(owner, property);
        self.tree.emit(Event::BlockStateCreated {
            inner: owner_ref.clone(),
            block: block + 1,
        });
        self.tree.emit(Event::BlockSplit {
            inner: owner_ref,
            block,
            position,
        });
        Ok(())
    }

    fn apply_merge(
        &mut self,
        inner: &InnerPath,
        block: usize,
        position: usize,
        header: &BlockHeader,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        let length = self.block_list_at(owner, property)?.check_merge(block)?;
        if length != position {
            return Err(ControllerError::invalid_state(format!(
                "block {} of {} has {} members, the merge expects {}",
                block, inner, length, position
            )));
        }
        if BlockHeader::of(&self.ast_blocks(inner)?[block + 1]) != *header {
            return Err(ControllerError::invalid_state(format!(
                "block {} of {} differs from the recorded one",
                block + 1,
                inner
            )));
        }

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        let blocks = self.helper.block_list_mut(parent, property)?;
        let next = blocks.remove(block + 1);
        blocks[block].nodes.extend(next.nodes);

        self.tree.block_list_mut(owner, property)?.merge(block)?;
        self.tree.reindex(owner, property);

        let owner_ref = InnerRef::new(owner, property);
        self.tree.emit(Event::BlockStateRemoved {
            inner: owner_ref.clone(),
            block: block + 1,
        });
        self.tree.emit(Event::BlocksMerged {
            inner: owner_ref,
            block,
            position,
        });
        Ok(())
    }

    fn apply_move_block(&mut self, inner: &InnerPath, block: usize, delta: isize) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        let target = self
            .block_list_at(owner, property)?
            .check_move_block(block, delta)?;

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        let blocks = self.helper.block_list_mut(parent, property)?;
        let moved = blocks.remove(block);
        blocks.insert(target, moved);

        self.tree
            .block_list_mut(owner, property)?
            .move_block(block, delta)?;
        self.tree.reindex(owner, property);

        self.tree.emit(Event::BlockStateMoved {
            inner: InnerRef::new(owner, property),
            from: block,
            to: target,
        });
        Ok(())
    }

    fn apply_change_replication(
        &mut self,
        inner: &InnerPath,
        block: usize,
        before: ReplicationStatus,
        after: ReplicationStatus,
    ) -> ControllerResult<()> {
        let owner = self.mutable_owner(&inner.owner)?;
        let property = inner.property.as_str();
        self.block_list_at(owner, property)?.check_block(block)?;
        if self.ast_blocks(inner)?[block].replication != before {
            return Err(ControllerError::invalid_state(format!(
                "block {} of {} is not {:?}",
                block, inner, before
            )));
        }

        let parent = descend_mut(&self.helper, &mut self.document, &inner.owner)?;
        self.helper.block_list_mut(parent, property)?[block].replication = after;

        self.tree
            .block_list_mut(owner, property)?
            .set_replication(block, after)?;
        self.tree.emit(Event::BlockReplicationChanged {
            inner: InnerRef::new(owner, property),
            block,
            replication: after,
        });
        Ok(())
    }

    fn apply_set_value(
        &mut self,
        owner: &NodePath,
        property: &str,
        before: &Leaf,
        after: &Leaf,
    ) -> ControllerResult<()> {
        let state = self.mutable_owner(owner)?;
        if self.helper.value(self.node_at(owner)?, property)? != before {
            return Err(ControllerError::invalid_state(format!(
                "`{}` of {} is not {:?}",
                property, owner, before
            )));
        }

        let node = descend_mut(&self.helper, &mut self.document, owner)?;
        *self.helper.value_mut(node, property)? = after.clone();

        self.tree.emit(Event::ValueChanged {
            state,
            property: property.to_string(),
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Lookup helpers
    // ---------------------------------------------------------------------

    /// State at `path` that can own a mutation
    fn mutable_owner(&self, path: &NodePath) -> ControllerResult<StateId> {
        let id = self.resolve(path)?;
        let state = self.tree.expect(id);
        if !state.is_mutable() {
            return Err(ControllerError::invalid_state(format!(
                "state {} at {} is {:?}",
                id,
                path,
                state.lifecycle()
            )));
        }
        Ok(id)
    }

    fn optional_index<'i>(&self, index: &'i BrowsingIndex) -> ControllerResult<(StateId, &'i str, Slot)> {
        match split_index(index)? {
            (owner, property, Slot::Optional) => Ok((owner, property, Slot::Optional)),
            _ => Err(ControllerError::invalid_index(format!(
                "{} is not an optional slot",
                index
            ))),
        }
    }

    fn optional_child(&self, owner: StateId, property: &str) -> ControllerResult<StateId> {
        match self.tree.inner(owner, property)? {
            Inner::Optional(single) => Ok(single.child()),
            other => Err(slot_mismatch(other, Slot::Optional)),
        }
    }

    fn block_list_at(&self, owner: StateId, property: &str) -> ControllerResult<&BlockListInner> {
        self.tree
            .inner(owner, property)?
            .as_block_list()
            .ok_or_else(|| ControllerError::invalid_index(format!("`{}` is not a block list", property)))
    }

    fn block_list(&self, inner: &InnerRef) -> ControllerResult<(InnerPath, &BlockListInner)> {
        let path = InnerPath::new(self.path_of(inner.owner)?, inner.property.clone());
        Ok((path, self.block_list_at(inner.owner, &inner.property)?))
    }

    fn ast_blocks(&self, inner: &InnerPath) -> ControllerResult<&[Block]> {
        Ok(self
            .helper
            .block_list(self.node_at(&inner.owner)?, &inner.property)?)
    }

    /// Check that `node` can be stored under `property` of the node at `owner`
    fn check_child(&self, owner: &NodePath, property: &str, node: &Node) -> ControllerResult<()> {
        self.helper.accepts(self.node_at(owner)?, property, node)?;
        validate(&self.helper, node)
    }

    fn expect_node(&self, path: &NodePath, expected: &Node) -> ControllerResult<()> {
        if self.helper.is_equal(self.node_at(path)?, expected) {
            Ok(())
        } else {
            Err(ControllerError::invalid_state(format!(
                "node at {} differs from the recorded one",
                path
            )))
        }
    }

    fn same_item(&self, a: Option<&Node>, b: Option<&Node>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.helper.is_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<H: AstHelper> std::fmt::Debug for Controller<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("root", &self.root)
            .field("states", &self.tree.states.len())
            .field("undo_levels", &self.history.undo_levels())
            .field("redo_levels", &self.history.redo_levels())
            .finish()
    }
}
