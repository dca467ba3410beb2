//! # Inners
//!
//! An inner mirrors one child-bearing property of its owner state and holds
//! the handles of the child states in AST order. Every bounds rule of a
//! structural edit lives here; the controller calls the `check_*` methods
//! before it touches the AST and the mutating methods afterwards.

use crate::arena::StateId;
use crate::errors::{ControllerError, ControllerResult};
use crate::index::Slot;
use crate::state::BlockState;
use frond_ast::{PropertyKind, ReplicationStatus};

#[derive(Debug, Clone)]
pub enum Inner {
    Placeholder(SingleInner),
    Optional(SingleInner),
    List(ListInner),
    BlockList(BlockListInner),
}

/// Inner of a mandatory or optional single child
#[derive(Debug, Clone)]
pub struct SingleInner {
    pub(crate) owner: StateId,
    pub(crate) property: String,
    pub(crate) child: StateId,
}

#[derive(Debug, Clone)]
pub struct ListInner {
    pub(crate) owner: StateId,
    pub(crate) property: String,
    pub(crate) children: Vec<StateId>,
}

#[derive(Debug, Clone)]
pub struct BlockListInner {
    pub(crate) owner: StateId,
    pub(crate) property: String,
    pub(crate) blocks: Vec<BlockState>,
}

/// Target position of moving `position` by `delta` among `count` items
fn move_target(position: usize, delta: isize, count: usize) -> ControllerResult<usize> {
    if position >= count {
        return Err(ControllerError::IndexOutOfRange { position, count });
    }

    let target = position as isize + delta;
    if target < 0 || target >= count as isize {
        return Err(ControllerError::InvalidMove {
            position,
            delta,
            count,
        });
    }

    Ok(target as usize)
}

fn check_existing(position: usize, count: usize) -> ControllerResult<()> {
    if position < count {
        Ok(())
    } else {
        Err(ControllerError::IndexOutOfRange { position, count })
    }
}

fn check_insertion(position: usize, count: usize) -> ControllerResult<()> {
    if position <= count {
        Ok(())
    } else {
        Err(ControllerError::IndexOutOfRange { position, count })
    }
}

impl Inner {
    /// State owning this inner
    pub fn owner(&self) -> StateId {
        match self {
            Inner::Placeholder(single) | Inner::Optional(single) => single.owner,
            Inner::List(list) => list.owner,
            Inner::BlockList(blocks) => blocks.owner,
        }
    }

    /// Property name on the owner
    pub fn property(&self) -> &str {
        match self {
            Inner::Placeholder(single) | Inner::Optional(single) => &single.property,
            Inner::List(list) => &list.property,
            Inner::BlockList(blocks) => &blocks.property,
        }
    }

    /// Property kind this inner mirrors
    pub fn kind(&self) -> PropertyKind {
        match self {
            Inner::Placeholder(_) => PropertyKind::Placeholder,
            Inner::Optional(_) => PropertyKind::Optional,
            Inner::List(_) => PropertyKind::List,
            Inner::BlockList(_) => PropertyKind::BlockList,
        }
    }

    /// Number of child states
    pub fn count(&self) -> usize {
        match self {
            Inner::Placeholder(_) | Inner::Optional(_) => 1,
            Inner::List(list) => list.children.len(),
            Inner::BlockList(blocks) => blocks.blocks.iter().map(BlockState::len).sum(),
        }
    }

    /// Child states with their slots, in AST order
    pub fn slots(&self) -> Vec<(Slot, StateId)> {
        match self {
            Inner::Placeholder(single) => vec![(Slot::Placeholder, single.child)],
            Inner::Optional(single) => vec![(Slot::Optional, single.child)],
            Inner::List(list) => list
                .children
                .iter()
                .enumerate()
                .map(|(position, id)| (Slot::List(position), *id))
                .collect(),
            Inner::BlockList(blocks) => blocks
                .blocks
                .iter()
                .enumerate()
                .flat_map(|(block, state)| {
                    state.members.iter().enumerate().map(move |(position, id)| {
                        (Slot::Block { block, position }, *id)
                    })
                })
                .collect(),
        }
    }

    /// Child states in AST order
    pub fn children(&self) -> Vec<StateId> {
        self.slots().into_iter().map(|(_, id)| id).collect()
    }

    /// Child state at `slot`, `None` if the slot is empty or does not fit
    pub fn child_at(&self, slot: Slot) -> Option<StateId> {
        match (self, slot) {
            (Inner::Placeholder(single), Slot::Placeholder) => Some(single.child),
            (Inner::Optional(single), Slot::Optional) => Some(single.child),
            (Inner::List(list), Slot::List(position)) => list.children.get(position).copied(),
            (Inner::BlockList(blocks), Slot::Block { block, position }) => blocks
                .blocks
                .get(block)
                .and_then(|state| state.members.get(position))
                .copied(),
            _ => None,
        }
    }

    /// Check that `slot` names an existing child of this inner
    pub fn check_slot(&self, slot: Slot) -> ControllerResult<()> {
        match (self, slot) {
            (Inner::Placeholder(_), Slot::Placeholder) | (Inner::Optional(_), Slot::Optional) => {
                Ok(())
            }
            (Inner::List(list), Slot::List(position)) => check_existing(position, list.len()),
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                blocks.check_block(block)?;
                check_existing(position, blocks.blocks[block].len())
            }
            (inner, slot) => Err(ControllerError::invalid_index(format!(
                "slot {:?} does not fit {:?} property `{}`",
                slot,
                inner.kind(),
                inner.property()
            ))),
        }
    }

    /// Swap the child at `slot` for `id`, returning the previous child
    pub(crate) fn replace_child(&mut self, slot: Slot, id: StateId) -> ControllerResult<StateId> {
        self.check_slot(slot)?;
        let target = match (self, slot) {
            (Inner::Placeholder(single), _) | (Inner::Optional(single), _) => &mut single.child,
            (Inner::List(list), Slot::List(position)) => &mut list.children[position],
            (Inner::BlockList(blocks), Slot::Block { block, position }) => {
                &mut blocks.blocks[block].members[position]
            }
            (inner, slot) => {
                return Err(ControllerError::invalid_index(format!(
                    "slot {:?} does not fit property `{}`",
                    slot,
                    inner.property()
                )))
            }
        };
        Ok(std::mem::replace(target, id))
    }

    pub(crate) fn as_block_list_mut(&mut self) -> Option<&mut BlockListInner> {
        match self {
            Inner::BlockList(blocks) => Some(blocks),
            _ => None,
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> Option<&mut ListInner> {
        match self {
            Inner::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListInner> {
        match self {
            Inner::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_block_list(&self) -> Option<&BlockListInner> {
        match self {
            Inner::BlockList(blocks) => Some(blocks),
            _ => None,
        }
    }
}

impl SingleInner {
    /// The slot state; it survives unassign
    pub fn child(&self) -> StateId {
        self.child
    }
}

impl ListInner {
    pub(crate) fn new(owner: StateId, property: impl Into<String>) -> Self {
        Self {
            owner,
            property: property.into(),
            children: Vec::new(),
        }
    }

    /// Number of children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Children in list order
    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    /// Check `0 <= position <= len`
    pub fn check_insert(&self, position: usize) -> ControllerResult<()> {
        check_insertion(position, self.children.len())
    }

    /// Check `0 <= position < len`
    pub fn check_remove(&self, position: usize) -> ControllerResult<()> {
        check_existing(position, self.children.len())
    }

    /// Check a move and return its target position
    pub fn check_move(&self, position: usize, delta: isize) -> ControllerResult<usize> {
        move_target(position, delta, self.children.len())
    }

    /// Insert a child at `position`
    pub fn insert(&mut self, position: usize, id: StateId) -> ControllerResult<()> {
        self.check_insert(position)?;
        self.children.insert(position, id);
        Ok(())
    }

    /// Remove and return the child at `position`
    pub fn remove(&mut self, position: usize) -> ControllerResult<StateId> {
        self.check_remove(position)?;
        Ok(self.children.remove(position))
    }

    /// Move one child by `delta`, returning its new position
    pub fn move_item(&mut self, position: usize, delta: isize) -> ControllerResult<usize> {
        let target = self.check_move(position, delta)?;
        let id = self.children.remove(position);
        self.children.insert(target, id);
        Ok(target)
    }
}

impl BlockListInner {
    pub(crate) fn new(owner: StateId, property: impl Into<String>) -> Self {
        Self {
            owner,
            property: property.into(),
            blocks: Vec::new(),
        }
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks in AST order
    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    /// Block at `block`, if any
    pub fn block(&self, block: usize) -> Option<&BlockState> {
        self.blocks.get(block)
    }

    /// Check that `block` exists
    pub fn check_block(&self, block: usize) -> ControllerResult<()> {
        check_existing(block, self.blocks.len())
    }

    /// Check `0 <= block <= block_count`
    pub fn check_insert_block(&self, block: usize) -> ControllerResult<()> {
        check_insertion(block, self.blocks.len())
    }

    /// Check that a member can be inserted at `position` of `block`
    pub fn check_insert_member(&self, block: usize, position: usize) -> ControllerResult<()> {
        self.check_block(block)?;
        check_insertion(position, self.blocks[block].len())
    }

    /// Check that `block` has a member at `position`
    pub fn check_remove_member(&self, block: usize, position: usize) -> ControllerResult<()> {
        self.check_block(block)?;
        check_existing(position, self.blocks[block].len())
    }

    /// Check a member move inside `block` and return its target position
    pub fn check_move_member(
        &self,
        block: usize,
        position: usize,
        delta: isize,
    ) -> ControllerResult<usize> {
        self.check_block(block)?;
        move_target(position, delta, self.blocks[block].len())
    }

    /// Check `1 <= position < len` for `block`
    pub fn check_split(&self, block: usize, position: usize) -> ControllerResult<()> {
        self.check_block(block)?;
        let count = self.blocks[block].len();
        if count < 2 || position == 0 || position >= count {
            return Err(ControllerError::InvalidSplit {
                block,
                position,
                count,
            });
        }
        Ok(())
    }

    /// Returns the member count of `block`, where the merged members start
    pub fn check_merge(&self, block: usize) -> ControllerResult<usize> {
        self.check_block(block)?;
        if block + 1 >= self.blocks.len() {
            return Err(ControllerError::InvalidMerge { block });
        }
        Ok(self.blocks[block].len())
    }

    /// Check a block move and return its target block
    pub fn check_move_block(&self, block: usize, delta: isize) -> ControllerResult<usize> {
        move_target(block, delta, self.blocks.len())
    }

    /// Insert a block state at `block`
    pub fn insert_block(&mut self, block: usize, state: BlockState) -> ControllerResult<()> {
        self.check_insert_block(block)?;
        self.blocks.insert(block, state);
        Ok(())
    }

    /// Remove and return the block state at `block`
    pub fn remove_block(&mut self, block: usize) -> ControllerResult<BlockState> {
        self.check_block(block)?;
        Ok(self.blocks.remove(block))
    }

    /// Insert a member at `position` of `block`
    pub fn insert_member(
        &mut self,
        block: usize,
        position: usize,
        id: StateId,
    ) -> ControllerResult<()> {
        self.check_insert_member(block, position)?;
        self.blocks[block].members.insert(position, id);
        Ok(())
    }

    /// Remove and return the member at `position` of `block`
    pub fn remove_member(&mut self, block: usize, position: usize) -> ControllerResult<StateId> {
        self.check_remove_member(block, position)?;
        Ok(self.blocks[block].members.remove(position))
    }

    /// Move a member inside its block, returning its new position
    pub fn move_member(
        &mut self,
        block: usize,
        position: usize,
        delta: isize,
    ) -> ControllerResult<usize> {
        let target = self.check_move_member(block, position, delta)?;
        let members = &mut self.blocks[block].members;
        let id = members.remove(position);
        members.insert(target, id);
        Ok(target)
    }

    /// Split `block` so that members from `position` on move into `tail`,
    /// which is inserted right after it
    pub fn split(
        &mut self,
        block: usize,
        position: usize,
        mut tail: BlockState,
    ) -> ControllerResult<()> {
        self.check_split(block, position)?;
        tail.members = self.blocks[block].members.split_off(position);
        self.blocks.insert(block + 1, tail);
        Ok(())
    }

    /// Append the members of the block after `block` to it, returning the
    /// position of the first appended member
    pub fn merge(&mut self, block: usize) -> ControllerResult<usize> {
        let position = self.check_merge(block)?;
        let next = self.blocks.remove(block + 1);
        self.blocks[block].members.extend(next.members);
        Ok(position)
    }

    /// Move a whole block by `delta`, returning its new position
    pub fn move_block(&mut self, block: usize, delta: isize) -> ControllerResult<usize> {
        let target = self.check_move_block(block, delta)?;
        let state = self.blocks.remove(block);
        self.blocks.insert(target, state);
        Ok(target)
    }

    /// Set the replication status of `block`
    pub fn set_replication(
        &mut self,
        block: usize,
        replication: ReplicationStatus,
    ) -> ControllerResult<()> {
        self.check_block(block)?;
        self.blocks[block].replication = replication;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use frond_ast::Node;

    fn ids(count: usize) -> (StateId, Vec<StateId>) {
        let mut arena = Arena::new();
        let owner = arena.insert(());
        (owner, (0..count).map(|_| arena.insert(())).collect())
    }

    fn block(members: &[StateId]) -> BlockState {
        BlockState {
            replication: ReplicationStatus::Normal,
            pattern: Node::new("Pattern"),
            source: Node::new("Identifier"),
            members: members.to_vec(),
        }
    }

    #[test]
    fn test_list_insert_bounds() {
        let (owner, children) = ids(4);
        let mut list = ListInner::new(owner, "items");
        for (position, id) in children[..3].iter().enumerate() {
            list.insert(position, *id).unwrap();
        }

        assert_eq!(
            list.insert(5, children[3]),
            Err(ControllerError::IndexOutOfRange { position: 5, count: 3 })
        );
        list.insert(3, children[3]).unwrap();
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_list_remove_bounds() {
        let (owner, children) = ids(2);
        let mut list = ListInner::new(owner, "items");
        list.children = children.clone();

        assert!(list.remove(2).is_err());
        assert_eq!(list.remove(0).unwrap(), children[0]);
        assert_eq!(list.children(), &children[1..]);
    }

    #[test]
    fn test_list_move_fails_outside_range() {
        let (owner, children) = ids(3);
        let mut list = ListInner::new(owner, "items");
        list.children = children.clone();

        assert_eq!(
            list.move_item(0, -1),
            Err(ControllerError::InvalidMove { position: 0, delta: -1, count: 3 })
        );
        assert_eq!(
            list.move_item(1, 2),
            Err(ControllerError::InvalidMove { position: 1, delta: 2, count: 3 })
        );

        assert_eq!(list.move_item(0, 2).unwrap(), 2);
        assert_eq!(list.children(), &[children[1], children[2], children[0]]);
    }

    #[test]
    fn test_split_and_merge() {
        let (owner, members) = ids(4);
        let mut inner = BlockListInner::new(owner, "body");
        inner.blocks.push(block(&members));

        assert!(matches!(inner.split(0, 0, block(&[])), Err(ControllerError::InvalidSplit { .. })));
        assert!(matches!(inner.split(0, 4, block(&[])), Err(ControllerError::InvalidSplit { .. })));

        inner.split(0, 2, block(&[])).unwrap();
        assert_eq!(inner.block_count(), 2);
        assert_eq!(inner.blocks[0].members(), &members[..2]);
        assert_eq!(inner.blocks[1].members(), &members[2..]);
        assert_eq!(inner.blocks[1].pattern(), inner.blocks[0].pattern());

        assert_eq!(inner.merge(1), Err(ControllerError::InvalidMerge { block: 1 }));
        assert_eq!(inner.merge(0).unwrap(), 2);
        assert_eq!(inner.block_count(), 1);
        assert_eq!(inner.blocks[0].members(), &members[..]);
    }

    #[test]
    fn test_single_member_block_cannot_split() {
        let (owner, members) = ids(1);
        let mut inner = BlockListInner::new(owner, "body");
        inner.blocks.push(block(&members));

        assert_eq!(
            inner.check_split(0, 1),
            Err(ControllerError::InvalidSplit { block: 0, position: 1, count: 1 })
        );
    }

    #[test]
    fn test_slots_are_in_ast_order() {
        let (owner, members) = ids(3);
        let mut inner = BlockListInner::new(owner, "body");
        inner.blocks.push(block(&members[..2]));
        inner.blocks.push(block(&members[2..]));
        let inner = Inner::BlockList(inner);

        assert_eq!(
            inner.slots(),
            vec![
                (Slot::Block { block: 0, position: 0 }, members[0]),
                (Slot::Block { block: 0, position: 1 }, members[1]),
                (Slot::Block { block: 1, position: 0 }, members[2]),
            ]
        );
        assert_eq!(inner.count(), 3);
        assert_eq!(inner.child_at(Slot::Block { block: 1, position: 0 }), Some(members[2]));
        assert_eq!(inner.child_at(Slot::List(0)), None);
    }
}
