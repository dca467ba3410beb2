//! State table bookkeeping shared by every controller command: building
//! states from AST nodes, tearing them down, and keeping the global
//! `BrowsingIndex -> StateId` map in step with inner positions.

use crate::arena::{Arena, StateId};
use crate::browse::{browse, InnerBrowse};
use crate::errors::{ControllerError, ControllerResult};
use crate::index::{BrowsingIndex, InnerRef, Slot};
use crate::inner::{BlockListInner, Inner, ListInner, SingleInner};
use crate::observer::{Event, ObserverRegistry};
use crate::state::{BlockState, Lifecycle, NodeState};
use frond_ast::{AstHelper, Node};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug)]
pub(crate) struct StateTree {
    pub(crate) states: Arena<NodeState>,
    pub(crate) index_map: HashMap<BrowsingIndex, StateId>,
    pub(crate) observers: ObserverRegistry,
    held: Option<Vec<Event>>,
}

impl StateTree {
    pub fn new(observers: ObserverRegistry) -> Self {
        Self {
            states: Arena::new(),
            index_map: HashMap::new(),
            observers,
            held: None,
        }
    }

    pub fn emit(&mut self, event: Event) {
        match &mut self.held {
            Some(held) => held.push(event),
            None => {
                trace!(event = %event, "Dispatching event");
                self.observers.dispatch(&event);
            }
        }
    }

    /// Queue events instead of dispatching them until `release_held` or
    /// `discard_held`
    pub fn hold_events(&mut self) {
        self.held.get_or_insert_with(Vec::new);
    }

    /// Dispatch the queued events in order
    pub fn release_held(&mut self) {
        for event in self.held.take().unwrap_or_default() {
            self.emit(event);
        }
    }

    /// Drop the queued events, returning how many there were
    pub fn discard_held(&mut self) -> usize {
        self.held.take().map_or(0, |held| held.len())
    }

    pub fn get(&self, id: StateId) -> Option<&NodeState> {
        self.states.get(id)
    }

    /// State behind a handle. A handle whose state was removed is
    /// `InvalidState`; one that never named a state is `InvalidIndex`.
    pub fn live(&self, id: StateId) -> ControllerResult<&NodeState> {
        match self.states.get(id) {
            Some(state) => Ok(state),
            None if self.states.is_stale(id) => Err(ControllerError::invalid_state(format!(
                "state {} was removed",
                id
            ))),
            None => Err(ControllerError::invalid_index(format!(
                "state {} does not exist",
                id
            ))),
        }
    }

    /// State that must be live; a miss is an invariant breach
    pub fn expect(&self, id: StateId) -> &NodeState {
        match self.states.get(id) {
            Some(state) => state,
            None => panic!("State {} is referenced but not live", id),
        }
    }

    fn expect_mut(&mut self, id: StateId) -> &mut NodeState {
        match self.states.get_mut(id) {
            Some(state) => state,
            None => panic!("State {} is referenced but not live", id),
        }
    }

    pub fn set_lifecycle(&mut self, id: StateId, lifecycle: Lifecycle) {
        self.expect_mut(id).lifecycle = lifecycle;
    }

    pub fn inner(&self, owner: StateId, property: &str) -> ControllerResult<&Inner> {
        let state = self.live(owner)?;
        state.inner(property).ok_or_else(|| {
            ControllerError::invalid_index(format!(
                "state {} has no child property `{}`",
                owner, property
            ))
        })
    }

    pub fn inner_mut(&mut self, owner: StateId, property: &str) -> ControllerResult<&mut Inner> {
        self.live(owner)?;
        let state = self.expect_mut(owner);
        state.inners.get_mut(property).ok_or_else(|| {
            ControllerError::invalid_index(format!(
                "state {} has no child property `{}`",
                owner, property
            ))
        })
    }

    pub fn block_list_mut(
        &mut self,
        owner: StateId,
        property: &str,
    ) -> ControllerResult<&mut BlockListInner> {
        self.inner_mut(owner, property)?
            .as_block_list_mut()
            .ok_or_else(|| {
                ControllerError::invalid_index(format!("`{}` is not a block list", property))
            })
    }

    fn list_mut(&mut self, owner: StateId, property: &str) -> ControllerResult<&mut ListInner> {
        self.inner_mut(owner, property)?
            .as_list_mut()
            .ok_or_else(|| ControllerError::invalid_index(format!("`{}` is not a list", property)))
    }

    /// Arena slot for a new state; registration happens separately
    pub fn allocate(&mut self, index: BrowsingIndex) -> StateId {
        self.states.insert(NodeState::new(index))
    }

    pub fn register(&mut self, id: StateId) {
        let index = self.expect(id).index.clone();
        self.index_map.insert(index, id);
    }

    /// Allocate, register and initialize a state for `node`
    pub fn create<H: AstHelper>(
        &mut self,
        helper: &H,
        index: BrowsingIndex,
        node: Option<&Node>,
    ) -> ControllerResult<StateId> {
        let id = self.allocate(index);
        self.register(id);
        self.initialize(helper, id, node)?;
        Ok(id)
    }

    /// Announce a registered state and build its inners. `None` leaves it as
    /// an unassigned optional slot.
    pub fn initialize<H: AstHelper>(
        &mut self,
        helper: &H,
        id: StateId,
        node: Option<&Node>,
    ) -> ControllerResult<()> {
        let index = self.expect(id).index.clone();
        self.emit(Event::NodeStateCreated {
            index: index.clone(),
            state: id,
        });

        match node {
            Some(node) => {
                self.populate(helper, id, node)?;
                self.set_lifecycle(id, Lifecycle::Initialized);
            }
            None => self.set_lifecycle(id, Lifecycle::Unassigned),
        }

        self.emit(Event::NodeStateInitialized { index, state: id });
        Ok(())
    }

    /// Create one inner per child-bearing property of `node`, recursively
    pub fn populate<H: AstHelper>(
        &mut self,
        helper: &H,
        id: StateId,
        node: &Node,
    ) -> ControllerResult<()> {
        for inner in browse(helper, node)? {
            let property = inner.property();
            match inner {
                InnerBrowse::Placeholder { child, .. } => {
                    let index = BrowsingIndex::new(id, property, Slot::Placeholder);
                    let child = self.create(helper, index, Some(child))?;
                    self.insert_inner(
                        id,
                        Inner::Placeholder(SingleInner {
                            owner: id,
                            property: property.to_string(),
                            child,
                        }),
                    );
                }
                InnerBrowse::Optional { item, .. } => {
                    let index = BrowsingIndex::new(id, property, Slot::Optional);
                    let child = self.create(helper, index, item)?;
                    self.insert_inner(
                        id,
                        Inner::Optional(SingleInner {
                            owner: id,
                            property: property.to_string(),
                            child,
                        }),
                    );
                }
                InnerBrowse::List { children, .. } => {
                    self.insert_inner(id, Inner::List(ListInner::new(id, property)));
                    for (position, child) in children.iter().enumerate() {
                        let index = BrowsingIndex::new(id, property, Slot::List(position));
                        let child = self.create(helper, index, Some(child))?;
                        self.list_mut(id, property)?.children.push(child);
                    }
                }
                InnerBrowse::BlockList { blocks, .. } => {
                    let inner = InnerRef::new(id, property);
                    self.insert_inner(id, Inner::BlockList(BlockListInner::new(id, property)));
                    self.emit(Event::BlockListInnerCreated {
                        inner: inner.clone(),
                    });

                    for (block, content) in blocks.iter().enumerate() {
                        self.block_list_mut(id, property)?
                            .blocks
                            .push(BlockState::from_block(content));
                        self.emit(Event::BlockStateCreated {
                            inner: inner.clone(),
                            block,
                        });

                        for (position, member) in content.nodes.iter().enumerate() {
                            let index =
                                BrowsingIndex::new(id, property, Slot::Block { block, position });
                            let member = self.create(helper, index, Some(member))?;
                            self.block_list_mut(id, property)?.blocks[block]
                                .members
                                .push(member);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn insert_inner(&mut self, owner: StateId, inner: Inner) {
        let property = inner.property().to_string();
        self.expect_mut(owner).inners.insert(property, inner);
    }

    pub fn take_inners(&mut self, id: StateId) -> IndexMap<String, Inner> {
        std::mem::take(&mut self.expect_mut(id).inners)
    }

    /// Tear down a state and all its descendants, children first
    pub fn destroy(&mut self, id: StateId) {
        for inner in self.take_inners(id).into_values() {
            self.release(inner);
        }

        let state = match self.states.remove(id) {
            Some(state) => state,
            None => panic!("State {} was removed twice", id),
        };
        // Only drop the key if no shifted sibling took it over already
        if self.index_map.get(&state.index) == Some(&id) {
            self.index_map.remove(&state.index);
        }

        self.emit(Event::NodeStateRemoved {
            index: state.index,
            state: id,
        });
    }

    /// Destroy every child state held by a detached inner
    pub fn release(&mut self, inner: Inner) {
        match inner {
            Inner::BlockList(blocks) => {
                let owner = InnerRef::new(blocks.owner, blocks.property);
                for (block, content) in blocks.blocks.into_iter().enumerate() {
                    for member in content.members {
                        self.destroy(member);
                    }
                    self.emit(Event::BlockStateRemoved {
                        inner: owner.clone(),
                        block,
                    });
                }
            }
            other => {
                for child in other.children() {
                    self.destroy(child);
                }
            }
        }
    }

    /// Re-key every child of an inner after its positions shifted
    pub fn reindex(&mut self, owner: StateId, property: &str) {
        let slots = match self.states.get(owner).and_then(|state| state.inner(property)) {
            Some(inner) => inner.slots(),
            None => return,
        };

        // Drop stale keys first so a key moving between siblings is not lost
        for (slot, id) in &slots {
            let expected = BrowsingIndex::new(owner, property, *slot);
            let state = self.expect_mut(*id);
            if state.index != expected {
                let stale = std::mem::replace(&mut state.index, expected);
                if self.index_map.get(&stale) == Some(id) {
                    self.index_map.remove(&stale);
                }
            }
        }

        for (slot, id) in slots {
            self.index_map
                .insert(BrowsingIndex::new(owner, property, slot), id);
        }
    }

    /// Replay the creation events of a subtree into `registry`
    pub fn replay_creation(&self, id: StateId, registry: &mut ObserverRegistry) {
        let state = self.expect(id);
        registry.dispatch(&Event::NodeStateCreated {
            index: state.index.clone(),
            state: id,
        });

        for inner in state.inners() {
            match inner {
                Inner::BlockList(blocks) => {
                    let owner = InnerRef::new(blocks.owner, blocks.property.clone());
                    registry.dispatch(&Event::BlockListInnerCreated {
                        inner: owner.clone(),
                    });
                    for (block, content) in blocks.blocks.iter().enumerate() {
                        registry.dispatch(&Event::BlockStateCreated {
                            inner: owner.clone(),
                            block,
                        });
                        for member in content.members() {
                            self.replay_creation(*member, registry);
                        }
                    }
                }
                other => {
                    for child in other.children() {
                        self.replay_creation(child, registry);
                    }
                }
            }
        }

        registry.dispatch(&Event::NodeStateInitialized {
            index: state.index.clone(),
            state: id,
        });
    }

    /// Replay the removal events of a subtree into `registry`
    pub fn replay_removal(&self, id: StateId, registry: &mut ObserverRegistry) {
        let state = self.expect(id);

        for inner in state.inners() {
            match inner {
                Inner::BlockList(blocks) => {
                    let owner = InnerRef::new(blocks.owner, blocks.property.clone());
                    for (block, content) in blocks.blocks.iter().enumerate() {
                        for member in content.members() {
                            self.replay_removal(*member, registry);
                        }
                        registry.dispatch(&Event::BlockStateRemoved {
                            inner: owner.clone(),
                            block,
                        });
                    }
                }
                other => {
                    for child in other.children() {
                        self.replay_removal(child, registry);
                    }
                }
            }
        }

        registry.dispatch(&Event::NodeStateRemoved {
            index: state.index.clone(),
            state: id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventKind, EventLog};
    use frond_ast::{Block, ReflectHelper};

    fn tree_with_log() -> (StateTree, EventLog) {
        let log = EventLog::new();
        let mut observers = ObserverRegistry::new();
        log.record(&mut observers);
        (StateTree::new(observers), log)
    }

    #[test]
    fn test_create_registers_every_state() {
        let (mut tree, log) = tree_with_log();
        let node = Node::new("Root")
            .with_child("head", Node::new("Head"))
            .with_optional("tail", None)
            .with_list("items", vec![Node::new("A"), Node::new("B")]);

        let root = tree.create(&ReflectHelper, BrowsingIndex::Root, Some(&node)).unwrap();

        // root, head, tail slot, A, B
        assert_eq!(tree.states.len(), 5);
        assert_eq!(tree.index_map.len(), 5);
        assert_eq!(tree.index_map[&BrowsingIndex::Root], root);
        assert_eq!(log.count(EventKind::NodeStateCreated), 5);
        assert_eq!(log.count(EventKind::NodeStateInitialized), 5);

        let tail = tree.inner(root, "tail").unwrap().children()[0];
        assert_eq!(tree.expect(tail).lifecycle(), Lifecycle::Unassigned);
    }

    #[test]
    fn test_destroy_is_children_first() {
        let (mut tree, log) = tree_with_log();
        let node = Node::new("Root").with_blocks(
            "body",
            vec![Block::simple(vec![Node::new("A").with_child("x", Node::new("X"))])],
        );
        let root = tree.create(&ReflectHelper, BrowsingIndex::Root, Some(&node)).unwrap();
        log.clear();

        tree.destroy(root);

        assert_eq!(tree.states.len(), 0);
        assert!(tree.index_map.is_empty());
        assert_eq!(
            log.kinds(),
            vec![
                EventKind::NodeStateRemoved,
                EventKind::NodeStateRemoved,
                EventKind::BlockStateRemoved,
                EventKind::NodeStateRemoved,
            ]
        );
    }

    #[test]
    fn test_reindex_after_shift() {
        let (mut tree, _log) = tree_with_log();
        let node = Node::new("Root").with_list("items", vec![Node::new("A"), Node::new("B")]);
        let root = tree.create(&ReflectHelper, BrowsingIndex::Root, Some(&node)).unwrap();

        let fresh = tree.allocate(BrowsingIndex::new(root, "items", Slot::List(0)));
        tree.list_mut(root, "items").unwrap().insert(0, fresh).unwrap();
        tree.reindex(root, "items");

        let children = tree.inner(root, "items").unwrap().children();
        for (position, id) in children.iter().enumerate() {
            let index = BrowsingIndex::new(root, "items", Slot::List(position));
            assert_eq!(tree.index_map[&index], *id);
            assert_eq!(tree.expect(*id).index(), &index);
        }
        assert_eq!(tree.index_map.len(), 4);
    }
}
