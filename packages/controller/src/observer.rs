//! # Observers
//!
//! Structural changes are published as [`Event`] values to the callbacks of
//! an [`ObserverRegistry`], synchronously and in the order the changes
//! happen. Callbacks are keyed by [`EventKind`]; wildcard callbacks see
//! every event.

use crate::arena::StateId;
use crate::index::{BrowsingIndex, InnerRef};
use frond_ast::ReplicationStatus;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Lifecycle
    NodeStateCreated {
        index: BrowsingIndex,
        state: StateId,
    },
    NodeStateInitialized {
        index: BrowsingIndex,
        state: StateId,
    },
    NodeStateRemoved {
        index: BrowsingIndex,
        state: StateId,
    },
    BlockListInnerCreated {
        inner: InnerRef,
    },
    BlockStateCreated {
        inner: InnerRef,
        block: usize,
    },
    BlockStateRemoved {
        inner: InnerRef,
        block: usize,
    },

    // Mutations
    StateInserted {
        index: BrowsingIndex,
        state: StateId,
    },
    StateRemoved {
        index: BrowsingIndex,
        state: StateId,
    },
    StateReplaced {
        index: BrowsingIndex,
        old_state: StateId,
        new_state: StateId,
    },
    StateAssigned {
        index: BrowsingIndex,
        state: StateId,
    },
    StateUnassigned {
        index: BrowsingIndex,
        state: StateId,
    },
    StateMoved {
        from: BrowsingIndex,
        to: BrowsingIndex,
        state: StateId,
    },
    BlockStateInserted {
        inner: InnerRef,
        block: usize,
    },
    BlockStateMoved {
        inner: InnerRef,
        from: usize,
        to: usize,
    },
    BlockSplit {
        inner: InnerRef,
        block: usize,
        position: usize,
    },
    BlocksMerged {
        inner: InnerRef,
        block: usize,
        position: usize,
    },
    BlockReplicationChanged {
        inner: InnerRef,
        block: usize,
        replication: ReplicationStatus,
    },
    ValueChanged {
        state: StateId,
        property: String,
    },
    StateRefreshed {
        state: StateId,
    },
}

/// Discriminant of an [`Event`], used to key callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NodeStateCreated,
    NodeStateInitialized,
    NodeStateRemoved,
    BlockListInnerCreated,
    BlockStateCreated,
    BlockStateRemoved,
    StateInserted,
    StateRemoved,
    StateReplaced,
    StateAssigned,
    StateUnassigned,
    StateMoved,
    BlockStateInserted,
    BlockStateMoved,
    BlockSplit,
    BlocksMerged,
    BlockReplicationChanged,
    ValueChanged,
    StateRefreshed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NodeStateCreated { .. } => EventKind::NodeStateCreated,
            Event::NodeStateInitialized { .. } => EventKind::NodeStateInitialized,
            Event::NodeStateRemoved { .. } => EventKind::NodeStateRemoved,
            Event::BlockListInnerCreated { .. } => EventKind::BlockListInnerCreated,
            Event::BlockStateCreated { .. } => EventKind::BlockStateCreated,
            Event::BlockStateRemoved { .. } => EventKind::BlockStateRemoved,
            Event::StateInserted { .. } => EventKind::StateInserted,
            Event::StateRemoved { .. } => EventKind::StateRemoved,
            Event::StateReplaced { .. } => EventKind::StateReplaced,
            Event::StateAssigned { .. } => EventKind::StateAssigned,
            Event::StateUnassigned { .. } => EventKind::StateUnassigned,
            Event::StateMoved { .. } => EventKind::StateMoved,
            Event::BlockStateInserted { .. } => EventKind::BlockStateInserted,
            Event::BlockStateMoved { .. } => EventKind::BlockStateMoved,
            Event::BlockSplit { .. } => EventKind::BlockSplit,
            Event::BlocksMerged { .. } => EventKind::BlocksMerged,
            Event::BlockReplicationChanged { .. } => EventKind::BlockReplicationChanged,
            Event::ValueChanged { .. } => EventKind::ValueChanged,
            Event::StateRefreshed { .. } => EventKind::StateRefreshed,
        }
    }

    /// Whether this event is part of the creation/removal lifecycle rather
    /// than a mutation notification
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::NodeStateCreated
                | EventKind::NodeStateInitialized
                | EventKind::NodeStateRemoved
                | EventKind::BlockListInnerCreated
                | EventKind::BlockStateCreated
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::NodeStateCreated { index, state }
            | Event::NodeStateInitialized { index, state }
            | Event::NodeStateRemoved { index, state }
            | Event::StateInserted { index, state }
            | Event::StateRemoved { index, state }
            | Event::StateAssigned { index, state }
            | Event::StateUnassigned { index, state } => {
                write!(f, "{:?} {} at {}", self.kind(), state, index)
            }
            Event::StateReplaced {
                index,
                old_state,
                new_state,
            } => write!(f, "StateReplaced {} -> {} at {}", old_state, new_state, index),
            Event::StateMoved { from, to, state } => {
                write!(f, "StateMoved {} {} -> {}", state, from, to)
            }
            Event::BlockListInnerCreated { inner } => {
                write!(f, "BlockListInnerCreated {}.{}", inner.owner, inner.property)
            }
            Event::BlockStateCreated { inner, block }
            | Event::BlockStateRemoved { inner, block }
            | Event::BlockStateInserted { inner, block } => {
                write!(f, "{:?} {}.{}[{}]", self.kind(), inner.owner, inner.property, block)
            }
            Event::BlockStateMoved { inner, from, to } => write!(
                f,
                "BlockStateMoved {}.{}[{}] -> [{}]",
                inner.owner, inner.property, from, to
            ),
            Event::BlockSplit {
                inner,
                block,
                position,
            }
            | Event::BlocksMerged {
                inner,
                block,
                position,
            } => write!(
                f,
                "{:?} {}.{}[{}] at {}",
                self.kind(),
                inner.owner,
                inner.property,
                block,
                position
            ),
            Event::BlockReplicationChanged {
                inner,
                block,
                replication,
            } => write!(
                f,
                "BlockReplicationChanged {}.{}[{}] to {:?}",
                inner.owner, inner.property, block, replication
            ),
            Event::ValueChanged { state, property } => {
                write!(f, "ValueChanged {}.{}", state, property)
            }
            Event::StateRefreshed { state } => write!(f, "StateRefreshed {}", state),
        }
    }
}

pub type Callback = Box<dyn FnMut(&Event)>;

/// Callback table passed to the controller at construction
#[derive(Default)]
pub struct ObserverRegistry {
    by_kind: HashMap<EventKind, Vec<Callback>>,
    any: Vec<Callback>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one kind of event
    pub fn on(&mut self, kind: EventKind, callback: impl FnMut(&Event) + 'static) -> &mut Self {
        self.by_kind
            .entry(kind)
            .or_default()
            .push(Box::new(callback));
        self
    }

    /// Register a callback for every event
    pub fn on_any(&mut self, callback: impl FnMut(&Event) + 'static) -> &mut Self {
        self.any.push(Box::new(callback));
        self
    }

    /// Call every matching callback, keyed ones first, in registration order
    pub fn dispatch(&mut self, event: &Event) {
        if let Some(callbacks) = self.by_kind.get_mut(&event.kind()) {
            for callback in callbacks.iter_mut() {
                callback(event);
            }
        }
        for callback in self.any.iter_mut() {
            callback(event);
        }
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.any.len() + self.by_kind.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .field("callbacks", &self.len())
            .finish()
    }
}

/// Shared recorder of dispatched events
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this log as a wildcard callback of `registry`
    pub fn record(&self, registry: &mut ObserverRegistry) {
        let events = Rc::clone(&self.events);
        registry.on_any(move |event| events.borrow_mut().push(event.clone()));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(Event::kind).collect()
    }

    /// Number of recorded events of `kind`
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn refreshed() -> Event {
        let mut arena = Arena::new();
        Event::StateRefreshed {
            state: arena.insert(()),
        }
    }

    #[test]
    fn test_keyed_and_wildcard_dispatch() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ObserverRegistry::new();

        let keyed = Rc::clone(&hits);
        registry.on(EventKind::StateRefreshed, move |_| keyed.borrow_mut().push("keyed"));
        let other = Rc::clone(&hits);
        registry.on(EventKind::StateInserted, move |_| other.borrow_mut().push("other"));
        let any = Rc::clone(&hits);
        registry.on_any(move |_| any.borrow_mut().push("any"));

        registry.dispatch(&refreshed());
        assert_eq!(*hits.borrow(), vec!["keyed", "any"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_event_log() {
        let log = EventLog::new();
        let mut registry = ObserverRegistry::new();
        log.record(&mut registry);

        registry.dispatch(&refreshed());
        registry.dispatch(&refreshed());

        assert_eq!(log.len(), 2);
        assert_eq!(log.count(EventKind::StateRefreshed), 2);
        assert_eq!(log.count(EventKind::StateMoved), 0);

        log.clear();
        assert!(log.is_empty());
    }
}
