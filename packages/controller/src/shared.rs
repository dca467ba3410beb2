//! Shared controller handle.
//!
//! Observers run while the controller is mid-mutation. A handle captured by
//! an observer can read nothing and change nothing until the mutation
//! returns: every access goes through the same `RefCell`, and a nested
//! access fails with [`ControllerError::ReentrantMutation`] instead of
//! interleaving with the edit in flight.

use crate::arena::StateId;
use crate::controller::Controller;
use crate::errors::{ControllerError, ControllerResult};
use crate::index::{BrowsingIndex, InsertionIndex};
use crate::observer::{Event, EventKind};
use frond_ast::{AstHelper, Leaf, Node, ReflectHelper};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub struct SharedController<H: AstHelper = ReflectHelper> {
    inner: Rc<RefCell<Controller<H>>>,
}

impl<H: AstHelper> Clone for SharedController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: AstHelper> SharedController<H> {
    pub fn new(controller: Controller<H>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(controller)),
        }
    }

    /// Handle that does not keep the controller alive; give this to
    /// observers so the controller and its callbacks do not form a cycle
    pub fn downgrade(&self) -> WeakController<H> {
        WeakController {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&Controller<H>) -> R) -> ControllerResult<R> {
        let controller = self
            .inner
            .try_borrow()
            .map_err(|_| ControllerError::ReentrantMutation)?;
        Ok(f(&controller))
    }

    pub fn write<R>(
        &self,
        f: impl FnOnce(&mut Controller<H>) -> ControllerResult<R>,
    ) -> ControllerResult<R> {
        let mut controller = self
            .inner
            .try_borrow_mut()
            .map_err(|_| ControllerError::ReentrantMutation)?;
        f(&mut controller)
    }

    pub fn on(&self, kind: EventKind, callback: impl FnMut(&Event) + 'static) -> ControllerResult<()> {
        self.write(|controller| {
            controller.observers_mut().on(kind, callback);
            Ok(())
        })
    }

    pub fn insert(&self, index: InsertionIndex) -> ControllerResult<BrowsingIndex> {
        self.write(|controller| controller.insert(index))
    }

    pub fn remove(&self, index: &BrowsingIndex) -> ControllerResult<()> {
        self.write(|controller| controller.remove(index))
    }

    pub fn replace(&self, index: &BrowsingIndex, node: Node) -> ControllerResult<()> {
        self.write(|controller| controller.replace(index, node))
    }

    pub fn move_state(&self, index: &BrowsingIndex, delta: isize) -> ControllerResult<()> {
        self.write(|controller| controller.move_state(index, delta))
    }

    pub fn assign(&self, index: &BrowsingIndex, node: Option<Node>) -> ControllerResult<()> {
        self.write(|controller| controller.assign(index, node))
    }

    pub fn unassign(&self, index: &BrowsingIndex) -> ControllerResult<()> {
        self.write(|controller| controller.unassign(index))
    }

    pub fn set_value(&self, state: StateId, property: &str, value: impl Into<Leaf>) -> ControllerResult<()> {
        self.write(|controller| controller.set_value(state, property, value))
    }

    pub fn undo(&self) -> ControllerResult<bool> {
        self.write(|controller| controller.undo())
    }

    pub fn redo(&self) -> ControllerResult<bool> {
        self.write(|controller| controller.redo())
    }
}

/// Non-owning [`SharedController`]
pub struct WeakController<H: AstHelper = ReflectHelper> {
    inner: Weak<RefCell<Controller<H>>>,
}

impl<H: AstHelper> Clone for WeakController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<H: AstHelper> WeakController<H> {
    /// `None` once the controller is dropped
    pub fn upgrade(&self) -> Option<SharedController<H>> {
        self.inner.upgrade().map(|inner| SharedController { inner })
    }
}
