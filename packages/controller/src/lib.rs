//! # Frond Controller
//!
//! Mutable state tree mirroring an AST, with undoable structural edits and
//! change notifications.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ frond-ast: Node / Block / AstHelper         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ controller: document + state tree           │
//! │  - One NodeState per AST node               │
//! │  - Inners per child-bearing property        │
//! │  - BrowsingIndex → StateId map              │
//! │  - Edits validated, applied, recorded       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ observers: lifecycle + structural events    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **AST is source of truth**: states mirror it and never diverge
//! 2. **Validate before mutating**: a rejected edit changes nothing
//! 3. **Edits are addressed by path**: recorded groups stay valid after the
//!    states they touched are gone
//! 4. **Every edit is undoable**: each command records its own inverse
//!
//! ## Usage
//!
//! ```rust,ignore
//! use frond_ast::Node;
//! use frond_controller::{Controller, InsertionIndex};
//!
//! let doc = Node::new("Class").with_list("features", vec![]);
//! let mut controller = Controller::from_document(doc)?;
//!
//! let root = controller.root();
//! controller.insert(InsertionIndex::list(root, "features", 0, Node::new("Method")))?;
//! controller.undo()?;
//! ```

mod arena;
mod browse;
mod config;
mod controller;
mod errors;
mod history;
mod index;
mod inner;
mod observer;
mod operation;
mod path;
mod shared;
mod state;
mod tree;

pub use arena::StateId;
pub use browse::{browse, descend, validate, InnerBrowse};
pub use config::{ControllerConfig, DEFAULT_CONFIG_NAME};
pub use controller::Controller;
pub use errors::{ConfigError, ControllerError, ControllerResult};
pub use history::{Batch, UndoStack};
pub use index::{BrowsingIndex, InnerRef, InsertionIndex, Slot};
pub use inner::{BlockListInner, Inner, ListInner, SingleInner};
pub use observer::{Callback, Event, EventKind, EventLog, ObserverRegistry};
pub use operation::{BlockHeader, Edit, Operation, OperationGroup, Refresh};
pub use path::{InnerPath, NodePath, PathStep};
pub use shared::{SharedController, WeakController};
pub use state::{BlockState, Lifecycle, NodeState};

// Re-export the AST model for convenience
pub use frond_ast::{AstHelper, Block, Leaf, Node, ReflectHelper, ReplicationStatus, Schema, SchemaHelper};
