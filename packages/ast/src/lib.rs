//! # Frond AST
//!
//! Generic AST model and the helper contract the state tree uses to read
//! and write it.
//!
//! The state tree treats nodes as opaque: it asks an [`AstHelper`] which
//! child-bearing properties a node has and reaches them only through the
//! helper's accessors. [`ReflectHelper`] works from the runtime values,
//! [`SchemaHelper`] checks them against a declared [`Schema`].

pub mod error;
pub mod helper;
pub mod node;
pub mod visitor;

pub use error::{AstError, AstResult};
pub use helper::{
    AstHelper, PropertyKind, PropertySchema, PropertyShape, ReflectHelper, Schema, SchemaHelper,
};
pub use node::{Block, Leaf, Node, OptionalChild, Property, ReplicationStatus};
pub use visitor::{walk_block, walk_node, walk_property, Visitor};
