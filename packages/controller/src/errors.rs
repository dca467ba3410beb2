//! Error types for the controller

use frond_ast::AstError;
use thiserror::Error;

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Position {position} is out of range (count {count})")]
    IndexOutOfRange { position: usize, count: usize },

    #[error("Cannot move item at {position} by {delta} (count {count})")]
    InvalidMove {
        position: usize,
        delta: isize,
        count: usize,
    },

    #[error("Cannot split block {block} at {position} ({count} members)")]
    InvalidSplit {
        block: usize,
        position: usize,
        count: usize,
    },

    #[error("Block {block} has no following block to merge with")]
    InvalidMerge { block: usize },

    #[error("Structural mismatch: {0}")]
    StructuralMismatch(#[from] AstError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Mutation attempted while another one is in flight")]
    ReentrantMutation,

    #[error("Operation group has no operations")]
    EmptyOperationGroup,

    #[error("An operation batch is in progress")]
    BatchInProgress,

    #[error("No operation batch is in progress")]
    NoBatch,
}

impl ControllerError {
    pub(crate) fn invalid_index(message: impl Into<String>) -> Self {
        Self::InvalidIndex(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
