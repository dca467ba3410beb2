use crate::helper::PropertyKind;
use thiserror::Error;

pub type AstResult<T> = Result<T, AstError>;

/// Shape violations reported by an [`AstHelper`](crate::AstHelper)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AstError {
    #[error("Node `{kind}` has no property `{property}`")]
    MissingProperty { kind: String, property: String },

    #[error("Property `{property}` of `{kind}` is {found:?}, expected {expected:?}")]
    UnexpectedKind {
        kind: String,
        property: String,
        expected: PropertyKind,
        found: PropertyKind,
    },

    #[error("Unknown node kind: {0}")]
    UnknownKind(String),

    #[error("Block {block} of `{kind}.{property}` has no members")]
    EmptyBlock {
        kind: String,
        property: String,
        block: usize,
    },

    #[error("Property `{property}` of `{parent}` does not accept `{child}`")]
    Rejected {
        parent: String,
        property: String,
        child: String,
    },
}

impl AstError {
    pub fn missing(kind: impl Into<String>, property: impl Into<String>) -> Self {
        Self::MissingProperty {
            kind: kind.into(),
            property: property.into(),
        }
    }

    pub fn unexpected(
        kind: impl Into<String>,
        property: impl Into<String>,
        expected: PropertyKind,
        found: PropertyKind,
    ) -> Self {
        Self::UnexpectedKind {
            kind: kind.into(),
            property: property.into(),
            expected,
            found,
        }
    }
}
