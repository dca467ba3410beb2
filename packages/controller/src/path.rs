//! Root-relative addresses.
//!
//! Operations cannot hold state handles: undoing a removal rebuilds the
//! removed states under fresh handles. A [`NodePath`] names a node by the
//! slots walked from the root instead, which stays valid as long as
//! operations are replayed in order.

use crate::index::Slot;
use crate::errors::ControllerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub property: String,
    pub slot: Slot,
}

/// Sequence of slots from the root to a node; empty for the root itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(pub Vec<PathStep>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, property: impl Into<String>, slot: Slot) -> Self {
        let mut steps = self.0.clone();
        steps.push(PathStep {
            property: property.into(),
            slot,
        });
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the owner of the last step, `None` for the root
    pub fn parent(&self) -> Option<NodePath> {
        self.0
            .split_last()
            .map(|(_, parent)| NodePath(parent.to_vec()))
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.0.last()
    }
}

fn parse_step(segment: &str) -> Option<PathStep> {
    let step = |property: &str, slot| {
        (!property.is_empty()).then(|| PathStep {
            property: property.to_string(),
            slot,
        })
    };

    if let Some(property) = segment.strip_suffix('?') {
        return step(property, Slot::Optional);
    }

    let (property, rest) = match segment.split_once('[') {
        Some(split) => split,
        None => return step(segment, Slot::Placeholder),
    };
    let inside = rest.strip_suffix(']')?;
    let slot = match inside.split_once(':') {
        Some((block, position)) => Slot::Block {
            block: block.parse().ok()?,
            position: position.parse().ok()?,
        },
        None => Slot::List(inside.parse().ok()?),
    };
    step(property, slot)
}

/// Parses the `Display` form, e.g. `/features[2]/body[0:1]/base?/type`
impl FromStr for NodePath {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok(NodePath::root());
        }

        trimmed
            .split('/')
            .map(|segment| {
                parse_step(segment).ok_or_else(|| {
                    ControllerError::invalid_index(format!("bad path segment `{}` in `{}`", segment, s))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(NodePath)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for step in &self.0 {
            write!(f, "/{}{}", step.property, step.slot)?;
        }
        Ok(())
    }
}

/// Address of an inner: the path of its owner and the property name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InnerPath {
    pub owner: NodePath,
    pub property: String,
}

impl InnerPath {
    pub fn new(owner: NodePath, property: impl Into<String>) -> Self {
        Self {
            owner,
            property: property.into(),
        }
    }

    /// Path of the node at `slot` of this inner
    pub fn child(&self, slot: Slot) -> NodePath {
        self.owner.child(self.property.clone(), slot)
    }
}

impl fmt::Display for InnerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner.is_root() {
            write!(f, "/{}", self.property)
        } else {
            write!(f, "{}/{}", self.owner, self.property)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let path = NodePath::root()
            .child("features", Slot::List(2))
            .child("body", Slot::Block { block: 0, position: 1 })
            .child("type", Slot::Placeholder);

        assert_eq!(path.to_string(), "/features[2]/body[0:1]/type");
        assert_eq!(NodePath::root().to_string(), "/");
        assert_eq!(InnerPath::new(NodePath::root(), "items").to_string(), "/items");
    }

    #[test]
    fn test_parse() {
        let text = "/features[2]/body[0:1]/base?/type";
        let path: NodePath = text.parse().unwrap();

        assert_eq!(path.depth(), 4);
        assert_eq!(path.steps()[2].slot, Slot::Optional);
        assert_eq!(path.to_string(), text);
        assert_eq!(path.parent().unwrap().to_string(), "/features[2]/body[0:1]/base?");
        assert_eq!(path.last().unwrap().property, "type");

        assert_eq!("/".parse::<NodePath>().unwrap(), NodePath::root());
        assert!(NodePath::root().parent().is_none());
        assert!("/items[x]".parse::<NodePath>().is_err());
        assert!("/[0]".parse::<NodePath>().is_err());
        assert!("/items[1".parse::<NodePath>().is_err());
    }

    #[test]
    fn test_json_form() {
        let path = NodePath::root().child("items", Slot::List(0));
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"[{"property":"items","slot":{"list":0}}]"#);

        let back: NodePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
