//! # AST Helper Contract
//!
//! The state tree never touches node properties directly. Every shape
//! query, read and write goes through an [`AstHelper`], so a host can plug
//! in its own notion of which properties exist and what they accept.
//!
//! Two helpers are provided:
//! - [`ReflectHelper`]: trusts the runtime value of each property
//! - [`SchemaHelper`]: checks nodes against a declared [`Schema`]

use crate::error::{AstError, AstResult};
use crate::node::{Block, Leaf, Node, OptionalChild, Property};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a node property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    Value,
    Placeholder,
    Optional,
    List,
    BlockList,
}

impl PropertyKind {
    pub fn of(property: &Property) -> Self {
        match property {
            Property::Value(_) => PropertyKind::Value,
            Property::Child(_) => PropertyKind::Placeholder,
            Property::Optional(_) => PropertyKind::Optional,
            Property::List(_) => PropertyKind::List,
            Property::BlockList(_) => PropertyKind::BlockList,
        }
    }

    pub fn is_child_bearing(self) -> bool {
        !matches!(self, PropertyKind::Value)
    }
}

/// A child-bearing property as reported by [`AstHelper::shape`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyShape {
    pub name: String,
    pub kind: PropertyKind,
}

/// Collaborator contract between the state tree and the AST
pub trait AstHelper {
    /// Child-bearing properties of `node`, in declaration order
    fn shape(&self, node: &Node) -> AstResult<Vec<PropertyShape>>;

    /// Check that `child` may be stored under `property` of `parent`
    fn accepts(&self, parent: &Node, property: &str, child: &Node) -> AstResult<()>;

    fn child<'a>(&self, node: &'a Node, property: &str) -> AstResult<&'a Node> {
        match lookup(node, property)? {
            Property::Child(child) => Ok(&**child),
            other => Err(mismatch(node, property, PropertyKind::Placeholder, other)),
        }
    }

    fn child_mut<'a>(&self, node: &'a mut Node, property: &str) -> AstResult<&'a mut Node> {
        let kind = node.kind.clone();
        match lookup_mut(node, property)? {
            Property::Child(child) => Ok(&mut **child),
            other => Err(mismatch_kind(&kind, property, PropertyKind::Placeholder, other)),
        }
    }

    fn optional<'a>(&self, node: &'a Node, property: &str) -> AstResult<&'a OptionalChild> {
        match lookup(node, property)? {
            Property::Optional(optional) => Ok(optional),
            other => Err(mismatch(node, property, PropertyKind::Optional, other)),
        }
    }

    fn optional_mut<'a>(
        &self,
        node: &'a mut Node,
        property: &str,
    ) -> AstResult<&'a mut OptionalChild> {
        let kind = node.kind.clone();
        match lookup_mut(node, property)? {
            Property::Optional(optional) => Ok(optional),
            other => Err(mismatch_kind(&kind, property, PropertyKind::Optional, other)),
        }
    }

    fn list<'a>(&self, node: &'a Node, property: &str) -> AstResult<&'a [Node]> {
        match lookup(node, property)? {
            Property::List(children) => Ok(children.as_slice()),
            other => Err(mismatch(node, property, PropertyKind::List, other)),
        }
    }

    fn list_mut<'a>(&self, node: &'a mut Node, property: &str) -> AstResult<&'a mut Vec<Node>> {
        let kind = node.kind.clone();
        match lookup_mut(node, property)? {
            Property::List(children) => Ok(children),
            other => Err(mismatch_kind(&kind, property, PropertyKind::List, other)),
        }
    }

    fn block_list<'a>(&self, node: &'a Node, property: &str) -> AstResult<&'a [Block]> {
        match lookup(node, property)? {
            Property::BlockList(blocks) => Ok(blocks.as_slice()),
            other => Err(mismatch(node, property, PropertyKind::BlockList, other)),
        }
    }

    fn block_list_mut<'a>(
        &self,
        node: &'a mut Node,
        property: &str,
    ) -> AstResult<&'a mut Vec<Block>> {
        let kind = node.kind.clone();
        match lookup_mut(node, property)? {
            Property::BlockList(blocks) => Ok(blocks),
            other => Err(mismatch_kind(&kind, property, PropertyKind::BlockList, other)),
        }
    }

    fn value<'a>(&self, node: &'a Node, property: &str) -> AstResult<&'a Leaf> {
        match lookup(node, property)? {
            Property::Value(leaf) => Ok(leaf),
            other => Err(mismatch(node, property, PropertyKind::Value, other)),
        }
    }

    fn value_mut<'a>(&self, node: &'a mut Node, property: &str) -> AstResult<&'a mut Leaf> {
        let kind = node.kind.clone();
        match lookup_mut(node, property)? {
            Property::Value(leaf) => Ok(leaf),
            other => Err(mismatch_kind(&kind, property, PropertyKind::Value, other)),
        }
    }

    /// Independent deep copy of a subtree
    fn clone_node(&self, node: &Node) -> Node {
        node.clone()
    }

    /// Structural equality of two subtrees
    fn is_equal(&self, a: &Node, b: &Node) -> bool {
        a == b
    }
}

fn lookup<'a>(node: &'a Node, property: &str) -> AstResult<&'a Property> {
    node.property(property)
        .ok_or_else(|| AstError::missing(&node.kind, property))
}

fn lookup_mut<'a>(node: &'a mut Node, property: &str) -> AstResult<&'a mut Property> {
    let kind = node.kind.clone();
    node.property_mut(property)
        .ok_or_else(|| AstError::missing(kind, property))
}

fn mismatch(node: &Node, property: &str, expected: PropertyKind, found: &Property) -> AstError {
    mismatch_kind(&node.kind, property, expected, found)
}

fn mismatch_kind(kind: &str, property: &str, expected: PropertyKind, found: &Property) -> AstError {
    AstError::unexpected(kind, property, expected, PropertyKind::of(found))
}

/// Helper that takes every property's runtime value at face value
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectHelper;

impl AstHelper for ReflectHelper {
    fn shape(&self, node: &Node) -> AstResult<Vec<PropertyShape>> {
        Ok(node
            .properties
            .iter()
            .map(|(name, property)| PropertyShape {
                name: name.clone(),
                kind: PropertyKind::of(property),
            })
            .filter(|shape| shape.kind.is_child_bearing())
            .collect())
    }

    fn accepts(&self, _parent: &Node, _property: &str, _child: &Node) -> AstResult<()> {
        Ok(())
    }
}

/// Declared property of a node kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    pub kind: PropertyKind,

    /// Node kinds accepted by a child-bearing property (empty = any)
    #[serde(default)]
    pub accepts: Vec<String>,
}

/// Declared shape of every node kind in a tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub kinds: HashMap<String, Vec<PropertySchema>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Declare a node kind; properties keep the given order
    pub fn declare(mut self, kind: impl Into<String>, properties: Vec<PropertySchema>) -> Self {
        self.kinds.insert(kind.into(), properties);
        self
    }

    pub fn properties(&self, kind: &str) -> Option<&[PropertySchema]> {
        self.kinds.get(kind).map(Vec::as_slice)
    }
}

impl PropertySchema {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            accepts: Vec::new(),
        }
    }

    pub fn accepting(mut self, kinds: &[&str]) -> Self {
        self.accepts = kinds.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Helper that validates nodes against a [`Schema`]
#[derive(Debug, Clone, Default)]
pub struct SchemaHelper {
    schema: Schema,
}

impl SchemaHelper {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn declared(&self, kind: &str) -> AstResult<&[PropertySchema]> {
        self.schema
            .properties(kind)
            .ok_or_else(|| AstError::UnknownKind(kind.to_string()))
    }
}

impl AstHelper for SchemaHelper {
    fn shape(&self, node: &Node) -> AstResult<Vec<PropertyShape>> {
        let mut shape = Vec::new();

        for declared in self.declared(&node.kind)? {
            let property = lookup(node, &declared.name)?;
            let found = PropertyKind::of(property);
            if found != declared.kind {
                return Err(AstError::unexpected(
                    &node.kind,
                    &declared.name,
                    declared.kind,
                    found,
                ));
            }

            if declared.kind.is_child_bearing() {
                shape.push(PropertyShape {
                    name: declared.name.clone(),
                    kind: declared.kind,
                });
            }
        }

        Ok(shape)
    }

    fn accepts(&self, parent: &Node, property: &str, child: &Node) -> AstResult<()> {
        let declared = self
            .declared(&parent.kind)?
            .iter()
            .find(|p| p.name == property)
            .ok_or_else(|| AstError::missing(&parent.kind, property))?;

        if declared.accepts.is_empty() || declared.accepts.iter().any(|k| *k == child.kind) {
            Ok(())
        } else {
            Err(AstError::Rejected {
                parent: parent.kind.clone(),
                property: property.to_string(),
                child: child.kind.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_schema() -> Schema {
        Schema::new()
            .declare(
                "Class",
                vec![
                    PropertySchema::new("name", PropertyKind::Value),
                    PropertySchema::new("features", PropertyKind::List).accepting(&["Attribute"]),
                    PropertySchema::new("parent", PropertyKind::Optional),
                ],
            )
            .declare("Attribute", vec![])
    }

    #[test]
    fn test_reflect_shape_skips_values() {
        let node = Node::new("Class")
            .with_value("name", "A")
            .with_list("features", vec![])
            .with_child("head", Node::new("Head"));

        let shape = ReflectHelper.shape(&node).unwrap();
        assert_eq!(
            shape,
            vec![
                PropertyShape { name: "features".into(), kind: PropertyKind::List },
                PropertyShape { name: "head".into(), kind: PropertyKind::Placeholder },
            ]
        );
    }

    #[test]
    fn test_accessor_reports_wrong_kind() {
        let node = Node::new("Class").with_value("features", "oops");

        let err = ReflectHelper.list(&node, "features").unwrap_err();
        assert_eq!(
            err,
            AstError::unexpected("Class", "features", PropertyKind::List, PropertyKind::Value)
        );
    }

    #[test]
    fn test_schema_shape_and_mismatch() {
        let helper = SchemaHelper::new(class_schema());

        let good = Node::new("Class")
            .with_value("name", "A")
            .with_list("features", vec![])
            .with_optional("parent", None);
        assert_eq!(helper.shape(&good).unwrap().len(), 2);

        let bad = Node::new("Class")
            .with_value("name", "A")
            .with_value("features", 3)
            .with_optional("parent", None);
        assert!(matches!(
            helper.shape(&bad),
            Err(AstError::UnexpectedKind { .. })
        ));

        assert_eq!(
            helper.shape(&Node::new("Nope")),
            Err(AstError::UnknownKind("Nope".into()))
        );
    }

    #[test]
    fn test_schema_accepts() {
        let helper = SchemaHelper::new(class_schema());
        let class = Node::new("Class");

        assert!(helper.accepts(&class, "features", &Node::new("Attribute")).is_ok());
        assert!(matches!(
            helper.accepts(&class, "features", &Node::new("Method")),
            Err(AstError::Rejected { .. })
        ));
        // No restriction declared
        assert!(helper.accepts(&class, "parent", &Node::new("Anything")).is_ok());
    }

    #[test]
    fn test_schema_from_json() {
        let schema = Schema::from_json(
            r#"{ "kinds": { "Root": [ { "name": "items", "kind": "list", "accepts": ["Item"] } ] } }"#,
        )
        .unwrap();

        let items = &schema.properties("Root").unwrap()[0];
        assert_eq!(items.kind, PropertyKind::List);
        assert_eq!(items.accepts, vec!["Item".to_string()]);
    }
}
