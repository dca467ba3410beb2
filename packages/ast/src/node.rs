//! # AST Node Model
//!
//! A generic tree of typed nodes. Each node has a `kind` and an ordered
//! table of named properties; the order of that table is the declaration
//! order used when a tree is browsed.
//!
//! ```text
//! Node { kind, properties }
//!   ├─ Value      leaf (text / integer / boolean)
//!   ├─ Child      mandatory single child
//!   ├─ Optional   child that may be unassigned (item may be retained)
//!   ├─ List       ordered children
//!   └─ BlockList  ordered blocks, each with pattern, source, replication
//!                 and ordered children
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Property>,
}

/// Value stored under one property name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    Value(Leaf),
    Child(Box<Node>),
    Optional(OptionalChild),
    List(Vec<Node>),
    BlockList(Vec<Block>),
}

/// Leaf value of a non child-bearing property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Leaf {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

/// Content of an optional property.
///
/// An unassigned optional can still hold its last item so that assigning
/// it again restores the same node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionalChild {
    #[serde(default)]
    pub assigned: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<Node>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplicationStatus {
    #[default]
    Normal,
    Replicated,
}

/// One block of a block list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub replication: ReplicationStatus,
    pub pattern: Node,
    pub source: Node,
    pub nodes: Vec<Node>,
}

impl Node {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Leaf>) -> Self {
        self.properties
            .insert(name.into(), Property::Value(value.into()));
        self
    }

    pub fn with_child(mut self, name: impl Into<String>, child: Node) -> Self {
        self.properties
            .insert(name.into(), Property::Child(Box::new(child)));
        self
    }

    /// Optional property, assigned when `child` is present
    pub fn with_optional(mut self, name: impl Into<String>, child: Option<Node>) -> Self {
        let optional = OptionalChild {
            assigned: child.is_some(),
            item: child.map(Box::new),
        };
        self.properties
            .insert(name.into(), Property::Optional(optional));
        self
    }

    /// Optional property that is unassigned but retains `item`
    pub fn with_unassigned(mut self, name: impl Into<String>, item: Node) -> Self {
        let optional = OptionalChild {
            assigned: false,
            item: Some(Box::new(item)),
        };
        self.properties
            .insert(name.into(), Property::Optional(optional));
        self
    }

    pub fn with_list(mut self, name: impl Into<String>, children: Vec<Node>) -> Self {
        self.properties.insert(name.into(), Property::List(children));
        self
    }

    pub fn with_blocks(mut self, name: impl Into<String>, blocks: Vec<Block>) -> Self {
        self.properties
            .insert(name.into(), Property::BlockList(blocks));
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(name)
    }

    /// Text of a `Value` property, if it holds text
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(Property::Value(Leaf::Text(text))) => Some(text),
            _ => None,
        }
    }

    /// Total number of nodes in this subtree, including pattern and source nodes
    pub fn node_count(&self) -> usize {
        let mut counter = crate::visitor::NodeCounter::default();
        crate::visitor::Visitor::visit_node(&mut counter, self);
        counter.count
    }
}

impl Block {
    pub fn new(pattern: Node, source: Node, nodes: Vec<Node>) -> Self {
        Self {
            replication: ReplicationStatus::Normal,
            pattern,
            source,
            nodes,
        }
    }

    /// Block with an empty pattern and source
    pub fn simple(nodes: Vec<Node>) -> Self {
        Self::new(
            Node::new("Pattern").with_value("text", ""),
            Node::new("Identifier").with_value("text", ""),
            nodes,
        )
    }

    pub fn with_replication(mut self, replication: ReplicationStatus) -> Self {
        self.replication = replication;
        self
    }
}

impl From<&str> for Leaf {
    fn from(s: &str) -> Self {
        Leaf::Text(s.to_string())
    }
}

impl From<String> for Leaf {
    fn from(s: String) -> Self {
        Leaf::Text(s)
    }
}

impl From<i64> for Leaf {
    fn from(n: i64) -> Self {
        Leaf::Integer(n)
    }
}

impl From<bool> for Leaf {
    fn from(b: bool) -> Self {
        Leaf::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_declaration_order() {
        let node = Node::new("Class")
            .with_value("name", "Point")
            .with_list("features", vec![])
            .with_optional("parent", None);

        let names: Vec<&str> = node.properties.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "features", "parent"]);
        assert_eq!(node.text("name"), Some("Point"));
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "kind": "Class",
            "properties": {
                "name": { "value": "Point" },
                "abstract": { "value": false },
                "features": { "list": [ { "kind": "Attribute" } ] },
                "parent": { "optional": { "assigned": false } },
                "body": {
                    "blockList": [
                        {
                            "replication": "replicated",
                            "pattern": { "kind": "Pattern" },
                            "source": { "kind": "Identifier" },
                            "nodes": [ { "kind": "Instruction" } ]
                        }
                    ]
                }
            }
        }"#;

        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind, "Class");
        assert_eq!(node.text("name"), Some("Point"));
        assert_eq!(
            node.property("abstract"),
            Some(&Property::Value(Leaf::Boolean(false)))
        );

        match node.property("body") {
            Some(Property::BlockList(blocks)) => {
                assert_eq!(blocks.len(), 1);
                assert_eq!(blocks[0].replication, ReplicationStatus::Replicated);
                assert_eq!(blocks[0].nodes[0].kind, "Instruction");
            }
            other => panic!("Expected block list, got {:?}", other),
        }

        let back = serde_json::to_string(&node).unwrap();
        let reparsed: Node = serde_json::from_str(&back).unwrap();
        assert_eq!(node, reparsed);
    }

    #[test]
    fn test_node_count_includes_blocks() {
        let node = Node::new("Root")
            .with_child("head", Node::new("Leaf"))
            .with_blocks("body", vec![Block::simple(vec![Node::new("A"), Node::new("B")])]);

        // root + head + pattern + source + A + B
        assert_eq!(node.node_count(), 6);
    }
}
