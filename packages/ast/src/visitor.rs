use crate::node::{Block, Leaf, Node, Property};

/// Visitor pattern for traversing AST nodes immutably
///
/// This trait provides default implementations that walk the entire tree.
/// Override specific visit_* methods to perform custom actions on nodes.
pub trait Visitor: Sized {
    fn visit_node(&mut self, node: &Node) {
        walk_node(self, node);
    }

    fn visit_property(&mut self, name: &str, property: &Property) {
        walk_property(self, name, property);
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_leaf(&mut self, _name: &str, _leaf: &Leaf) {
        // Leaf value, nothing to walk
    }
}

pub fn walk_node<V: Visitor>(visitor: &mut V, node: &Node) {
    for (name, property) in &node.properties {
        visitor.visit_property(name, property);
    }
}

pub fn walk_property<V: Visitor>(visitor: &mut V, name: &str, property: &Property) {
    match property {
        Property::Value(leaf) => visitor.visit_leaf(name, leaf),
        Property::Child(child) => visitor.visit_node(child),
        Property::Optional(optional) => {
            if let Some(item) = &optional.item {
                visitor.visit_node(item);
            }
        }
        Property::List(children) => {
            for child in children {
                visitor.visit_node(child);
            }
        }
        Property::BlockList(blocks) => {
            for block in blocks {
                visitor.visit_block(block);
            }
        }
    }
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &Block) {
    visitor.visit_node(&block.pattern);
    visitor.visit_node(&block.source);
    for node in &block.nodes {
        visitor.visit_node(node);
    }
}

/// Counts every node of a subtree
#[derive(Debug, Default)]
pub(crate) struct NodeCounter {
    pub count: usize,
}

impl Visitor for NodeCounter {
    fn visit_node(&mut self, node: &Node) {
        self.count += 1;
        walk_node(self, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct KindCollector {
        kinds: Vec<String>,
    }

    impl Visitor for KindCollector {
        fn visit_node(&mut self, node: &Node) {
            self.kinds.push(node.kind.clone());
            walk_node(self, node);
        }

        fn visit_block(&mut self, block: &Block) {
            // Members only
            for node in &block.nodes {
                self.visit_node(node);
            }
        }
    }

    #[test]
    fn test_depth_first_declaration_order() {
        let tree = Node::new("Root")
            .with_list("items", vec![Node::new("A").with_child("x", Node::new("X")), Node::new("B")])
            .with_optional("tail", Some(Node::new("T")))
            .with_blocks("body", vec![Block::simple(vec![Node::new("C")])]);

        let mut collector = KindCollector::default();
        collector.visit_node(&tree);

        assert_eq!(collector.kinds, vec!["Root", "A", "X", "B", "T", "C"]);
    }
}
