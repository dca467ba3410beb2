//! # Browse
//!
//! Stateless traversal of AST nodes through an [`AstHelper`]. [`browse`]
//! lists the child-bearing properties of one node together with the
//! children found there; the state tree turns each entry into an inner.
//! The path functions walk a [`NodePath`] down the AST.

use crate::errors::{ControllerError, ControllerResult};
use crate::index::Slot;
use crate::path::{NodePath, PathStep};
use frond_ast::{AstError, AstHelper, Block, Node, PropertyKind};

/// One child-bearing property of a browsed node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InnerBrowse<'n> {
    Placeholder {
        property: &'n str,
        child: &'n Node,
    },
    Optional {
        property: &'n str,
        /// Assigned item; a retained item of an unassigned optional is not
        /// browsed
        item: Option<&'n Node>,
    },
    List {
        property: &'n str,
        children: &'n [Node],
    },
    BlockList {
        property: &'n str,
        blocks: &'n [Block],
    },
}

impl<'n> InnerBrowse<'n> {
    pub fn property(&self) -> &'n str {
        match self {
            InnerBrowse::Placeholder { property, .. }
            | InnerBrowse::Optional { property, .. }
            | InnerBrowse::List { property, .. }
            | InnerBrowse::BlockList { property, .. } => property,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            InnerBrowse::Placeholder { .. } => PropertyKind::Placeholder,
            InnerBrowse::Optional { .. } => PropertyKind::Optional,
            InnerBrowse::List { .. } => PropertyKind::List,
            InnerBrowse::BlockList { .. } => PropertyKind::BlockList,
        }
    }

    /// Children with their slots, in AST order
    pub fn children(&self) -> Vec<(Slot, &'n Node)> {
        match *self {
            InnerBrowse::Placeholder { child, .. } => vec![(Slot::Placeholder, child)],
            InnerBrowse::Optional { item, .. } => {
                item.map(|item| (Slot::Optional, item)).into_iter().collect()
            }
            InnerBrowse::List { children, .. } => children
                .iter()
                .enumerate()
                .map(|(position, child)| (Slot::List(position), child))
                .collect(),
            InnerBrowse::BlockList { blocks, .. } => blocks
                .iter()
                .enumerate()
                .flat_map(|(block, content)| {
                    content
                        .nodes
                        .iter()
                        .enumerate()
                        .map(move |(position, child)| (Slot::Block { block, position }, child))
                })
                .collect(),
        }
    }
}

/// Child-bearing properties of `node` in declaration order
pub fn browse<'n, H: AstHelper>(helper: &H, node: &'n Node) -> ControllerResult<Vec<InnerBrowse<'n>>> {
    let mut inners = Vec::new();

    for shape in helper.shape(node)? {
        // Borrow the name from the node so the entry lives as long as it
        let property = node
            .properties
            .get_key_value(shape.name.as_str())
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| frond_ast::AstError::missing(&node.kind, &shape.name))?;

        let inner = match shape.kind {
            PropertyKind::Placeholder => InnerBrowse::Placeholder {
                property,
                child: helper.child(node, property)?,
            },
            PropertyKind::Optional => {
                let optional = helper.optional(node, property)?;
                InnerBrowse::Optional {
                    property,
                    item: optional
                        .item
                        .as_deref()
                        .filter(|_| optional.assigned),
                }
            }
            PropertyKind::List => InnerBrowse::List {
                property,
                children: helper.list(node, property)?,
            },
            PropertyKind::BlockList => InnerBrowse::BlockList {
                property,
                blocks: helper.block_list(node, property)?,
            },
            PropertyKind::Value => continue,
        };
        inners.push(inner);
    }

    Ok(inners)
}

/// Check that a subtree can be mirrored: every node has a consistent shape,
/// every child is accepted by its property and no block is empty
pub fn validate<H: AstHelper>(helper: &H, node: &Node) -> ControllerResult<()> {
    for inner in browse(helper, node)? {
        if let InnerBrowse::BlockList { property, blocks } = inner {
            if let Some(block) = blocks.iter().position(|b| b.nodes.is_empty()) {
                return Err(AstError::EmptyBlock {
                    kind: node.kind.clone(),
                    property: property.to_string(),
                    block,
                }
                .into());
            }
        }

        for (_, child) in inner.children() {
            helper.accepts(node, inner.property(), child)?;
            validate(helper, child)?;
        }
    }
    Ok(())
}

fn missing(step: &PathStep) -> ControllerError {
    ControllerError::invalid_index(format!("no node at {}{}", step.property, step.slot))
}

pub fn step<'a, H: AstHelper>(helper: &H, node: &'a Node, step: &PathStep) -> ControllerResult<&'a Node> {
    let property = step.property.as_str();
    match step.slot {
        Slot::Placeholder => Ok(helper.child(node, property)?),
        Slot::Optional => {
            let optional = helper.optional(node, property)?;
            optional
                .item
                .as_deref()
                .filter(|_| optional.assigned)
                .ok_or_else(|| missing(step))
        }
        Slot::List(position) => helper
            .list(node, property)?
            .get(position)
            .ok_or_else(|| missing(step)),
        Slot::Block { block, position } => helper
            .block_list(node, property)?
            .get(block)
            .and_then(|content| content.nodes.get(position))
            .ok_or_else(|| missing(step)),
    }
}

pub fn step_mut<'a, H: AstHelper>(
    helper: &H,
    node: &'a mut Node,
    step: &PathStep,
) -> ControllerResult<&'a mut Node> {
    let property = step.property.as_str();
    match step.slot {
        Slot::Placeholder => Ok(helper.child_mut(node, property)?),
        Slot::Optional => {
            let optional = helper.optional_mut(node, property)?;
            if !optional.assigned {
                return Err(missing(step));
            }
            optional.item.as_deref_mut().ok_or_else(|| missing(step))
        }
        Slot::List(position) => helper
            .list_mut(node, property)?
            .get_mut(position)
            .ok_or_else(|| missing(step)),
        Slot::Block { block, position } => helper
            .block_list_mut(node, property)?
            .get_mut(block)
            .and_then(|content| content.nodes.get_mut(position))
            .ok_or_else(|| missing(step)),
    }
}

/// Node at `path` below `root`
pub fn descend<'a, H: AstHelper>(helper: &H, root: &'a Node, path: &NodePath) -> ControllerResult<&'a Node> {
    let mut current = root;
    for next in path.steps() {
        current = step(helper, current, next)?;
    }
    Ok(current)
}

pub fn descend_mut<'a, H: AstHelper>(
    helper: &H,
    root: &'a mut Node,
    path: &NodePath,
) -> ControllerResult<&'a mut Node> {
    let mut current = root;
    for next in path.steps() {
        current = step_mut(helper, current, next)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frond_ast::{PropertySchema, ReflectHelper, Schema, SchemaHelper};

    fn tree() -> Node {
        Node::new("Root")
            .with_value("name", "r")
            .with_child("head", Node::new("Head"))
            .with_optional("tail", None)
            .with_list("items", vec![Node::new("A"), Node::new("B")])
            .with_blocks(
                "body",
                vec![
                    Block::simple(vec![Node::new("C")]),
                    Block::simple(vec![Node::new("D"), Node::new("E").with_child("x", Node::new("X"))]),
                ],
            )
    }

    #[test]
    fn test_browse_declaration_order() {
        let node = tree();
        let inners = browse(&ReflectHelper, &node).unwrap();

        let names: Vec<(&str, PropertyKind)> =
            inners.iter().map(|inner| (inner.property(), inner.kind())).collect();
        assert_eq!(
            names,
            vec![
                ("head", PropertyKind::Placeholder),
                ("tail", PropertyKind::Optional),
                ("items", PropertyKind::List),
                ("body", PropertyKind::BlockList),
            ]
        );

        assert!(inners[1].children().is_empty());
        let body: Vec<Slot> = inners[3].children().into_iter().map(|(slot, _)| slot).collect();
        assert_eq!(
            body,
            vec![
                Slot::Block { block: 0, position: 0 },
                Slot::Block { block: 1, position: 0 },
                Slot::Block { block: 1, position: 1 },
            ]
        );
    }

    #[test]
    fn test_unassigned_item_is_not_browsed() {
        let node = Node::new("Root").with_unassigned("tail", Node::new("Kept"));
        let inners = browse(&ReflectHelper, &node).unwrap();

        assert_eq!(inners, vec![InnerBrowse::Optional { property: "tail", item: None }]);
    }

    #[test]
    fn test_descend() {
        let mut node = tree();
        let path = NodePath::root()
            .child("body", Slot::Block { block: 1, position: 1 })
            .child("x", Slot::Placeholder);

        assert_eq!(descend(&ReflectHelper, &node, &path).unwrap().kind, "X");

        descend_mut(&ReflectHelper, &mut node, &path).unwrap().kind = "Y".into();
        assert_eq!(descend(&ReflectHelper, &node, &path).unwrap().kind, "Y");

        let unassigned = NodePath::root().child("tail", Slot::Optional);
        assert!(matches!(
            descend(&ReflectHelper, &node, &unassigned),
            Err(ControllerError::InvalidIndex(_))
        ));

        let out_of_range = NodePath::root().child("items", Slot::List(2));
        assert!(descend(&ReflectHelper, &node, &out_of_range).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_block_and_bad_child() {
        let empty = Node::new("Root").with_blocks("body", vec![Block::simple(vec![])]);
        assert!(matches!(
            validate(&ReflectHelper, &empty),
            Err(ControllerError::StructuralMismatch(AstError::EmptyBlock { block: 0, .. }))
        ));

        let schema = Schema::new()
            .declare(
                "Root",
                vec![PropertySchema::new("items", PropertyKind::List).accepting(&["Item"])],
            )
            .declare("Item", vec![]);
        let helper = SchemaHelper::new(schema);

        let good = Node::new("Root").with_list("items", vec![Node::new("Item")]);
        assert!(validate(&helper, &good).is_ok());

        let bad = Node::new("Root").with_list("items", vec![Node::new("Other")]);
        assert!(matches!(
            validate(&helper, &bad),
            Err(ControllerError::StructuralMismatch(AstError::Rejected { .. }))
        ));
    }
}
