//! Replay scripts: a JSON array of commands addressed by node paths, e.g.
//!
//! ```json
//! [
//!   { "op": "insert", "path": "/features[2]", "node": { "kind": "Method" } },
//!   { "op": "splitBlock", "inner": "/body", "block": 0, "position": 2 },
//!   { "op": "undo" }
//! ]
//! ```

use anyhow::{anyhow, bail, Context, Result};
use frond_ast::{AstHelper, Block, Leaf, Node, ReplicationStatus};
use frond_controller::{Controller, InnerRef, InsertionIndex, NodePath, Slot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptCommand {
    /// Insert `node` so that it lands at `path` (a list or block slot)
    Insert { path: String, node: Node },
    Remove { path: String },
    Replace { path: String, node: Node },
    Move { path: String, delta: isize },
    Assign {
        path: String,
        #[serde(default)]
        node: Option<Node>,
    },
    Unassign { path: String },
    InsertBlock {
        inner: String,
        block: usize,
        content: Block,
    },
    RemoveBlock { inner: String, block: usize },
    SplitBlock {
        inner: String,
        block: usize,
        position: usize,
    },
    MergeBlocks { inner: String, block: usize },
    MoveBlock {
        inner: String,
        block: usize,
        delta: isize,
    },
    ChangeReplication {
        inner: String,
        block: usize,
        replication: ReplicationStatus,
    },
    SetValue {
        path: String,
        property: String,
        value: Leaf,
    },
    Undo,
    Redo,
    BeginBatch {
        #[serde(default)]
        description: Option<String>,
    },
    EndBatch,
    AbortBatch,
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptCommand>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid script {}", path.display()))
}

fn parse_path(text: &str) -> Result<NodePath> {
    Ok(text.parse::<NodePath>()?)
}

/// Resolve `/owner/.../property` to the inner it names
fn resolve_inner<H: AstHelper>(controller: &Controller<H>, text: &str) -> Result<InnerRef> {
    let path = parse_path(text)?;
    match (path.parent(), path.last()) {
        (Some(owner), Some(step)) if step.slot == Slot::Placeholder => Ok(InnerRef::new(
            controller.resolve(&owner)?,
            step.property.clone(),
        )),
        _ => bail!("`{}` does not name a property", text),
    }
}

impl ScriptCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptCommand::Insert { .. } => "insert",
            ScriptCommand::Remove { .. } => "remove",
            ScriptCommand::Replace { .. } => "replace",
            ScriptCommand::Move { .. } => "move",
            ScriptCommand::Assign { .. } => "assign",
            ScriptCommand::Unassign { .. } => "unassign",
            ScriptCommand::InsertBlock { .. } => "insertBlock",
            ScriptCommand::RemoveBlock { .. } => "removeBlock",
            ScriptCommand::SplitBlock { .. } => "splitBlock",
            ScriptCommand::MergeBlocks { .. } => "mergeBlocks",
            ScriptCommand::MoveBlock { .. } => "moveBlock",
            ScriptCommand::ChangeReplication { .. } => "changeReplication",
            ScriptCommand::SetValue { .. } => "setValue",
            ScriptCommand::Undo => "undo",
            ScriptCommand::Redo => "redo",
            ScriptCommand::BeginBatch { .. } => "beginBatch",
            ScriptCommand::EndBatch => "endBatch",
            ScriptCommand::AbortBatch => "abortBatch",
        }
    }

    /// Path or inner the command targets, if any
    fn target(&self) -> Option<String> {
        match self {
            ScriptCommand::Insert { path, .. }
            | ScriptCommand::Remove { path }
            | ScriptCommand::Replace { path, .. }
            | ScriptCommand::Move { path, .. }
            | ScriptCommand::Assign { path, .. }
            | ScriptCommand::Unassign { path } => Some(path.clone()),
            ScriptCommand::SetValue { path, property, .. } => Some(format!("{}.{}", path, property)),
            ScriptCommand::InsertBlock { inner, block, .. }
            | ScriptCommand::RemoveBlock { inner, block }
            | ScriptCommand::SplitBlock { inner, block, .. }
            | ScriptCommand::MergeBlocks { inner, block }
            | ScriptCommand::MoveBlock { inner, block, .. }
            | ScriptCommand::ChangeReplication { inner, block, .. } => {
                Some(format!("{} block {}", inner, block))
            }
            ScriptCommand::Undo
            | ScriptCommand::Redo
            | ScriptCommand::BeginBatch { .. }
            | ScriptCommand::EndBatch
            | ScriptCommand::AbortBatch => None,
        }
    }

    pub fn apply<H: AstHelper>(&self, controller: &mut Controller<H>) -> Result<()> {
        match self {
            ScriptCommand::Insert { path, node } => {
                let path = parse_path(path)?;
                let (owner, step) = match (path.parent(), path.last()) {
                    (Some(owner), Some(step)) => (controller.resolve(&owner)?, step),
                    _ => bail!("Cannot insert at the root"),
                };
                let index = match step.slot {
                    Slot::List(position) => {
                        InsertionIndex::list(owner, step.property.clone(), position, node.clone())
                    }
                    Slot::Block { block, position } => InsertionIndex::existing_block(
                        owner,
                        step.property.clone(),
                        block,
                        position,
                        node.clone(),
                    ),
                    _ => bail!("Cannot insert into `{}`: not a list or block slot", path),
                };
                controller.insert(index)?;
            }
            ScriptCommand::Remove { path } => {
                let index = controller.index_at(&parse_path(path)?)?;
                controller.remove(&index)?;
            }
            ScriptCommand::Replace { path, node } => {
                let index = controller.index_at(&parse_path(path)?)?;
                controller.replace(&index, node.clone())?;
            }
            ScriptCommand::Move { path, delta } => {
                let index = controller.index_at(&parse_path(path)?)?;
                controller.move_state(&index, *delta)?;
            }
            ScriptCommand::Assign { path, node } => {
                let index = controller.index_at(&parse_path(path)?)?;
                controller.assign(&index, node.clone())?;
            }
            ScriptCommand::Unassign { path } => {
                let index = controller.index_at(&parse_path(path)?)?;
                controller.unassign(&index)?;
            }
            ScriptCommand::InsertBlock {
                inner,
                block,
                content,
            } => {
                let inner = resolve_inner(controller, inner)?;
                controller.insert_block(&inner, *block, content.clone())?;
            }
            ScriptCommand::RemoveBlock { inner, block } => {
                let inner = resolve_inner(controller, inner)?;
                controller.remove_block(&inner, *block)?;
            }
            ScriptCommand::SplitBlock {
                inner,
                block,
                position,
            } => {
                let inner = resolve_inner(controller, inner)?;
                controller.split_block(&inner, *block, *position)?;
            }
            ScriptCommand::MergeBlocks { inner, block } => {
                let inner = resolve_inner(controller, inner)?;
                controller.merge_blocks(&inner, *block)?;
            }
            ScriptCommand::MoveBlock {
                inner,
                block,
                delta,
            } => {
                let inner = resolve_inner(controller, inner)?;
                controller.move_block(&inner, *block, *delta)?;
            }
            ScriptCommand::ChangeReplication {
                inner,
                block,
                replication,
            } => {
                let inner = resolve_inner(controller, inner)?;
                controller.change_replication(&inner, *block, *replication)?;
            }
            ScriptCommand::SetValue {
                path,
                property,
                value,
            } => {
                let state = controller.resolve(&parse_path(path)?)?;
                controller.set_value(state, property, value.clone())?;
            }
            ScriptCommand::Undo => {
                if !controller.undo()? {
                    return Err(anyhow!("Nothing to undo"));
                }
            }
            ScriptCommand::Redo => {
                if !controller.redo()? {
                    return Err(anyhow!("Nothing to redo"));
                }
            }
            ScriptCommand::BeginBatch { description } => {
                controller.begin_batch(description.clone())?;
            }
            ScriptCommand::EndBatch => {
                controller.end_batch()?;
            }
            ScriptCommand::AbortBatch => {
                controller.abort_batch()?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ScriptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{} {}", self.name(), target),
            None => write!(f, "{}", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frond_ast::Property;
    use frond_controller::ControllerError;

    fn doc() -> Node {
        Node::new("Class")
            .with_value("name", "Shape")
            .with_list("features", vec![Node::new("Method").with_value("name", "area")])
            .with_blocks(
                "body",
                vec![Block::simple(vec![
                    Node::new("Statement").with_value("text", "s0"),
                    Node::new("Statement").with_value("text", "s1"),
                ])],
            )
    }

    fn run(script: &str) -> Result<Controller> {
        let mut controller = Controller::from_document(doc())?;
        let commands: Vec<ScriptCommand> = serde_json::from_str(script)?;
        for command in &commands {
            command.apply(&mut controller)?;
        }
        Ok(controller)
    }

    #[test]
    fn test_parse_script() {
        let commands: Vec<ScriptCommand> = serde_json::from_str(
            r#"[
                { "op": "insert", "path": "/features[1]", "node": { "kind": "Method" } },
                { "op": "setValue", "path": "/", "property": "name", "value": "Figure" },
                { "op": "assign", "path": "/base?" },
                { "op": "undo" }
            ]"#,
        )
        .unwrap();

        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0].to_string(), "insert /features[1]");
        assert_eq!(commands[1].to_string(), "setValue /.name");
        assert_eq!(
            commands[2],
            ScriptCommand::Assign {
                path: "/base?".into(),
                node: None
            }
        );
        assert_eq!(commands[3].to_string(), "undo");
    }

    #[test]
    fn test_apply_script() {
        let controller = run(
            r#"[
                { "op": "insert", "path": "/features[1]",
                  "node": { "kind": "Method", "properties": { "name": { "value": "draw" } } } },
                { "op": "move", "path": "/features[0]", "delta": 1 },
                { "op": "splitBlock", "inner": "/body", "block": 0, "position": 1 },
                { "op": "setValue", "path": "/features[0]", "property": "name", "value": "paint" }
            ]"#,
        )
        .unwrap();

        let names: Vec<&str> = match controller.document().property("features") {
            Some(Property::List(items)) => items.iter().filter_map(|n| n.text("name")).collect(),
            _ => panic!("features is not a list"),
        };
        assert_eq!(names, vec!["paint", "area"]);

        match controller.document().property("body") {
            Some(Property::BlockList(blocks)) => assert_eq!(blocks.len(), 2),
            _ => panic!("body is not a block list"),
        }
        assert_eq!(controller.history().undo_levels(), 4);
    }

    #[test]
    fn test_bad_targets() {
        let err = run(r#"[{ "op": "remove", "path": "/features[4]" }]"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ControllerError>(),
            Some(ControllerError::InvalidIndex(_))
        ));

        assert!(run(r#"[{ "op": "insert", "path": "/", "node": { "kind": "X" } }]"#).is_err());
        assert!(run(r#"[{ "op": "mergeBlocks", "inner": "/features[0]", "block": 0 }]"#).is_err());
        assert!(run(r#"[{ "op": "undo" }]"#).is_err());
    }
}
