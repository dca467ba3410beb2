pub mod check;
pub mod replay;

pub use check::{check, CheckArgs};
pub use replay::{replay, ReplayArgs};

use crate::config::{load_document, load_schema};
use anyhow::{Context, Result};
use frond_ast::{AstHelper, AstResult, Node, PropertyShape, ReflectHelper, SchemaHelper};
use frond_controller::{Controller, ControllerConfig, ObserverRegistry};
use std::path::Path;
use tracing::info;

/// Helper picked on the command line: `--schema` checks the document,
/// otherwise shapes are read off the nodes
#[derive(Debug, Clone)]
pub enum TreeHelper {
    Reflect(ReflectHelper),
    Schema(SchemaHelper),
}

impl AstHelper for TreeHelper {
    fn shape(&self, node: &Node) -> AstResult<Vec<PropertyShape>> {
        match self {
            TreeHelper::Reflect(helper) => helper.shape(node),
            TreeHelper::Schema(helper) => helper.shape(node),
        }
    }

    fn accepts(&self, parent: &Node, property: &str, child: &Node) -> AstResult<()> {
        match self {
            TreeHelper::Reflect(helper) => helper.accepts(parent, property, child),
            TreeHelper::Schema(helper) => helper.accepts(parent, property, child),
        }
    }
}

/// Load the document (and schema) and build a controller over it
pub fn build_controller(
    tree: &Path,
    schema: Option<&Path>,
    config: ControllerConfig,
) -> Result<Controller<TreeHelper>> {
    let document = load_document(tree)?;
    let helper = match schema {
        Some(path) => TreeHelper::Schema(SchemaHelper::new(load_schema(path)?)),
        None => TreeHelper::Reflect(ReflectHelper),
    };
    info!(tree = %tree.display(), schema = schema.is_some(), "Loading document");

    Controller::with_config(document, helper, ObserverRegistry::new(), config)
        .with_context(|| format!("Cannot mirror {}", tree.display()))
}
