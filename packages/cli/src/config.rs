use anyhow::{Context, Result};
use frond_ast::{Node, Schema};
use frond_controller::ControllerConfig;
use std::path::Path;

/// Controller config from `--config`, or from `frond.config.json` in `cwd`
/// when present
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<ControllerConfig> {
    match explicit {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => ControllerConfig::load(cwd).with_context(|| {
            format!(
                "Failed to load {}",
                ControllerConfig::path_in(cwd).display()
            )
        }),
    }
}

pub fn load_document(path: &Path) -> Result<Node> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid document {}", path.display()))
}

pub fn load_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Schema::from_json(&content).with_context(|| format!("Invalid schema {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use frond_controller::DEFAULT_CONFIG_NAME;

    #[test]
    fn test_explicit_config_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "maxUndoLevels": 3 }"#,
        )
        .unwrap();
        let explicit = dir.path().join("other.json");
        std::fs::write(&explicit, r#"{ "maxUndoLevels": 7 }"#).unwrap();

        assert_eq!(load_config(None, dir.path()).unwrap().max_undo_levels, 3);
        assert_eq!(
            load_config(Some(&explicit), dir.path())
                .unwrap()
                .max_undo_levels,
            7
        );
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_config(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn test_load_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(
            &path,
            r#"{
                "kind": "Class",
                "properties": {
                    "name": { "value": "Shape" },
                    "features": { "list": [{ "kind": "Method" }] }
                }
            }"#,
        )
        .unwrap();

        let node = load_document(&path).unwrap();
        assert_eq!(node.kind, "Class");
        assert_eq!(node.text("name"), Some("Shape"));

        std::fs::write(&path, "{ nope").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(err.to_string().starts_with("Invalid document"));
    }
}
