use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "frond.config.json";

/// Controller configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Undo levels kept (0 = unlimited)
    #[serde(default = "default_max_undo_levels")]
    pub max_undo_levels: usize,

    /// Run `Controller::verify` after every edit and abort on a violation
    #[serde(default = "default_verify_invariants")]
    pub verify_invariants: bool,
}

fn default_max_undo_levels() -> usize {
    100
}

fn default_verify_invariants() -> bool {
    cfg!(debug_assertions)
}

impl ControllerConfig {
    /// Load config from a directory, falling back to defaults
    pub fn load(cwd: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = cwd.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            Ok(ControllerConfig::default())
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Path the config would be loaded from
    pub fn path_in(cwd: impl AsRef<Path>) -> PathBuf {
        cwd.as_ref().join(DEFAULT_CONFIG_NAME)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_undo_levels: default_max_undo_levels(),
            verify_invariants: default_verify_invariants(),
        }
    }
}
