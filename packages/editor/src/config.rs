use crate::errors::{EditorError, EditorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Roots created when the editor starts
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,

    /// Maximum number of undo levels (0 = unlimited)
    #[serde(default = "default_levels")]
    pub undo_levels: usize,

    /// Rounds model and render post-fixers may take before giving up
    #[serde(default = "default_levels")]
    pub max_post_fixer_passes: usize,

    #[serde(default)]
    pub read_only: bool,

    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_roots() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_levels() -> usize {
    100
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl EditorConfig {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> EditorResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EditorConfig = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(EditorConfig::default())
        }
    }

    pub fn validate(&self) -> EditorResult<()> {
        if self.roots.is_empty() {
            return Err(EditorError::Config("at least one root is required".to_string()));
        }
        if self.max_post_fixer_passes == 0 {
            return Err(EditorError::Config("maxPostFixerPasses must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            undo_levels: default_levels(),
            max_post_fixer_passes: default_levels(),
            read_only: false,
            log_filter: default_log_filter(),
        }
    }
}
