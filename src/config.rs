//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/content-tree/content-tree.toml`
//! 3. Local config: `<dir>/.content-tree.toml`
//! 4. Environment variables: `CTREE_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationError, StoreOptions};
use crate::domain::{ContentNodeValue, DEFAULT_TYPE, ROOT_TYPE};

const APP_NAME: &str = "content-tree";
const LOCAL_CONFIG_FILE: &str = ".content-tree.toml";

/// Unified configuration for content-tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Where the CLI reads and saves the tree dump
    pub dump_path: PathBuf,
    /// Reserved type of the root node
    pub root_type: String,
    /// Type of blocks added without an explicit value
    pub default_type: String,
    /// `allowInnerBlocks` of blocks added without an explicit value
    pub default_allow_inner_blocks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dump_path: default_dump_path(),
            root_type: ROOT_TYPE.to_string(),
            default_type: DEFAULT_TYPE.to_string(),
            default_allow_inner_blocks: true,
        }
    }
}

/// Raw settings for intermediate parsing (`None` → not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub dump_path: Option<PathBuf>,
    pub root_type: Option<String>,
    pub default_type: Option<String>,
    pub default_allow_inner_blocks: Option<bool>,
}

fn default_dump_path() -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("tree.json"))
        .unwrap_or_else(|| PathBuf::from("content-tree.json"))
}

/// Get the XDG config directory for content-tree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{APP_NAME}.toml")))
}

/// Get the path to the local config file in `dir`.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(LOCAL_CONFIG_FILE)
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay wins wherever it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            dump_path: overlay
                .dump_path
                .clone()
                .unwrap_or_else(|| self.dump_path.clone()),
            root_type: overlay
                .root_type
                .clone()
                .unwrap_or_else(|| self.root_type.clone()),
            default_type: overlay
                .default_type
                .clone()
                .unwrap_or_else(|| self.default_type.clone()),
            default_allow_inner_blocks: overlay
                .default_allow_inner_blocks
                .unwrap_or(self.default_allow_inner_blocks),
        }
    }

    /// Expand `~`, `$VAR` and `${VAR}` in the dump path.
    fn expand_paths(&mut self) {
        let raw = self.dump_path.to_string_lossy().to_string();
        if let Ok(expanded) = shellexpand::full(&raw) {
            self.dump_path = PathBuf::from(expanded.as_ref());
        }
    }

    /// Load settings with layered precedence, using the XDG global config.
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), local_dir)
    }

    /// Load settings from an explicit global config file and local directory.
    ///
    /// Missing files are skipped; malformed ones are errors.
    pub fn load_from(global: Option<&Path>, local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(global_path)?);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                current = current.merge_with(&load_raw_settings(&local_path)?);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        Ok(current)
    }

    /// Apply CTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("CTREE").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("dump_path") {
            settings.dump_path = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("root_type") {
            settings.root_type = val;
        }
        if let Ok(val) = config.get_string("default_type") {
            settings.default_type = val;
        }
        if let Ok(val) = config.get_bool("default_allow_inner_blocks") {
            settings.default_allow_inner_blocks = val;
        }

        Ok(settings)
    }

    /// Value `add` uses when the caller passes none.
    pub fn default_node_value(&self) -> ContentNodeValue {
        ContentNodeValue::new(self.default_type.as_str()).with_inner_blocks(self.default_allow_inner_blocks)
    }

    /// Store options derived from these settings (no save hook attached).
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_root_type(self.root_type.as_str())
            .with_default_node_value(self.default_node_value())
    }

    /// Render as TOML for display.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize settings: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_overlay_when_merging_then_specified_fields_win() {
        let base = Settings::default();
        let overlay = RawSettings {
            default_type: Some("heading".into()),
            ..Default::default()
        };
        let merged = base.merge_with(&overlay);
        assert_eq!(merged.default_type, "heading");
        assert_eq!(merged.root_type, ROOT_TYPE);
        assert!(merged.default_allow_inner_blocks);
    }

    #[test]
    fn given_settings_when_building_store_options_then_default_value_follows() {
        let settings = Settings {
            default_type: "spacer".into(),
            default_allow_inner_blocks: false,
            ..Default::default()
        };
        let options = settings.store_options();
        let value = options.default_node_value.unwrap();
        assert_eq!(value.node_type, "spacer");
        assert_eq!(value.allow_inner_blocks, Some(false));
        assert_eq!(options.root_type, ROOT_TYPE);
    }
}
