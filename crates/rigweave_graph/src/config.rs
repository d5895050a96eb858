// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph controller configuration.
//!
//! Stored as RON so hosts can keep it next to their own settings files.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current config format version
pub const CONFIG_FORMAT_VERSION: u32 = 1;

/// Default undo history depth
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 100;

/// Controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Format version
    pub version: u32,
    /// Number of top-level actions kept live on the undo stack
    pub max_undo_depth: usize,
    /// Add and wire a `BeginExecution` node when the first side-effecting
    /// node lands in a graph without one
    pub auto_insert_entry: bool,
    /// Cache reachability for repeated link queries from the same pin
    pub cycle_cache: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_FORMAT_VERSION,
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            auto_insert_entry: true,
            cycle_cache: true,
        }
    }
}

impl GraphConfig {
    /// Parse from a RON string
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        let config: GraphConfig = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a pretty RON string
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version > CONFIG_FORMAT_VERSION {
            return Err(ConfigError::Invalid(format!(
                "config version {} is newer than supported version {}",
                self.version, CONFIG_FORMAT_VERSION
            )));
        }
        if self.max_undo_depth == 0 {
            return Err(ConfigError::Invalid("max_undo_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}
