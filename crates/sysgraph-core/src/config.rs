//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Settings for XML export and import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Spaces per nesting level; 0 writes a single line
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// Emit the `<?xml ...?>` declaration
    #[serde(default = "default_true")]
    pub include_declaration: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            include_declaration: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Fail the import on identity tokens that match no component instead
    /// of dropping the relation
    #[serde(default)]
    pub strict_tokens: bool,
}

fn default_indent() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Load `path` if it exists and parses, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "Configuration file not found, using defaults");
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid configuration, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
