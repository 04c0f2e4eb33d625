//!
//! Host Configuration
//!
//! Parsed from `membrane.toml`. Every section is optional:
//!
//! ```toml
//! [heap]
//! max_objects = 100000
//!
//! [logging]
//! install = true
//! filter = "membrane=debug"
//! ansi = false
//! thread_ids = true
//!
//! [modules]
//! enabled = ["simple", "errors"]
//! ```
//!
//! `MEMBRANE_LOG`, when set, takes precedence over `logging.filter`. A host
//! installs the subscriber when it is built unless `logging.install` is
//! false, which leaves logging to an embedding application.
//!

use std::path::{Path, PathBuf};

use membrane_core::HeapLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modules::BUILTIN_MODULES;

pub const CONFIG_FILE: &str = "membrane.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown module '{name}' in [modules] enabled")]
    UnknownModule { name: String },

    #[error("module '{name}' is enabled more than once")]
    DuplicateModule { name: String },

    #[error("heap.max_objects must be greater than zero")]
    EmptyHeap,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub heap: HeapConfig,
    pub logging: LogConfig,
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
    /// Maximum number of live objects; unbounded when absent
    pub max_objects: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Install the process-wide subscriber when a host is built
    pub install: bool,
    pub filter: String,
    pub ansi: bool,
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            install: true,
            filter: "warn".to_string(),
            ansi: false,
            thread_ids: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModulesConfig {
    pub enabled: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            enabled: BUILTIN_MODULES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl HostConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heap.max_objects == Some(0) {
            return Err(ConfigError::EmptyHeap);
        }
        for (index, name) in self.modules.enabled.iter().enumerate() {
            if !BUILTIN_MODULES.contains(&name.as_str()) {
                return Err(ConfigError::UnknownModule { name: name.clone() });
            }
            if self.modules.enabled[..index].contains(name) {
                return Err(ConfigError::DuplicateModule { name: name.clone() });
            }
        }
        Ok(())
    }

    pub fn heap_limits(&self) -> HeapLimits {
        HeapLimits {
            max_objects: self.heap.max_objects,
        }
    }
}
