//! Layered configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. user config: `<config dir>/brt/config.yaml`
//! 3. plant config: the nearest `.brt/config.yaml` walking up from the
//!    working directory
//!
//! Command-line flags and their `BRT_*` environment variables override all
//! of these in the CLI layer.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::team::{Policy, PolicyConfig, Role};

/// Name of the per-plant directory
pub const PLANT_DIR: &str = ".brt";

/// Default state file name inside the plant directory
pub const STATE_FILE: &str = "plant.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Configuration values; unset fields fall through to lower layers
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Default actor id for commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Default role claimed by the actor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Plant state file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Default log filter, e.g. "info" or "brt=debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    /// Capability policy overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyConfig>,

    /// Directory containing `.brt`, when one was found
    #[serde(skip)]
    pub plant_root: Option<PathBuf>,
}

impl Config {
    /// Load and merge every config layer for the current directory
    pub fn load() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_from(&cwd)
    }

    /// Load and merge every config layer for `start`
    pub fn load_from(start: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dirs) = directories::ProjectDirs::from("", "", "brt") {
            let user = dirs.config_dir().join("config.yaml");
            if user.exists() {
                config = config.merge(Self::from_file(&user)?);
            }
        }

        if let Some(root) = find_plant_root(start) {
            let plant = root.join(PLANT_DIR).join("config.yaml");
            if plant.exists() {
                let mut layer = Self::from_file(&plant)?;
                // Relative state paths in a plant config are relative to the plant root
                if let Some(state) = layer.state_file.take() {
                    layer.state_file = Some(if state.is_relative() {
                        root.join(state)
                    } else {
                        state
                    });
                }
                config = config.merge(layer);
            }
            config.plant_root = Some(root);
        }

        Ok(config)
    }

    /// Parse one config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let has_content = contents.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        });
        if !has_content {
            return Ok(Self::default());
        }
        serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Overlay `other` on top of `self`
    pub fn merge(self, other: Self) -> Self {
        Self {
            actor: other.actor.or(self.actor),
            role: other.role.or(self.role),
            state_file: other.state_file.or(self.state_file),
            log: other.log.or(self.log),
            policy: other.policy.or(self.policy),
            plant_root: other.plant_root.or(self.plant_root),
        }
    }

    /// Effective state file path
    pub fn state_path(&self) -> PathBuf {
        if let Some(path) = &self.state_file {
            return path.clone();
        }
        self.plant_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PLANT_DIR)
            .join(STATE_FILE)
    }

    /// Effective capability policy
    pub fn policy(&self) -> Policy {
        self.policy
            .as_ref()
            .map(Policy::from_config)
            .unwrap_or_default()
    }

    pub fn log_filter(&self) -> &str {
        self.log.as_deref().unwrap_or("warn")
    }
}

/// Walk up from `start` to the first directory that contains `.brt`
pub fn find_plant_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PLANT_DIR).is_dir())
        .map(Path::to_path_buf)
}
