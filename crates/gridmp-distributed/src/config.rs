//! Configuration - Parallel Layout Settings
//!
//! Handles loading the grid layout from TOML files and environment
//! variables.
//!
//! ```toml
//! mp_size = 2
//! dp_size = 2
//! strategy = "megatron"
//! verify_gradient_shapes = true
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::StrategyKind;

/// Environment variable overriding `mp_size`.
pub const ENV_MP_SIZE: &str = "GRIDMP_MP_SIZE";
/// Environment variable overriding `dp_size`.
pub const ENV_DP_SIZE: &str = "GRIDMP_DP_SIZE";
/// Environment variable overriding `strategy`.
pub const ENV_STRATEGY: &str = "GRIDMP_STRATEGY";

/// Errors raised while loading or validating a [`ParallelConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Layout of the rank grid and the model-parallel strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParallelConfig {
    /// Ranks per model-parallel group.
    #[serde(default = "default_size")]
    pub mp_size: usize,
    /// Ranks per data-parallel group.
    #[serde(default = "default_size")]
    pub dp_size: usize,
    /// Model-parallel strategy.
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Exchange gradient shapes before every reduction.
    #[serde(default = "default_verify")]
    pub verify_gradient_shapes: bool,
}

fn default_size() -> usize {
    1
}

fn default_verify() -> bool {
    true
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            mp_size: default_size(),
            dp_size: default_size(),
            strategy: StrategyKind::default(),
            verify_gradient_shapes: default_verify(),
        }
    }
}

impl ParallelConfig {
    /// Creates a config for an `mp_size x dp_size` grid.
    #[must_use]
    pub fn new(mp_size: usize, dp_size: usize, strategy: StrategyKind) -> Self {
        Self {
            mp_size,
            dp_size,
            strategy,
            ..Self::default()
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Applies `GRIDMP_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by variable name.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_MP_SIZE) {
            self.mp_size = parse_size(ENV_MP_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_DP_SIZE) {
            self.dp_size = parse_size(ENV_DP_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_STRATEGY) {
            self.strategy = value
                .parse()
                .map_err(|e: crate::DistributedError| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Validate configuration - always called before building a context
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mp_size == 0 {
            return Err(ConfigError::Invalid("mp_size must be at least 1".to_string()));
        }
        if self.dp_size == 0 {
            return Err(ConfigError::Invalid("dp_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Number of ranks the grid requires.
    #[must_use]
    pub fn world_size(&self) -> usize {
        self.mp_size * self.dp_size
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative integer, got '{value}'")))
}
