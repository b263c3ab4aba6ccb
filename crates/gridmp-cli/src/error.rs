//! Error - CLI Error Types
//!
//! Defines error types for CLI operations.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use gridmp_distributed::{ConfigError, DistributedError};
use gridmp_tensor::TensorError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file or override error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error raised by the parallel layer
    #[error(transparent)]
    Distributed(#[from] DistributedError),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Simulated step disagrees with the single-process reference
    #[error("Simulation mismatch: {0}")]
    Mismatch(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

// =============================================================================
// Error Conversion
// =============================================================================

impl From<TensorError> for CliError {
    fn from(e: TensorError) -> Self {
        CliError::Distributed(e.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}
