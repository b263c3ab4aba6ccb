//! Error Types - Distributed Error Handling
//!
//! Every failure in the parallel layer is fatal to the training run: the
//! caller is expected to abort, not to recover in-process. The variants
//! separate the three ways a run goes wrong (bad configuration, a tensor
//! whose layout disagrees with the shard plan, a collective that could not
//! complete) so that the caller can report them precisely.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use gridmp_tensor::TensorError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// The error type for distributed operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributedError {
    /// Grid sizes, layer dimensions, ranks or gradient shapes are inconsistent.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the violated precondition.
        message: String,
    },

    /// A local tensor's feature width disagrees with the shard plan.
    #[error("Layout mismatch in {site}: expected feature width {expected}, got {actual}")]
    LayoutMismatch {
        /// The boundary operation that rejected the tensor.
        site: &'static str,
        /// The width derived from the layer partition.
        expected: usize,
        /// The width of the tensor that was passed in.
        actual: usize,
    },

    /// A collective could not complete (e.g. a peer aborted mid-operation).
    #[error("Collective failure in {operation}: {message}")]
    CollectiveFailure {
        /// The collective that failed.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A tensor-level shape or index violation.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

// =============================================================================
// Result Type
// =============================================================================

/// A specialized Result type for distributed operations.
pub type Result<T> = core::result::Result<T, DistributedError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl DistributedError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new collective failure.
    #[must_use]
    pub fn collective(operation: &'static str, message: impl Into<String>) -> Self {
        Self::CollectiveFailure {
            operation,
            message: message.into(),
        }
    }

    /// Returns true for configuration errors.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

// =============================================================================
// Tests
// =============================================================================
