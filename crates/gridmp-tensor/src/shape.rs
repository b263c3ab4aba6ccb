//! Shape - Shape Utilities
//!
//! Helpers for element counts, index validation and splitting a shape into
//! the outer/axis/inner blocks used by the axis-wise view operations.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use crate::error::{Result, TensorError};

// =============================================================================
// Shape Utilities
// =============================================================================

/// Computes the total number of elements from a shape.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Validates a multi-dimensional index against a shape.
pub fn validate_indices(indices: &[usize], shape: &[usize]) -> Result<()> {
    if indices.len() != shape.len() {
        return Err(TensorError::invalid_operation(format!(
            "Expected {} indices, got {}",
            shape.len(),
            indices.len()
        )));
    }

    for (&idx, &size) in indices.iter().zip(shape.iter()) {
        if idx >= size {
            return Err(TensorError::IndexOutOfBounds { index: idx, size });
        }
    }

    Ok(())
}

/// Decomposes `shape` around `dim` into `(outer, axis, inner)` extents.
///
/// A row-major tensor is then `outer` repetitions of `axis` blocks of
/// `inner` contiguous elements.
pub fn axis_extents(shape: &[usize], dim: usize) -> Result<(usize, usize, usize)> {
    if dim >= shape.len() {
        return Err(TensorError::InvalidDimension {
            index: dim,
            ndim: shape.len(),
        });
    }
    let outer = shape[..dim].iter().product();
    let inner = shape[dim + 1..].iter().product();
    Ok((outer, shape[dim], inner))
}

// =============================================================================
// Tests
// =============================================================================
