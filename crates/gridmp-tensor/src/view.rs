//! Views and Slicing - Axis-wise Split and Concatenation
//!
//! Narrowing, equal chunking and concatenation along an arbitrary axis.
//! These are the layout primitives behind the model-parallel collectives:
//! `chunk` and `cat` along the feature axis must be exact inverses of each
//! other, so `chunk` refuses uneven splits instead of producing a ragged
//! last block.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use crate::dtype::Scalar;
use crate::error::{Result, TensorError};
use crate::shape::axis_extents;
use crate::tensor::Tensor;

// =============================================================================
// Slicing
// =============================================================================

impl<T: Scalar> Tensor<T> {
    /// Returns rows `[start, end)` along dimension 0.
    pub fn slice_dim0(&self, start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(TensorError::invalid_operation(format!(
                "slice_dim0 start {start} is past end {end}"
            )));
        }
        self.narrow(0, start, end - start)
    }

    /// Returns a copy of `length` entries along `dim` starting at `start`.
    ///
    /// # Arguments
    /// * `dim` - Dimension to narrow
    /// * `start` - Start index
    /// * `length` - Length of the narrowed dimension
    pub fn narrow(&self, dim: usize, start: usize, length: usize) -> Result<Self> {
        let (outer, axis, inner) = axis_extents(&self.shape, dim)?;
        if start + length > axis {
            return Err(TensorError::IndexOutOfBounds {
                index: start + length,
                size: axis,
            });
        }

        let mut data = Vec::with_capacity(outer * length * inner);
        for o in 0..outer {
            let begin = (o * axis + start) * inner;
            data.extend_from_slice(&self.data[begin..begin + length * inner]);
        }

        let mut shape = self.shape.clone();
        shape[dim] = length;
        Ok(Self { data, shape })
    }

    /// Splits the tensor into `parts` equally sized chunks along `dim`.
    ///
    /// Chunk `i` covers `[i * size / parts, (i + 1) * size / parts)`.
    /// Fails with [`TensorError::UnevenSplit`] when `parts` does not divide
    /// the dimension.
    pub fn chunk(&self, parts: usize, dim: usize) -> Result<Vec<Self>> {
        let size = self.size(dim)?;
        if parts == 0 || size % parts != 0 {
            return Err(TensorError::UnevenSplit { size, parts });
        }

        let length = size / parts;
        (0..parts)
            .map(|i| self.narrow(dim, i * length, length))
            .collect()
    }
}

// =============================================================================
// Concatenation
// =============================================================================

/// Concatenates tensors along an existing dimension, in slice order.
///
/// # Arguments
/// * `tensors` - Slice of tensors to concatenate
/// * `dim` - Dimension along which to concatenate
pub fn cat<T: Scalar>(tensors: &[Tensor<T>], dim: usize) -> Result<Tensor<T>> {
    let Some(first) = tensors.first() else {
        return Err(TensorError::invalid_operation(
            "Cannot concatenate empty list",
        ));
    };
    let (outer, _, inner) = axis_extents(first.shape(), dim)?;

    // Validate shapes match except for concat dimension
    for t in tensors.iter().skip(1) {
        if t.ndim() != first.ndim() {
            return Err(TensorError::shape_mismatch(first.shape(), t.shape()));
        }
        for (d, (&s1, &s2)) in first.shape().iter().zip(t.shape().iter()).enumerate() {
            if d != dim && s1 != s2 {
                return Err(TensorError::shape_mismatch(first.shape(), t.shape()));
            }
        }
    }

    let mut shape = first.shape().to_vec();
    shape[dim] = tensors.iter().map(|t| t.shape()[dim]).sum();

    let total: usize = tensors.iter().map(Tensor::numel).sum();
    let mut data = Vec::with_capacity(total);
    for o in 0..outer {
        for t in tensors {
            let block = t.shape()[dim] * inner;
            data.extend_from_slice(&t.as_slice()[o * block..(o + 1) * block]);
        }
    }

    Tensor::from_vec(data, &shape)
}

// =============================================================================
// Tests
// =============================================================================
