//! Tensor - Dense Row-Major Array
//!
//! The `Tensor` struct holds rank-local activations, gradients, weights and
//! labels. Storage is always contiguous and row-major; every operation
//! returns a new tensor and leaves its inputs untouched, which is what the
//! collectives rely on when they hand results back to callers.
//!
//! # Key Features
//! - Generic over element type (f32, i32, ...)
//! - Shape validation on construction
//! - 2-D transpose and matmul for the fully-connected layer math
//! - Element-wise arithmetic with exact shape agreement (no broadcasting)
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;

use num_traits::Float;

use crate::dtype::{Numeric, Scalar};
use crate::error::{Result, TensorError};
use crate::shape::{numel, validate_indices};

// =============================================================================
// Tensor Struct
// =============================================================================

/// An N-dimensional, contiguous, row-major array.
#[derive(Clone, PartialEq)]
pub struct Tensor<T: Scalar> {
    /// Element storage in row-major order.
    pub(crate) data: Vec<T>,
    /// Shape of the tensor.
    pub(crate) shape: Vec<usize>,
}

impl<T: Scalar> Tensor<T> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a new tensor from a vector with the given shape.
    ///
    /// # Arguments
    /// * `data` - Vector of data in row-major order
    /// * `shape` - Shape of the tensor
    ///
    /// # Returns
    /// New tensor, or error if shape doesn't match data length.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        if numel(shape) != data.len() {
            return Err(TensorError::shape_mismatch(&[data.len()], shape));
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Creates a new tensor by copying a slice.
    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Creates a tensor filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: T) -> Self {
        Self {
            data: vec![value; numel(shape)],
            shape: shape.to_vec(),
        }
    }

    /// Creates a tensor whose elements are produced from their flat index.
    #[must_use]
    pub fn from_fn(shape: &[usize], f: impl Fn(usize) -> T) -> Self {
        Self {
            data: (0..numel(shape)).map(f).collect(),
            shape: shape.to_vec(),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the size of a dimension.
    pub fn size(&self, dim: usize) -> Result<usize> {
        self.shape
            .get(dim)
            .copied()
            .ok_or(TensorError::InvalidDimension {
                index: dim,
                ndim: self.ndim(),
            })
    }

    // =========================================================================
    // Data Access
    // =========================================================================

    /// Returns the element at the given multi-dimensional index.
    pub fn get(&self, indices: &[usize]) -> Result<T> {
        validate_indices(indices, &self.shape)?;
        let mut offset = 0;
        for (&idx, &dim) in indices.iter().zip(self.shape.iter()) {
            offset = offset * dim + idx;
        }
        Ok(self.data[offset])
    }

    /// Returns the underlying row-major data.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns a copy of the data as a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.data.clone()
    }

    /// Consumes the tensor and returns its data.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    // =========================================================================
    // Shape Operations
    // =========================================================================

    /// Returns a tensor with the same data and a new shape.
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self> {
        if numel(new_shape) != self.numel() {
            return Err(TensorError::shape_mismatch(&self.shape, new_shape));
        }
        Ok(Self {
            data: self.data.clone(),
            shape: new_shape.to_vec(),
        })
    }

    /// Transposes a 2-D tensor, materializing the result contiguously.
    pub fn t(&self) -> Result<Self> {
        if self.ndim() != 2 {
            return Err(TensorError::invalid_operation(format!(
                "t() expects a 2-D tensor, got {} dimensions",
                self.ndim()
            )));
        }
        let (rows, cols) = (self.shape[0], self.shape[1]);
        let mut data = Vec::with_capacity(self.numel());
        for c in 0..cols {
            for r in 0..rows {
                data.push(self.data[r * cols + c]);
            }
        }
        Ok(Self {
            data,
            shape: vec![cols, rows],
        })
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(T) -> T) -> Self {
        Self {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Combines two same-shaped tensors element by element.
    pub fn zip_map(&self, other: &Self, f: impl Fn(T, T) -> T) -> Result<Self> {
        if self.shape != other.shape {
            return Err(TensorError::shape_mismatch(&self.shape, &other.shape));
        }
        Ok(Self {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
        })
    }
}

impl<T: Numeric> Tensor<T> {
    /// Creates a tensor filled with zeros.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, T::zero())
    }

    /// Element-wise addition. Shapes must match exactly.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Element-wise subtraction. Shapes must match exactly.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise multiplication. Shapes must match exactly.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a * b)
    }

    /// Multiplies every element by a scalar.
    #[must_use]
    pub fn mul_scalar(&self, scalar: T) -> Self {
        self.map(|v| v * scalar)
    }

    /// Sums along `dim`, keeping it as a dimension of size one.
    pub fn sum_dim(&self, dim: usize) -> Result<Self> {
        let size = self.size(dim)?;
        let outer: usize = self.shape[..dim].iter().product();
        let inner: usize = self.shape[dim + 1..].iter().product();

        let mut data = vec![T::zero(); outer * inner];
        for o in 0..outer {
            for s in 0..size {
                let src = (o * size + s) * inner;
                for i in 0..inner {
                    data[o * inner + i] = data[o * inner + i] + self.data[src + i];
                }
            }
        }

        let mut shape = self.shape.clone();
        shape[dim] = 1;
        Ok(Self { data, shape })
    }

    /// 2-D matrix multiplication.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.ndim() != 2 || other.ndim() != 2 {
            return Err(TensorError::invalid_operation(
                "matmul requires 2-D tensors",
            ));
        }

        let (m, k1) = (self.shape[0], self.shape[1]);
        let (k2, n) = (other.shape[0], other.shape[1]);
        if k1 != k2 {
            return Err(TensorError::invalid_operation(format!(
                "matmul inner dimensions must match: {k1} vs {k2}"
            )));
        }

        let mut data = vec![T::zero(); m * n];
        for i in 0..m {
            for p in 0..k1 {
                let a = self.data[i * k1 + p];
                for j in 0..n {
                    data[i * n + j] = data[i * n + j] + a * other.data[p * n + j];
                }
            }
        }
        Self::from_vec(data, &[m, n])
    }
}

impl<T: Numeric + Float> Tensor<T> {
    /// Returns the largest absolute element-wise difference to `other`.
    pub fn max_abs_diff(&self, other: &Self) -> Result<T> {
        let diff = self.sub(other)?;
        Ok(diff
            .data
            .iter()
            .fold(T::zero(), |acc, &v| if v.abs() > acc { v.abs() } else { acc }))
    }

    /// Checks element-wise closeness within an absolute tolerance.
    #[must_use]
    pub fn allclose(&self, other: &Self, tol: T) -> bool {
        self.max_abs_diff(other).is_ok_and(|d| d <= tol)
    }
}

impl<T: Scalar> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}

impl<T: Scalar> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ndim() != 2 {
            return write!(f, "Tensor({:?}, {:?})", self.shape, self.data);
        }
        let cols = self.shape[1];
        writeln!(f, "Tensor{:?} [", self.shape)?;
        for r in 0..self.shape[0] {
            let start = r * cols;
            writeln!(f, "  {:?}", &self.data[start..start + cols])?;
        }
        write!(f, "]")
    }
}

// =============================================================================
// Tests
// =============================================================================
