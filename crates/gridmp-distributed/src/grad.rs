//! Gradient Reducer - Data-Parallel Gradient Synchronization
//!
//! Sums weight and bias gradients over the data-parallel group once the
//! backward pass has finished. The result is a sum, not a mean; scaling by
//! `dp_size` is left to the optimizer.
//!
//! With shape verification enabled, the members first all-gather a small
//! header describing both gradient shapes. Without it, only the element
//! counts are checked by the backend, so a `(2, 3)` gradient would silently
//! be summed into a `(3, 2)` one.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use gridmp_tensor::Tensor;
use tracing::debug;

use crate::comm::all_reduce_sum;
use crate::error::{DistributedError, Result};
use crate::process_group::ProcessGroup;

/// Maximum tensor rank the shape header can describe.
const MAX_DIMS: usize = 8;
/// Largest dimension an `f32` header slot represents exactly.
const MAX_EXACT_DIM: usize = 1 << 24;

// =============================================================================
// GradientReducer
// =============================================================================

/// Sums gradients across a data-parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradientReducer {
    verify_shapes: bool,
}

impl Default for GradientReducer {
    fn default() -> Self {
        Self { verify_shapes: true }
    }
}

impl GradientReducer {
    /// Creates a reducer; `verify_shapes` enables the shape handshake.
    #[must_use]
    pub fn new(verify_shapes: bool) -> Self {
        Self { verify_shapes }
    }

    /// Returns true if shapes are exchanged before reducing.
    #[must_use]
    pub fn verifies_shapes(&self) -> bool {
        self.verify_shapes
    }

    /// Returns `(sum of grad_w, sum of grad_b)` over `dp_group`, identical
    /// on every member.
    pub fn reduce(
        &self,
        grad_w: &Tensor<f32>,
        grad_b: &Tensor<f32>,
        dp_group: &ProcessGroup,
    ) -> Result<(Tensor<f32>, Tensor<f32>)> {
        debug!(
            rank = dp_group.global_rank(),
            w = ?grad_w.shape(),
            b = ?grad_b.shape(),
            group = ?dp_group.ranks(),
            "reducing gradients"
        );

        if self.verify_shapes {
            verify_shapes(grad_w, grad_b, dp_group)?;
        }

        let w = all_reduce_sum(grad_w, dp_group)?;
        let b = all_reduce_sum(grad_b, dp_group)?;
        Ok((w, b))
    }
}

/// Sums weight and bias gradients over `dp_group` with shape verification.
pub fn reduce_gradients(
    grad_w: &Tensor<f32>,
    grad_b: &Tensor<f32>,
    dp_group: &ProcessGroup,
) -> Result<(Tensor<f32>, Tensor<f32>)> {
    GradientReducer::default().reduce(grad_w, grad_b, dp_group)
}

// =============================================================================
// Shape Handshake
// =============================================================================

fn encode_shape(shape: &[usize], header: &mut Vec<f32>) -> Result<()> {
    if shape.len() > MAX_DIMS {
        return Err(DistributedError::configuration(format!(
            "gradient of rank {} exceeds the supported {MAX_DIMS} dimensions",
            shape.len()
        )));
    }
    if let Some(&dim) = shape.iter().find(|&&d| d >= MAX_EXACT_DIM) {
        return Err(DistributedError::configuration(format!(
            "gradient dimension {dim} is too large to verify"
        )));
    }

    header.push(shape.len() as f32);
    header.extend(shape.iter().map(|&d| d as f32));
    header.resize(header.len() + MAX_DIMS - shape.len(), 0.0);
    Ok(())
}

fn decode_shape(slot: &[f32]) -> Vec<usize> {
    let ndim = (slot[0] as usize).min(MAX_DIMS);
    slot[1..=ndim].iter().map(|&d| d as usize).collect()
}

fn verify_shapes(grad_w: &Tensor<f32>, grad_b: &Tensor<f32>, dp_group: &ProcessGroup) -> Result<()> {
    let mut header = Vec::with_capacity(2 * (MAX_DIMS + 1));
    encode_shape(grad_w.shape(), &mut header)?;
    encode_shape(grad_b.shape(), &mut header)?;

    let gathered = dp_group.all_gather_tensor(&Tensor::from_vec(header.clone(), &[header.len()])?)?;

    for (peer, theirs) in gathered.as_slice().chunks(header.len()).enumerate() {
        if theirs != header.as_slice() {
            let (w, b) = theirs.split_at(MAX_DIMS + 1);
            return Err(DistributedError::configuration(format!(
                "gradient shapes differ across the data-parallel group: rank {} has w {:?}, b {:?}; \
                 group rank {peer} has w {:?}, b {:?}",
                dp_group.global_rank(),
                grad_w.shape(),
                grad_b.shape(),
                decode_shape(w),
                decode_shape(b)
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_group::World;

    #[test]
    fn test_single_rank_is_unchanged() {
        let pg = ProcessGroup::mock();
        let w = Tensor::from_fn(&[3, 2], |i| i as f32);
        let b = Tensor::from_fn(&[1, 2], |i| i as f32);
        let (rw, rb) = reduce_gradients(&w, &b, &pg).unwrap();
        assert_eq!(rw, w);
        assert_eq!(rb, b);
    }

    #[test]
    fn test_sum_not_mean() {
        let results = World::run_local(3, |world| {
            let v = (world.rank() + 1) as f32;
            let w = Tensor::full(&[2, 2], v);
            let b = Tensor::full(&[1, 2], 10.0 * v);
            reduce_gradients(&w, &b, world.default_group()).unwrap()
        });
        for (w, b) in results {
            assert_eq!(w.to_vec(), vec![6.0; 4]);
            assert_eq!(b.to_vec(), vec![60.0; 2]);
        }
    }

    #[test]
    fn test_transposed_shapes_are_caught() {
        let results = World::run_local(2, |world| {
            let shape: &[usize] = if world.rank() == 0 { &[2, 3] } else { &[3, 2] };
            let w = Tensor::zeros(shape);
            let b = Tensor::zeros(&[1, 2]);
            reduce_gradients(&w, &b, world.default_group())
        });
        for r in results {
            assert!(r.unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_unverified_still_rejects_different_sizes() {
        let results = World::run_local(2, |world| {
            let w = Tensor::zeros(&[2, 2 + world.rank()]);
            let b = Tensor::zeros(&[1, 2]);
            GradientReducer::new(false).reduce(&w, &b, world.default_group())
        });
        for r in results {
            assert!(r.unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_shape_header_round_trip() {
        let mut header = Vec::new();
        encode_shape(&[4, 1, 7], &mut header).unwrap();
        assert_eq!(header.len(), MAX_DIMS + 1);
        assert_eq!(decode_shape(&header), vec![4, 1, 7]);
        assert!(encode_shape(&[1; MAX_DIMS + 1], &mut header).is_err());
    }
}
