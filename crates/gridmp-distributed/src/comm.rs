//! Communication - High-level Communication Utilities
//!
//! Tensor-level collectives used by the model-parallel strategies and the
//! gradient reducer. All of them borrow their input and return a new tensor.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use gridmp_tensor::{cat, Tensor};
use tracing::debug;

use crate::backend::ReduceOp;
use crate::error::{DistributedError, Result};
use crate::process_group::ProcessGroup;

// =============================================================================
// All-Reduce Operations
// =============================================================================

/// Performs all-reduce sum on a tensor.
pub fn all_reduce_sum(tensor: &Tensor<f32>, pg: &ProcessGroup) -> Result<Tensor<f32>> {
    debug!(rank = pg.global_rank(), shape = ?tensor.shape(), group = ?pg.ranks(), "all_reduce_sum");
    pg.all_reduce_tensor(tensor, ReduceOp::Sum)
}

// =============================================================================
// Gather Operations
// =============================================================================

/// All-gathers a tensor and concatenates the pieces along `dim` in group
/// rank order.
///
/// Every rank must contribute a tensor of the same shape.
pub fn gather_tensor(tensor: &Tensor<f32>, dim: usize, pg: &ProcessGroup) -> Result<Tensor<f32>> {
    debug!(rank = pg.global_rank(), shape = ?tensor.shape(), dim, group = ?pg.ranks(), "gather_tensor");
    tensor.size(dim)?;

    let stacked = pg.all_gather_tensor(tensor)?;
    let pieces: Vec<Tensor<f32>> = stacked
        .chunk(pg.size(), 0)?
        .into_iter()
        .map(|piece| piece.reshape(tensor.shape()))
        .collect::<gridmp_tensor::Result<_>>()?;

    Ok(cat(&pieces, dim)?)
}

// =============================================================================
// Reduce-Scatter Operations
// =============================================================================

/// Reduce-scatters a tensor with sum along dimension 0.
pub fn reduce_scatter_sum(tensor: &Tensor<f32>, pg: &ProcessGroup) -> Result<Tensor<f32>> {
    debug!(rank = pg.global_rank(), shape = ?tensor.shape(), group = ?pg.ranks(), "reduce_scatter_sum");
    pg.reduce_scatter_tensor(tensor, ReduceOp::Sum)
}

// =============================================================================
// Model Parallel Utilities
// =============================================================================

/// Returns block `index` of `parts` equal blocks of `tensor` along `dim`.
///
/// This is a local operation; no communication takes place.
pub fn shard_of(tensor: &Tensor<f32>, dim: usize, index: usize, parts: usize) -> Result<Tensor<f32>> {
    if index >= parts {
        return Err(DistributedError::configuration(format!(
            "shard index {index} out of range for {parts} parts"
        )));
    }
    let size = tensor.size(dim)?;
    if size % parts != 0 {
        return Err(DistributedError::configuration(format!(
            "dimension {dim} of size {size} does not split into {parts} equal parts"
        )));
    }

    let length = size / parts;
    Ok(tensor.narrow(dim, index * length, length)?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_group::World;

    fn columns(rank: usize) -> Tensor<f32> {
        let r = rank as f32;
        Tensor::from_vec(vec![r, 10.0 + r, 20.0 + r, 30.0 + r], &[2, 2]).unwrap()
    }

    #[test]
    fn test_single_rank_collectives_are_identity() {
        let pg = ProcessGroup::mock();
        let t = columns(0);
        assert_eq!(all_reduce_sum(&t, &pg).unwrap(), t);
        assert_eq!(gather_tensor(&t, 1, &pg).unwrap(), t);
        assert_eq!(reduce_scatter_sum(&t, &pg).unwrap(), t);
    }

    #[test]
    fn test_gather_tensor_along_columns() {
        let results = World::run_local(2, |world| {
            gather_tensor(&columns(world.rank()), 1, world.default_group()).unwrap()
        });
        for out in results {
            assert_eq!(out.shape(), &[2, 4]);
            assert_eq!(
                out.to_vec(),
                vec![0.0, 10.0, 1.0, 11.0, 20.0, 30.0, 21.0, 31.0]
            );
        }
    }

    #[test]
    fn test_gather_tensor_along_rows() {
        let results = World::run_local(2, |world| {
            gather_tensor(&columns(world.rank()), 0, world.default_group()).unwrap()
        });
        assert_eq!(results[0].shape(), &[4, 2]);
        assert_eq!(
            results[0].to_vec(),
            vec![0.0, 10.0, 20.0, 30.0, 1.0, 11.0, 21.0, 31.0]
        );
    }

    #[test]
    fn test_gather_tensor_bad_dim() {
        let pg = ProcessGroup::mock();
        assert!(gather_tensor(&columns(0), 2, &pg).is_err());
    }

    #[test]
    fn test_shard_of() {
        let t = Tensor::from_vec((0..8).map(|v| v as f32).collect(), &[2, 4]).unwrap();
        assert_eq!(shard_of(&t, 1, 1, 2).unwrap().to_vec(), vec![2.0, 3.0, 6.0, 7.0]);
        assert!(shard_of(&t, 1, 2, 2).unwrap_err().is_configuration());
        assert!(shard_of(&t, 1, 0, 3).unwrap_err().is_configuration());
    }

    #[test]
    fn test_shard_then_gather_round_trips() {
        let full = Tensor::from_vec((0..12).map(|v| v as f32).collect(), &[2, 6]).unwrap();
        let results = World::run_local(3, |world| {
            let pg = world.default_group();
            let part = shard_of(&full, 1, pg.rank(), pg.size()).unwrap();
            gather_tensor(&part, 1, pg).unwrap()
        });
        for out in results {
            assert_eq!(out, full);
        }
    }
}
