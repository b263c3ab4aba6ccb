//! Data Sharding - Per-Rank Training Set Slices
//!
//! The training set is cut into `dp_size` contiguous, equally sized chunks.
//! Every rank of a model-parallel group sees the same chunk; rows past
//! `dp_size * chunk` are dropped. No shuffling happens here.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::ops::Range;

use gridmp_tensor::{Scalar, Tensor};
use tracing::{debug, warn};

use crate::error::{DistributedError, Result};
use crate::grid::RankGrid;

// =============================================================================
// DataShard
// =============================================================================

/// Row bounds of the data assigned to one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataShard {
    /// Data-parallel index owning the shard.
    pub dp_index: usize,
    /// Rows `[start, end)` of the global data set.
    pub rows: Range<usize>,
    /// Rows at the tail that no shard covers.
    pub dropped: usize,
}

impl DataShard {
    /// Computes the shard of `rank` for a data set of `data_num` rows.
    pub fn for_rank(data_num: usize, mp_size: usize, dp_size: usize, rank: usize) -> Result<Self> {
        let grid = RankGrid::new(mp_size, dp_size)?;
        if rank >= grid.world_size() {
            return Err(DistributedError::configuration(format!(
                "rank {rank} outside a grid of {} ranks",
                grid.world_size()
            )));
        }

        let dp_index = grid.dp_index(rank);
        let chunk = data_num / dp_size;
        Ok(Self {
            dp_index,
            rows: dp_index * chunk..(dp_index + 1) * chunk,
            dropped: data_num - dp_size * chunk,
        })
    }

    /// Number of rows in the shard.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the shard holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Slices the rows of `x` and `y` belonging to `rank`.
pub fn split_data<X: Scalar, Y: Scalar>(
    x: &Tensor<X>,
    y: &Tensor<Y>,
    mp_size: usize,
    dp_size: usize,
    rank: usize,
) -> Result<(Tensor<X>, Tensor<Y>)> {
    let data_num = x.size(0)?;
    let labels = y.size(0)?;
    if labels != data_num {
        return Err(DistributedError::configuration(format!(
            "x has {data_num} rows but y has {labels}"
        )));
    }

    let shard = DataShard::for_rank(data_num, mp_size, dp_size, rank)?;
    if shard.dropped > 0 {
        warn!(
            rank,
            data_num,
            dp_size,
            dropped = shard.dropped,
            "data set does not divide evenly; trailing rows are dropped"
        );
    }
    debug!(rank, dp_index = shard.dp_index, rows = ?shard.rows, "data shard");

    Ok((
        x.slice_dim0(shard.rows.start, shard.rows.end)?,
        y.slice_dim0(shard.rows.start, shard.rows.end)?,
    ))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_rank_bounds() {
        // mp = 2, dp = 3, 10 rows: chunk 3, one row dropped.
        let shard = DataShard::for_rank(10, 2, 3, 5).unwrap();
        assert_eq!(shard.dp_index, 2);
        assert_eq!(shard.rows, 6..9);
        assert_eq!(shard.dropped, 1);
        assert_eq!(shard.len(), 3);
    }

    #[test]
    fn test_mp_peers_share_a_shard() {
        let a = DataShard::for_rank(8, 2, 2, 2).unwrap();
        let b = DataShard::for_rank(8, 2, 2, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rows, 4..8);
    }

    #[test]
    fn test_more_replicas_than_rows() {
        let shard = DataShard::for_rank(2, 1, 4, 3).unwrap();
        assert!(shard.is_empty());
        assert_eq!(shard.dropped, 2);
    }

    #[test]
    fn test_bad_rank_and_sizes() {
        assert!(DataShard::for_rank(8, 2, 2, 4).unwrap_err().is_configuration());
        assert!(DataShard::for_rank(8, 0, 2, 0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_split_data_rows() {
        let x = Tensor::<f32>::from_fn(&[5, 2], |i| i as f32);
        let y = Tensor::<i32>::from_vec(vec![0, 1, 2, 3, 4], &[5]).unwrap();

        let (xs, ys) = split_data(&x, &y, 1, 2, 1).unwrap();
        assert_eq!(xs.shape(), &[2, 2]);
        assert_eq!(xs.to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(ys.to_vec(), vec![2, 3]);
    }

    #[test]
    fn test_split_data_length_mismatch() {
        let x = Tensor::<f32>::zeros(&[4, 2]);
        let y = Tensor::<i32>::zeros(&[3]);
        assert!(split_data(&x, &y, 1, 2, 0).unwrap_err().is_configuration());
    }
}
