//! Strategy - Model-Parallel Collection Strategies
//!
//! The forward collectors rebuild activations and outputs at layer
//! boundaries; the backward collectors are their exact adjoints. Two
//! strategies implement the same four operations:
//!
//! - **Naive**: every layer splits its output features. Forward gathers the
//!   column blocks back together; backward selects this rank's column block
//!   of the output gradient and reduce-scatters the input gradient.
//! - **Megatron**: the second layer splits its input features, so its output
//!   is a sum of partial results. Forward input collection is a no-op and
//!   output collection is an all-reduce; both backward collectors are no-ops.
//!
//! The feature axis is always dimension 1 of a `(batch, features)` tensor.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use gridmp_tensor::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comm::{all_reduce_sum, gather_tensor, reduce_scatter_sum, shard_of};
use crate::error::{DistributedError, Result};
use crate::process_group::ProcessGroup;

const FEATURE_AXIS: usize = 1;

// =============================================================================
// Strategy Trait
// =============================================================================

/// The forward/backward collection operations of one model-parallel strategy.
///
/// Every method taking a [`ProcessGroup`] is a collective over that group and
/// must be called by all of its members in the same order.
pub trait ModelParallelStrategy: Send + Sync + fmt::Debug {
    /// Returns which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Reconstructs the input a layer consumes from the rank-local
    /// activation.
    fn collect_input(&self, local_x: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>>;

    /// Reconstructs the full layer output from the rank-local output.
    fn collect_output(&self, local_out: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>>;

    /// Maps the gradient of the full output back to this rank's local output.
    fn collect_output_grad(
        &self,
        output_grad: &Tensor<f32>,
        mp_index: usize,
        mp_size: usize,
    ) -> Result<Tensor<f32>>;

    /// Maps the gradient of the collected input back to this rank's local
    /// activation.
    fn collect_grad_x(&self, grad_x: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>>;
}

// =============================================================================
// Naive Strategy
// =============================================================================

/// Output-split on both layers; activations are rebuilt by concatenation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveStrategy;

impl ModelParallelStrategy for NaiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Naive
    }

    fn collect_input(&self, local_x: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        debug!(rank = mp_group.global_rank(), shape = ?local_x.shape(), "naive collect_input");
        gather_tensor(local_x, FEATURE_AXIS, mp_group)
    }

    fn collect_output(&self, local_out: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        debug!(rank = mp_group.global_rank(), shape = ?local_out.shape(), "naive collect_output");
        gather_tensor(local_out, FEATURE_AXIS, mp_group)
    }

    fn collect_output_grad(
        &self,
        output_grad: &Tensor<f32>,
        mp_index: usize,
        mp_size: usize,
    ) -> Result<Tensor<f32>> {
        debug!(mp_index, mp_size, shape = ?output_grad.shape(), "naive collect_output_grad");
        shard_of(output_grad, FEATURE_AXIS, mp_index, mp_size)
    }

    fn collect_grad_x(&self, grad_x: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        debug!(rank = mp_group.global_rank(), shape = ?grad_x.shape(), "naive collect_grad_x");

        // (batch, in) -> (in, batch): row block i is feature block i.
        let transposed = grad_x.t()?;
        let reduced = reduce_scatter_sum(&transposed, mp_group)?;
        Ok(reduced.t()?)
    }
}

// =============================================================================
// Megatron Strategy
// =============================================================================

/// Input-split second layer; partial outputs are summed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MegatronStrategy;

impl ModelParallelStrategy for MegatronStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Megatron
    }

    fn collect_input(&self, local_x: &Tensor<f32>, _mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        Ok(local_x.clone())
    }

    fn collect_output(&self, local_out: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        debug!(rank = mp_group.global_rank(), shape = ?local_out.shape(), "megatron collect_output");
        all_reduce_sum(local_out, mp_group)
    }

    fn collect_output_grad(
        &self,
        output_grad: &Tensor<f32>,
        _mp_index: usize,
        _mp_size: usize,
    ) -> Result<Tensor<f32>> {
        Ok(output_grad.clone())
    }

    fn collect_grad_x(&self, grad_x: &Tensor<f32>, _mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        Ok(grad_x.clone())
    }
}

// =============================================================================
// Strategy Kind
// =============================================================================

/// Selects a model-parallel strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// See [`NaiveStrategy`].
    #[default]
    Naive,
    /// See [`MegatronStrategy`].
    Megatron,
}

impl StrategyKind {
    /// Returns true for Megatron-style tensor parallelism.
    #[must_use]
    pub fn is_megatron(self) -> bool {
        self == StrategyKind::Megatron
    }

    /// Instantiates the strategy.
    #[must_use]
    pub fn build(self) -> Arc<dyn ModelParallelStrategy> {
        match self {
            StrategyKind::Naive => Arc::new(NaiveStrategy),
            StrategyKind::Megatron => Arc::new(MegatronStrategy),
        }
    }

    /// Returns the lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Naive => "naive",
            StrategyKind::Megatron => "megatron",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DistributedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(StrategyKind::Naive),
            "megatron" => Ok(StrategyKind::Megatron),
            other => Err(DistributedError::configuration(format!(
                "unknown model-parallel strategy '{other}' (expected 'naive' or 'megatron')"
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
