//! Sharded Layer - Strategy Binding for One Fully-Connected Layer
//!
//! A `ShardedLayer` pairs a [`LayerPartition`] with the strategy chosen at
//! build time. Each boundary operation checks the feature width of its
//! argument against the partition before any communication is issued, and
//! checks the width of the result afterwards.
//!
//! The first layer never communicates: its input is the full batch and its
//! output stays split across the model-parallel group, feeding the second
//! layer directly. The second layer dispatches to the strategy.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;

use gridmp_tensor::Tensor;

use crate::error::Result;
use crate::plan::{check_width, LayerPartition, LayerPosition};
use crate::process_group::ProcessGroup;
use crate::strategy::ModelParallelStrategy;

// =============================================================================
// ShardedLayer
// =============================================================================

/// One fully-connected layer bound to a model-parallel strategy.
#[derive(Debug, Clone)]
pub struct ShardedLayer {
    partition: LayerPartition,
    strategy: Arc<dyn ModelParallelStrategy>,
}

impl ShardedLayer {
    /// Binds `partition` to the strategy it was planned for.
    #[must_use]
    pub fn new(partition: LayerPartition) -> Self {
        Self {
            strategy: partition.strategy().build(),
            partition,
        }
    }

    /// Returns the partition descriptor.
    #[must_use]
    pub fn partition(&self) -> &LayerPartition {
        &self.partition
    }

    /// Returns the bound strategy.
    #[must_use]
    pub fn strategy(&self) -> &dyn ModelParallelStrategy {
        self.strategy.as_ref()
    }

    fn is_first(&self) -> bool {
        self.partition.position() == LayerPosition::First
    }

    /// Width of the activation arriving from the previous layer.
    fn incoming_width(&self) -> usize {
        if self.is_first() {
            self.partition.in_dim()
        } else {
            self.partition.in_dim() / self.partition.mp_size()
        }
    }

    /// Width of the activation handed to the next layer.
    fn outgoing_width(&self) -> usize {
        if self.is_first() {
            self.partition.part_out_dim()
        } else {
            self.partition.out_dim()
        }
    }

    /// Turns the incoming activation into this layer's `(batch, part_in_dim)`
    /// input.
    pub fn collect_input(&self, x: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        check_width("collect_input", x, self.incoming_width())?;
        if self.is_first() {
            return Ok(x.clone());
        }
        let full = self.strategy.collect_input(x, mp_group)?;
        check_width("collect_input", &full, self.partition.part_in_dim())?;
        Ok(full)
    }

    /// Turns this layer's `(batch, part_out_dim)` output into the activation
    /// handed to the next layer.
    pub fn collect_output(&self, out: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        check_width("collect_output", out, self.partition.part_out_dim())?;
        if self.is_first() {
            return Ok(out.clone());
        }
        let full = self.strategy.collect_output(out, mp_group)?;
        check_width("collect_output", &full, self.outgoing_width())?;
        Ok(full)
    }

    /// Maps the gradient of the outgoing activation to the gradient of this
    /// layer's local output.
    pub fn collect_output_grad(
        &self,
        grad: &Tensor<f32>,
        mp_group: &ProcessGroup,
    ) -> Result<Tensor<f32>> {
        check_width("collect_output_grad", grad, self.outgoing_width())?;
        if self.is_first() {
            return Ok(grad.clone());
        }
        let local = self
            .strategy
            .collect_output_grad(grad, mp_group.rank(), mp_group.size())?;
        check_width("collect_output_grad", &local, self.partition.part_out_dim())?;
        Ok(local)
    }

    /// Maps the gradient of this layer's input to the gradient of the
    /// incoming activation.
    pub fn collect_grad_x(&self, grad_x: &Tensor<f32>, mp_group: &ProcessGroup) -> Result<Tensor<f32>> {
        check_width("collect_grad_x", grad_x, self.partition.part_in_dim())?;
        if self.is_first() {
            return Ok(grad_x.clone());
        }
        let local = self.strategy.collect_grad_x(grad_x, mp_group)?;
        check_width("collect_grad_x", &local, self.incoming_width())?;
        Ok(local)
    }
}

// =============================================================================
// Tests
// =============================================================================
