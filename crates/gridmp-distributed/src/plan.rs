//! Shard Planner - Per-Layer Partition Descriptors
//!
//! Decides, for each fully-connected layer, which feature dimension is split
//! across the model-parallel group:
//!
//! | layer  | strategy | part_in_dim     | part_out_dim     |
//! |--------|----------|-----------------|------------------|
//! | first  | any      | `in_dim`        | `out_dim / mp`   |
//! | second | megatron | `in_dim / mp`   | `out_dim`        |
//! | second | naive    | `in_dim`        | `out_dim / mp`   |
//!
//! Only the split dimension has to divide evenly.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use gridmp_tensor::{Scalar, Tensor};

use crate::error::{DistributedError, Result};
use crate::strategy::StrategyKind;

// =============================================================================
// Layer Position
// =============================================================================

/// Position of a fully-connected layer in the two-layer network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerPosition {
    /// The input layer (`fc1`).
    First,
    /// The output layer (`fc2`).
    Second,
}

impl LayerPosition {
    /// Returns true for the first layer.
    #[must_use]
    pub fn is_first(self) -> bool {
        self == LayerPosition::First
    }
}

/// The feature dimension that is split across the model-parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitAxis {
    /// The input features are split.
    Input,
    /// The output features are split.
    Output,
}

// =============================================================================
// Planning
// =============================================================================

/// Computes `(part_in_dim, part_out_dim)` for one layer.
///
/// Both `in_dim` and `out_dim` must divide by `mp_size`, whichever of the
/// two is split.
pub fn plan(
    is_first_layer: bool,
    is_megatron: bool,
    in_dim: usize,
    out_dim: usize,
    mp_size: usize,
) -> Result<(usize, usize)> {
    if mp_size == 0 {
        return Err(DistributedError::configuration("mp_size must be positive"));
    }

    let part_in_dim = split(in_dim, mp_size, "in_dim")?;
    let part_out_dim = split(out_dim, mp_size, "out_dim")?;

    if !is_first_layer && is_megatron {
        Ok((part_in_dim, out_dim))
    } else {
        Ok((in_dim, part_out_dim))
    }
}

fn split(dim: usize, mp_size: usize, name: &str) -> Result<usize> {
    if dim % mp_size != 0 {
        return Err(DistributedError::configuration(format!(
            "{name} = {dim} is not divisible by mp_size = {mp_size}"
        )));
    }
    Ok(dim / mp_size)
}

// =============================================================================
// Layer Partition
// =============================================================================

/// Partition descriptor of one fully-connected layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPartition {
    position: LayerPosition,
    strategy: StrategyKind,
    in_dim: usize,
    out_dim: usize,
    mp_size: usize,
    part_in_dim: usize,
    part_out_dim: usize,
}

impl LayerPartition {
    /// Plans a layer of global shape `in_dim -> out_dim` over `mp_size` ranks.
    pub fn new(
        position: LayerPosition,
        strategy: StrategyKind,
        in_dim: usize,
        out_dim: usize,
        mp_size: usize,
    ) -> Result<Self> {
        let (part_in_dim, part_out_dim) = plan(
            position.is_first(),
            strategy.is_megatron(),
            in_dim,
            out_dim,
            mp_size,
        )?;
        Ok(Self {
            position,
            strategy,
            in_dim,
            out_dim,
            mp_size,
            part_in_dim,
            part_out_dim,
        })
    }

    /// Returns the layer position.
    #[must_use]
    pub fn position(&self) -> LayerPosition {
        self.position
    }

    /// Returns the strategy the layer was planned for.
    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Returns the global input width.
    #[must_use]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Returns the global output width.
    #[must_use]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Returns the model-parallel group size.
    #[must_use]
    pub fn mp_size(&self) -> usize {
        self.mp_size
    }

    /// Returns the rank-local input width.
    #[must_use]
    pub fn part_in_dim(&self) -> usize {
        self.part_in_dim
    }

    /// Returns the rank-local output width.
    #[must_use]
    pub fn part_out_dim(&self) -> usize {
        self.part_out_dim
    }

    /// Returns the dimension that is split.
    #[must_use]
    pub fn split_axis(&self) -> SplitAxis {
        if self.position == LayerPosition::Second && self.strategy.is_megatron() {
            SplitAxis::Input
        } else {
            SplitAxis::Output
        }
    }

    /// Shape of the rank-local weight, `[part_in_dim, part_out_dim]`.
    #[must_use]
    pub fn weight_shape(&self) -> [usize; 2] {
        [self.part_in_dim, self.part_out_dim]
    }

    /// Shape of the rank-local bias, `[1, part_out_dim]`.
    #[must_use]
    pub fn bias_shape(&self) -> [usize; 2] {
        [1, self.part_out_dim]
    }

    /// Checks that `tensor` is a `(batch, part_in_dim)` input.
    pub fn check_input<T: Scalar>(&self, tensor: &Tensor<T>) -> Result<()> {
        check_width("layer input", tensor, self.part_in_dim)
    }

    /// Checks that `tensor` is a `(batch, part_out_dim)` output.
    pub fn check_output<T: Scalar>(&self, tensor: &Tensor<T>) -> Result<()> {
        check_width("layer output", tensor, self.part_out_dim)
    }
}

/// Rejects anything that is not a 2-D tensor of feature width `expected`.
pub(crate) fn check_width<T: Scalar>(
    site: &'static str,
    tensor: &Tensor<T>,
    expected: usize,
) -> Result<()> {
    if tensor.ndim() != 2 {
        return Err(DistributedError::configuration(format!(
            "{site}: expected a (batch, features) tensor, got shape {:?}",
            tensor.shape()
        )));
    }
    let actual = tensor.shape()[1];
    if actual != expected {
        return Err(DistributedError::LayoutMismatch {
            site,
            expected,
            actual,
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
