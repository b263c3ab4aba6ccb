//! Rank Grid - Hybrid Parallel Topology
//!
//! Arranges `mp_size * dp_size` ranks in a grid with
//! `rank = dp_index * mp_size + mp_index`. Ranks in the same row (same
//! `dp_index`) form a model-parallel group and exchange layer shards; ranks
//! in the same column (same `mp_index`) form a data-parallel group and sum
//! gradients.
//!
//! ```text
//!             mp_index 0   mp_index 1
//! dp_index 0    rank 0       rank 1     <- MP group
//! dp_index 1    rank 2       rank 3
//!                 ^
//!              DP group
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use tracing::info;

use crate::config::ParallelConfig;
use crate::error::{DistributedError, Result};
use crate::layer::ShardedLayer;
use crate::plan::{LayerPartition, LayerPosition};
use crate::process_group::{ProcessGroup, World};
use crate::strategy::StrategyKind;

// =============================================================================
// RankGrid
// =============================================================================

/// Pure coordinate math of the rank grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RankGrid {
    mp_size: usize,
    dp_size: usize,
}

impl RankGrid {
    /// Creates an `mp_size x dp_size` grid; both sizes must be positive.
    pub fn new(mp_size: usize, dp_size: usize) -> Result<Self> {
        if mp_size == 0 || dp_size == 0 {
            return Err(DistributedError::configuration(format!(
                "grid sizes must be positive, got mp_size = {mp_size}, dp_size = {dp_size}"
            )));
        }
        Ok(Self { mp_size, dp_size })
    }

    /// Returns the model-parallel group size.
    #[must_use]
    pub fn mp_size(&self) -> usize {
        self.mp_size
    }

    /// Returns the data-parallel group size.
    #[must_use]
    pub fn dp_size(&self) -> usize {
        self.dp_size
    }

    /// Total number of ranks.
    #[must_use]
    pub fn world_size(&self) -> usize {
        self.mp_size * self.dp_size
    }

    /// Position of `rank` inside its model-parallel group.
    #[must_use]
    pub fn mp_index(&self, rank: usize) -> usize {
        rank % self.mp_size
    }

    /// Position of `rank` inside its data-parallel group.
    #[must_use]
    pub fn dp_index(&self, rank: usize) -> usize {
        rank / self.mp_size
    }

    /// Inverse of (`mp_index`, `dp_index`).
    pub fn rank_at(&self, mp_index: usize, dp_index: usize) -> Result<usize> {
        if mp_index >= self.mp_size || dp_index >= self.dp_size {
            return Err(DistributedError::configuration(format!(
                "grid coordinate ({mp_index}, {dp_index}) outside {} x {} grid",
                self.mp_size, self.dp_size
            )));
        }
        Ok(dp_index * self.mp_size + mp_index)
    }

    /// Ranks sharing `rank`'s model-parallel group, ascending.
    #[must_use]
    pub fn mp_peers(&self, rank: usize) -> Vec<usize> {
        let row = self.dp_index(rank) * self.mp_size;
        (row..row + self.mp_size).collect()
    }

    /// Ranks sharing `rank`'s data-parallel group, ascending.
    #[must_use]
    pub fn dp_peers(&self, rank: usize) -> Vec<usize> {
        let col = self.mp_index(rank);
        (0..self.dp_size).map(|d| d * self.mp_size + col).collect()
    }
}

// =============================================================================
// Layer Info
// =============================================================================

/// Everything a rank needs to size one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerInfo {
    /// Position inside the model-parallel group.
    pub mp_index: usize,
    /// Position inside the data-parallel group.
    pub dp_index: usize,
    /// Partition of the layer.
    pub partition: LayerPartition,
}

// =============================================================================
// ParallelContext
// =============================================================================

/// A rank's view of the hybrid grid: its coordinates and both groups.
///
/// Built once at startup and passed to every collective call.
#[derive(Debug, Clone)]
pub struct ParallelContext {
    grid: RankGrid,
    strategy: StrategyKind,
    verify_gradient_shapes: bool,
    rank: usize,
    world: World,
    mp_group: ProcessGroup,
    dp_group: ProcessGroup,
}

impl ParallelContext {
    /// Splits `world` into model- and data-parallel groups.
    ///
    /// This is a collective over the world: every rank must call it.
    pub fn init(world: World, mp_size: usize, dp_size: usize, strategy: StrategyKind) -> Result<Self> {
        let grid = RankGrid::new(mp_size, dp_size)?;
        if grid.world_size() != world.world_size() {
            return Err(DistributedError::configuration(format!(
                "mp_size * dp_size = {mp_size} * {dp_size} does not match world size {}",
                world.world_size()
            )));
        }

        let rank = world.rank();
        let (mp_index, dp_index) = (grid.mp_index(rank), grid.dp_index(rank));
        let mp_group = world.default_group().split(dp_index, rank)?;
        let dp_group = world.default_group().split(mp_index, rank)?;

        if mp_group.ranks() != grid.mp_peers(rank) || dp_group.ranks() != grid.dp_peers(rank) {
            return Err(DistributedError::collective(
                "split",
                format!(
                    "backend produced groups {:?} / {:?} for rank {rank}",
                    mp_group.ranks(),
                    dp_group.ranks()
                ),
            ));
        }

        info!(
            rank,
            mp_index,
            dp_index,
            mp_group = ?mp_group.ranks(),
            dp_group = ?dp_group.ranks(),
            %strategy,
            "initialized hybrid parallel context"
        );

        Ok(Self {
            grid,
            strategy,
            verify_gradient_shapes: true,
            rank,
            world,
            mp_group,
            dp_group,
        })
    }

    /// Builds a context from a validated configuration.
    pub fn from_config(world: World, config: &ParallelConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| DistributedError::configuration(e.to_string()))?;
        let mut ctx = Self::init(world, config.mp_size, config.dp_size, config.strategy)?;
        ctx.verify_gradient_shapes = config.verify_gradient_shapes;
        Ok(ctx)
    }

    /// Returns the grid.
    #[must_use]
    pub fn grid(&self) -> RankGrid {
        self.grid
    }

    /// Returns the model-parallel strategy.
    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Whether gradient reductions exchange shapes first.
    #[must_use]
    pub fn verify_gradient_shapes(&self) -> bool {
        self.verify_gradient_shapes
    }

    /// Returns the global rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the model-parallel index.
    #[must_use]
    pub fn mp_index(&self) -> usize {
        self.grid.mp_index(self.rank)
    }

    /// Returns the data-parallel index.
    #[must_use]
    pub fn dp_index(&self) -> usize {
        self.grid.dp_index(self.rank)
    }

    /// Returns the model-parallel group size.
    #[must_use]
    pub fn mp_size(&self) -> usize {
        self.grid.mp_size()
    }

    /// Returns the data-parallel group size.
    #[must_use]
    pub fn dp_size(&self) -> usize {
        self.grid.dp_size()
    }

    /// Returns the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Returns the model-parallel group.
    #[must_use]
    pub fn mp_group(&self) -> &ProcessGroup {
        &self.mp_group
    }

    /// Returns the data-parallel group.
    #[must_use]
    pub fn dp_group(&self) -> &ProcessGroup {
        &self.dp_group
    }

    /// Plans a layer for this rank.
    pub fn layer_info(&self, position: LayerPosition, in_dim: usize, out_dim: usize) -> Result<LayerInfo> {
        Ok(LayerInfo {
            mp_index: self.mp_index(),
            dp_index: self.dp_index(),
            partition: LayerPartition::new(position, self.strategy, in_dim, out_dim, self.mp_size())?,
        })
    }

    /// Plans a layer and binds it to the context's strategy.
    pub fn build_layer(&self, position: LayerPosition, in_dim: usize, out_dim: usize) -> Result<ShardedLayer> {
        Ok(ShardedLayer::new(self.layer_info(position, in_dim, out_dim)?.partition))
    }
}

/// Resolves this rank's grid coordinates and groups.
///
/// Returns `(mp_index, dp_index, mp_group, dp_group)`.
pub fn resolve(
    world: &World,
    mp_size: usize,
    dp_size: usize,
) -> Result<(usize, usize, ProcessGroup, ProcessGroup)> {
    let ctx = ParallelContext::init(world.clone(), mp_size, dp_size, StrategyKind::default())?;
    Ok((ctx.mp_index(), ctx.dp_index(), ctx.mp_group, ctx.dp_group))
}

// =============================================================================
// Tests
// =============================================================================
