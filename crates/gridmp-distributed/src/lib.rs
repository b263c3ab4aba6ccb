//! gridmp Distributed - Hybrid Model/Data Parallel Communication
//!
//! Communication layer for training a two-layer fully-connected network on
//! an `mp_size x dp_size` grid of ranks. Model-parallel groups split layer
//! weights along a feature dimension; data-parallel groups split the batch
//! and sum gradients.
//!
//! # Features
//!
//! ## Topology
//! - **Rank grid** - `rank = dp_index * mp_size + mp_index`
//! - **Process groups** - MP and DP groups obtained by splitting the world
//!
//! ## Model Parallelism
//! - **Naive** - both layers split their outputs; activations are gathered
//! - **Megatron** - the second layer splits its input; outputs are summed
//! - **Shard planner** - per-layer `part_in_dim` / `part_out_dim`
//!
//! ## Data Parallelism
//! - **Data sharding** - contiguous per-replica row ranges
//! - **Gradient reducer** - sum all-reduce with an optional shape handshake
//!
//! ## Backends
//! - Mock backend running one thread per rank for tests and simulation
//! - Extensible `Backend` trait for real message-passing runtimes
//!
//! # Example
//!
//! ```rust
//! use gridmp_distributed::prelude::*;
//! use gridmp_tensor::Tensor;
//!
//! let outputs = World::run_local(2, |world| {
//!     let ctx = ParallelContext::init(world, 2, 1, StrategyKind::Naive).unwrap();
//!     let fc1 = ctx.build_layer(LayerPosition::First, 4, 2).unwrap();
//!     let fc2 = ctx.build_layer(LayerPosition::Second, 2, 2).unwrap();
//!
//!     // Each rank owns one output column of fc1.
//!     let h = Tensor::full(&[3, 1], ctx.mp_index() as f32);
//!     let h = fc1.collect_output(&h, ctx.mp_group()).unwrap();
//!     fc2.collect_input(&h, ctx.mp_group()).unwrap()
//! });
//! assert_eq!(outputs[0].to_vec(), vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::type_complexity)]

pub mod backend;
pub mod comm;
pub mod config;
pub mod data;
pub mod error;
pub mod grad;
pub mod grid;
pub mod layer;
pub mod plan;
pub mod process_group;
pub mod strategy;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{Backend, MockBackend, ReduceOp};
pub use comm::{all_reduce_sum, gather_tensor, reduce_scatter_sum, shard_of};
pub use config::{ConfigError, ParallelConfig};
pub use data::{split_data, DataShard};
pub use error::{DistributedError, Result};
pub use grad::{reduce_gradients, GradientReducer};
pub use grid::{resolve, LayerInfo, ParallelContext, RankGrid};
pub use layer::ShardedLayer;
pub use plan::{plan, LayerPartition, LayerPosition, SplitAxis};
pub use process_group::{ProcessGroup, World};
pub use strategy::{MegatronStrategy, ModelParallelStrategy, NaiveStrategy, StrategyKind};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for hybrid parallel training.
pub mod prelude {
    pub use crate::{
        // Communication
        all_reduce_sum,
        gather_tensor,
        reduce_scatter_sum,
        // Data
        split_data,
        // Gradients
        reduce_gradients,
        // Backend
        Backend,
        DataShard,
        DistributedError,
        GradientReducer,
        // Topology
        LayerPartition,
        LayerPosition,
        MegatronStrategy,
        MockBackend,
        ModelParallelStrategy,
        NaiveStrategy,
        ParallelConfig,
        ParallelContext,
        ProcessGroup,
        RankGrid,
        ReduceOp,
        ShardedLayer,
        StrategyKind,
        World,
    };
}
