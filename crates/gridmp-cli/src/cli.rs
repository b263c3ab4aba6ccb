//! CLI - Command Line Interface Definitions
//!
//! Defines the CLI structure using clap derive macros.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gridmp_distributed::StrategyKind;

// =============================================================================
// Main CLI Structure
// =============================================================================

/// gridmp - hybrid model/data parallel layout tool
#[derive(Parser, Debug)]
#[command(
    name = "gridmp",
    author = "AutomataNexus Development Team",
    version,
    about = "Plan and simulate hybrid model-parallel + data-parallel training grids",
    long_about = "gridmp lays a two-layer fully-connected network out on an mp_size x dp_size grid of ranks.\n\n\
                  Use `plan` to print the per-rank partition and `simulate` to run one training step on \
                  in-process ranks and check it against single-process math."
)]
pub struct Cli {
    /// Enable verbose output (debug-level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the per-rank partition of the grid
    Plan(PlanArgs),

    /// Run one hybrid training step on in-process ranks
    Simulate(SimulateArgs),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// Grid layout; flags override the config file and `GRIDMP_*` variables.
#[derive(Args, Debug, Clone)]
pub struct GridArgs {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model-parallel group size
    #[arg(long)]
    pub mp: Option<usize>,

    /// Data-parallel group size
    #[arg(long)]
    pub dp: Option<usize>,

    /// Model-parallel strategy (naive, megatron)
    #[arg(short, long)]
    pub strategy: Option<StrategyKind>,

    /// Input features of the first layer
    #[arg(long, default_value = "8")]
    pub in_dim: usize,

    /// Hidden features between the two layers
    #[arg(long, default_value = "8")]
    pub hidden: usize,

    /// Output features of the second layer
    #[arg(long, default_value = "4")]
    pub out_dim: usize,
}

// =============================================================================
// Plan Command
// =============================================================================

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub grid: GridArgs,

    /// Number of training samples to shard
    #[arg(long, default_value = "16")]
    pub samples: usize,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

// =============================================================================
// Simulate Command
// =============================================================================

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub grid: GridArgs,

    /// Global batch size
    #[arg(short, long, default_value = "8")]
    pub batch: usize,

    /// Random seed for inputs and parameters
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Maximum absolute difference tolerated against the reference
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f32,
}
