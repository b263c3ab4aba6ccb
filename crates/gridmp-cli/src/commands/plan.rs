//! Plan - Per-Rank Partition Table
//!
//! Prints, for every rank of the grid, its coordinates, both groups, the
//! local weight shapes of the two layers and its slice of the data set.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use colored::Colorize;
use gridmp_distributed::{
    DataShard, LayerPartition, LayerPosition, ParallelConfig, RankGrid, SplitAxis,
};
use serde::Serialize;

use super::utils::{format_shape, print_header, print_kv, resolve_config};
use crate::cli::PlanArgs;
use crate::error::{CliError, CliResult};

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `plan` command
pub fn execute(args: PlanArgs) -> CliResult<()> {
    let config = resolve_config(&args.grid)?;
    let plan = build_plan(&config, &args)?;

    match args.format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        "text" => output_text(&plan),
        other => {
            return Err(CliError::InvalidArgument(format!(
                "unknown format '{other}' (expected 'text' or 'json')"
            )))
        }
    }
    Ok(())
}

// =============================================================================
// Plan Model
// =============================================================================

#[derive(Debug, Serialize)]
struct GridPlan {
    mp_size: usize,
    dp_size: usize,
    strategy: String,
    samples: usize,
    dropped_samples: usize,
    fc1_split: String,
    fc2_split: String,
    ranks: Vec<RankPlan>,
}

#[derive(Debug, Serialize)]
struct RankPlan {
    rank: usize,
    mp_index: usize,
    dp_index: usize,
    mp_group: Vec<usize>,
    dp_group: Vec<usize>,
    fc1_weight: [usize; 2],
    fc2_weight: [usize; 2],
    data_rows: [usize; 2],
}

fn axis_name(axis: SplitAxis) -> String {
    match axis {
        SplitAxis::Input => "input".to_string(),
        SplitAxis::Output => "output".to_string(),
    }
}

fn build_plan(config: &ParallelConfig, args: &PlanArgs) -> CliResult<GridPlan> {
    let grid = RankGrid::new(config.mp_size, config.dp_size)?;
    let fc1 = LayerPartition::new(
        LayerPosition::First,
        config.strategy,
        args.grid.in_dim,
        args.grid.hidden,
        config.mp_size,
    )?;
    let fc2 = LayerPartition::new(
        LayerPosition::Second,
        config.strategy,
        args.grid.hidden,
        args.grid.out_dim,
        config.mp_size,
    )?;

    let mut ranks = Vec::with_capacity(grid.world_size());
    let mut dropped_samples = 0;
    for rank in 0..grid.world_size() {
        let shard = DataShard::for_rank(args.samples, config.mp_size, config.dp_size, rank)?;
        dropped_samples = shard.dropped;
        ranks.push(RankPlan {
            rank,
            mp_index: grid.mp_index(rank),
            dp_index: grid.dp_index(rank),
            mp_group: grid.mp_peers(rank),
            dp_group: grid.dp_peers(rank),
            fc1_weight: fc1.weight_shape(),
            fc2_weight: fc2.weight_shape(),
            data_rows: [shard.rows.start, shard.rows.end],
        });
    }

    Ok(GridPlan {
        mp_size: config.mp_size,
        dp_size: config.dp_size,
        strategy: config.strategy.to_string(),
        samples: args.samples,
        dropped_samples,
        fc1_split: axis_name(fc1.split_axis()),
        fc2_split: axis_name(fc2.split_axis()),
        ranks,
    })
}

// =============================================================================
// Output
// =============================================================================

fn output_text(plan: &GridPlan) {
    print_header("Grid Plan");
    print_kv("Grid", &format!("{} (mp) x {} (dp)", plan.mp_size, plan.dp_size));
    print_kv("Strategy", &plan.strategy);
    print_kv("fc1 split", &plan.fc1_split);
    print_kv("fc2 split", &plan.fc2_split);
    print_kv(
        "Samples",
        &format!("{} ({} dropped)", plan.samples, plan.dropped_samples),
    );

    println!();
    println!(
        "  {:<6} {:<10} {:<14} {:<14} {:<12} {:<12} {}",
        "rank".bold(),
        "(mp, dp)".bold(),
        "mp group".bold(),
        "dp group".bold(),
        "fc1 weight".bold(),
        "fc2 weight".bold(),
        "rows".bold()
    );
    for r in &plan.ranks {
        println!(
            "  {:<6} {:<10} {:<14} {:<14} {:<12} {:<12} {}..{}",
            r.rank,
            format!("({}, {})", r.mp_index, r.dp_index),
            format!("{:?}", r.mp_group),
            format!("{:?}", r.dp_group),
            format_shape(&r.fc1_weight),
            format_shape(&r.fc2_weight),
            r.data_rows[0],
            r.data_rows[1]
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
