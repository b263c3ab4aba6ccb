//! Simulate - One Hybrid Training Step on In-Process Ranks
//!
//! Runs fc1 -> relu -> fc2 forward and backward on every rank of the grid,
//! one thread per rank, then compares each rank's output and reduced
//! gradients with the same step computed in a single process. The loss is
//! `sum(out * g)` for a random `g`, so `g` is the output gradient.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use colored::Colorize;
use gridmp_distributed::prelude::*;
use gridmp_distributed::{shard_of, Result as DistResult};
use gridmp_tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::utils::{print_header, print_info, print_kv, print_success, resolve_config};
use crate::cli::SimulateArgs;
use crate::error::{CliError, CliResult};

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `simulate` command
pub fn execute(args: SimulateArgs) -> CliResult<()> {
    let config = resolve_config(&args.grid)?;
    let dims = Dims {
        batch: args.batch,
        in_dim: args.grid.in_dim,
        hidden: args.grid.hidden,
        out_dim: args.grid.out_dim,
    };

    print_header("Hybrid Step Simulation");
    print_kv("Grid", &format!("{} (mp) x {} (dp)", config.mp_size, config.dp_size));
    print_kv("Strategy", &config.strategy.to_string());
    print_kv(
        "Network",
        &format!("{} -> {} -> {}", dims.in_dim, dims.hidden, dims.out_dim),
    );
    print_kv("Batch", &dims.batch.to_string());
    println!();

    let reports = simulate(&config, dims, args.seed)?;
    let worst = reports.iter().map(RankReport::max_diff).fold(0.0_f32, f32::max);

    for report in &reports {
        let line = format!(
            "  rank {:<3} out {:.2e}  dw1 {:.2e}  db1 {:.2e}  dw2 {:.2e}  db2 {:.2e}",
            report.rank, report.out, report.dw1, report.db1, report.dw2, report.db2
        );
        if report.max_diff() <= args.tolerance {
            println!("{line}");
        } else {
            println!("{}", line.red());
        }
    }
    println!();

    if worst > args.tolerance {
        return Err(CliError::Mismatch(format!(
            "max difference {worst:.3e} exceeds tolerance {:.1e}",
            args.tolerance
        )));
    }

    print_success(&format!(
        "all {} ranks match the single-process step (max difference {worst:.2e})",
        reports.len()
    ));
    print_info("gradients are summed over the data-parallel group, not averaged");
    Ok(())
}

// =============================================================================
// Simulation
// =============================================================================

/// Global sizes of the simulated network.
#[derive(Debug, Clone, Copy)]
pub struct Dims {
    /// Global batch size.
    pub batch: usize,
    /// Input features.
    pub in_dim: usize,
    /// Hidden features.
    pub hidden: usize,
    /// Output features.
    pub out_dim: usize,
}

/// Largest absolute differences to the reference, per rank.
#[derive(Debug, Clone, Copy)]
pub struct RankReport {
    /// Global rank.
    pub rank: usize,
    /// Output of the forward pass.
    pub out: f32,
    /// Reduced fc1 weight gradient.
    pub dw1: f32,
    /// Reduced fc1 bias gradient.
    pub db1: f32,
    /// Reduced fc2 weight gradient.
    pub dw2: f32,
    /// Reduced fc2 bias gradient.
    pub db2: f32,
}

impl RankReport {
    /// Largest of all differences.
    pub fn max_diff(&self) -> f32 {
        [self.out, self.dw1, self.db1, self.dw2, self.db2]
            .into_iter()
            .fold(0.0, f32::max)
    }
}

struct Params {
    w1: Tensor<f32>,
    b1: Tensor<f32>,
    w2: Tensor<f32>,
    b2: Tensor<f32>,
}

struct Step {
    out: Tensor<f32>,
    dw1: Tensor<f32>,
    db1: Tensor<f32>,
    dw2: Tensor<f32>,
    db2: Tensor<f32>,
}

fn random(rng: &mut StdRng, shape: &[usize]) -> Tensor<f32> {
    let values: Vec<f32> = (0..shape.iter().product::<usize>())
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    Tensor::from_fn(shape, |i| values[i])
}

fn add_bias(x: &Tensor<f32>, b: &Tensor<f32>) -> Tensor<f32> {
    let cols = b.numel();
    Tensor::from_fn(x.shape(), |i| x.as_slice()[i] + b.as_slice()[i % cols])
}

fn relu(x: &Tensor<f32>) -> Tensor<f32> {
    x.map(|v| v.max(0.0))
}

fn relu_grad(grad: &Tensor<f32>, pre: &Tensor<f32>) -> DistResult<Tensor<f32>> {
    Ok(grad.zip_map(pre, |g, h| if h > 0.0 { g } else { 0.0 })?)
}

/// Forward and backward of the whole network in one process.
fn reference(x: &Tensor<f32>, g: &Tensor<f32>, p: &Params) -> DistResult<Step> {
    let h = add_bias(&x.matmul(&p.w1)?, &p.b1);
    let a = relu(&h);
    let out = add_bias(&a.matmul(&p.w2)?, &p.b2);

    let da = g.matmul(&p.w2.t()?)?;
    let dh = relu_grad(&da, &h)?;
    Ok(Step {
        out,
        dw1: x.t()?.matmul(&dh)?,
        db1: dh.sum_dim(0)?,
        dw2: a.t()?.matmul(g)?,
        db2: g.sum_dim(0)?,
    })
}

/// Forward and backward on one rank, followed by the data-parallel reduction.
fn rank_step(ctx: &ParallelContext, x: &Tensor<f32>, g: &Tensor<f32>, p: &Params, dims: Dims) -> DistResult<Step> {
    let (m, mp) = (ctx.mp_index(), ctx.mp_size());
    let megatron = ctx.strategy().is_megatron();
    let fc1 = ctx.build_layer(LayerPosition::First, dims.in_dim, dims.hidden)?;
    let fc2 = ctx.build_layer(LayerPosition::Second, dims.hidden, dims.out_dim)?;
    let mp_group = ctx.mp_group();

    let w1 = shard_of(&p.w1, 1, m, mp)?;
    let b1 = shard_of(&p.b1, 1, m, mp)?;
    let (w2, b2) = if megatron {
        // The bias is added once, before the partial outputs are summed.
        let b2 = if m == 0 { p.b2.clone() } else { Tensor::zeros(p.b2.shape()) };
        (shard_of(&p.w2, 0, m, mp)?, b2)
    } else {
        (shard_of(&p.w2, 1, m, mp)?, shard_of(&p.b2, 1, m, mp)?)
    };

    // Forward.
    let x_in = fc1.collect_input(x, mp_group)?;
    let h = add_bias(&x_in.matmul(&w1)?, &b1);
    let a = fc1.collect_output(&relu(&h), mp_group)?;
    let a_in = fc2.collect_input(&a, mp_group)?;
    let out = fc2.collect_output(&add_bias(&a_in.matmul(&w2)?, &b2), mp_group)?;

    // Backward.
    let d_out = fc2.collect_output_grad(g, mp_group)?;
    let dw2 = a_in.t()?.matmul(&d_out)?;
    let db2 = d_out.sum_dim(0)?;
    let d_a = fc2.collect_grad_x(&d_out.matmul(&w2.t()?)?, mp_group)?;
    let d_h = relu_grad(&fc1.collect_output_grad(&d_a, mp_group)?, &h)?;
    let dw1 = x_in.t()?.matmul(&d_h)?;
    let db1 = d_h.sum_dim(0)?;

    let reducer = GradientReducer::new(ctx.verify_gradient_shapes());
    let (dw1, db1) = reducer.reduce(&dw1, &db1, ctx.dp_group())?;
    let (dw2, db2) = reducer.reduce(&dw2, &db2, ctx.dp_group())?;

    Ok(Step { out, dw1, db1, dw2, db2 })
}

/// Runs the step on `config.world_size()` in-process ranks and returns each
/// rank's deviation from the single-process reference.
pub fn simulate(config: &ParallelConfig, dims: Dims, seed: u64) -> CliResult<Vec<RankReport>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = random(&mut rng, &[dims.batch, dims.in_dim]);
    let labels = Tensor::<i32>::from_fn(&[dims.batch], |i| i as i32);
    let g = random(&mut rng, &[dims.batch, dims.out_dim]);
    let p = Params {
        w1: random(&mut rng, &[dims.in_dim, dims.hidden]),
        b1: random(&mut rng, &[1, dims.hidden]),
        w2: random(&mut rng, &[dims.hidden, dims.out_dim]),
        b2: random(&mut rng, &[1, dims.out_dim]),
    };

    // Dropped tail rows take no part in the distributed step.
    let covered = dims.batch / config.dp_size * config.dp_size;
    let want = reference(&x.slice_dim0(0, covered)?, &g.slice_dim0(0, covered)?, &p)?;

    info!(
        world_size = config.world_size(),
        covered,
        seed,
        "simulating hybrid step"
    );

    let results = World::run_local(config.world_size(), |world| -> DistResult<RankReport> {
        let ctx = ParallelContext::from_config(world, config)?;
        let (m, mp, rank) = (ctx.mp_index(), ctx.mp_size(), ctx.rank());

        let (xs, _ys) = split_data(&x, &labels, mp, ctx.dp_size(), rank)?;
        let shard = DataShard::for_rank(dims.batch, mp, ctx.dp_size(), rank)?;
        let gs = g.slice_dim0(shard.rows.start, shard.rows.end)?;

        let got = rank_step(&ctx, &xs, &gs, &p, dims)?;

        let dw2_axis = if ctx.strategy().is_megatron() { 0 } else { 1 };
        let db2_want = if ctx.strategy().is_megatron() {
            want.db2.clone()
        } else {
            shard_of(&want.db2, 1, m, mp)?
        };
        Ok(RankReport {
            rank,
            out: got
                .out
                .max_abs_diff(&want.out.slice_dim0(shard.rows.start, shard.rows.end)?)?,
            dw1: got.dw1.max_abs_diff(&shard_of(&want.dw1, 1, m, mp)?)?,
            db1: got.db1.max_abs_diff(&shard_of(&want.db1, 1, m, mp)?)?,
            dw2: got.dw2.max_abs_diff(&shard_of(&want.dw2, dw2_axis, m, mp)?)?,
            db2: got.db2.max_abs_diff(&db2_want)?,
        })
    });

    results
        .into_iter()
        .map(|r| r.map_err(CliError::from))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
