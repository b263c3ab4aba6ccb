//! End-to-end tests of the hybrid parallel layer.
//! Every test runs one thread per rank on the in-process backend.

use std::sync::Arc;

use gridmp_distributed::prelude::*;
use gridmp_distributed::{plan, shard_of};
use gridmp_tensor::{cat, Tensor};

const TOL: f32 = 1e-4;

// =============================================================================
// Helpers
// =============================================================================

/// Deterministic values of mixed sign.
fn sample(shape: &[usize], seed: usize) -> Tensor<f32> {
    Tensor::from_fn(shape, |i| (((i * 7 + seed * 13) % 11) as f32 - 5.0) / 4.0)
}

fn add_bias(x: &Tensor<f32>, b: &Tensor<f32>) -> Tensor<f32> {
    let cols = x.shape()[1];
    let bias = b.as_slice();
    Tensor::from_fn(x.shape(), |i| x.as_slice()[i] + bias[i % cols])
}

fn relu(x: &Tensor<f32>) -> Tensor<f32> {
    x.map(|v| v.max(0.0))
}

fn relu_grad(grad: &Tensor<f32>, pre: &Tensor<f32>) -> Tensor<f32> {
    grad.zip_map(pre, |g, h| if h > 0.0 { g } else { 0.0 }).unwrap()
}

fn assert_close(actual: &Tensor<f32>, expected: &Tensor<f32>, what: &str) {
    assert_eq!(actual.shape(), expected.shape(), "{what}: shape");
    assert!(
        actual.allclose(expected, TOL),
        "{what}: {actual} != {expected}"
    );
}

// =============================================================================
// Reference Model
// =============================================================================

struct Params {
    w1: Tensor<f32>,
    b1: Tensor<f32>,
    w2: Tensor<f32>,
    b2: Tensor<f32>,
}

struct Reference {
    out: Tensor<f32>,
    da: Tensor<f32>,
    dw1: Tensor<f32>,
    db1: Tensor<f32>,
    dw2: Tensor<f32>,
    db2: Tensor<f32>,
}

/// Single-process forward and backward of fc1 -> relu -> fc2 under the loss
/// `sum(out * g)`, whose output gradient is `g`.
fn reference(x: &Tensor<f32>, g: &Tensor<f32>, p: &Params) -> Reference {
    let h = add_bias(&x.matmul(&p.w1).unwrap(), &p.b1);
    let a = relu(&h);
    let out = add_bias(&a.matmul(&p.w2).unwrap(), &p.b2);

    let dw2 = a.t().unwrap().matmul(g).unwrap();
    let db2 = g.sum_dim(0).unwrap();
    let da = g.matmul(&p.w2.t().unwrap()).unwrap();
    let dh = relu_grad(&da, &h);
    let dw1 = x.t().unwrap().matmul(&dh).unwrap();
    let db1 = dh.sum_dim(0).unwrap();

    Reference { out, da, dw1, db1, dw2, db2 }
}

/// Runs one training step on an `mp x dp` grid and compares every rank's
/// output, fc2 input gradient and reduced gradients with the single-process reference.
fn hybrid_step_matches_reference(mp: usize, dp: usize, strategy: StrategyKind) {
    let (batch, in_dim, hidden, out_dim) = (4, 8, 4, 4);
    let x = sample(&[batch, in_dim], 1);
    let labels = Tensor::<i32>::from_fn(&[batch], |i| i as i32);
    let g = sample(&[batch, out_dim], 2);
    let p = Params {
        w1: sample(&[in_dim, hidden], 3),
        b1: sample(&[1, hidden], 4),
        w2: sample(&[hidden, out_dim], 5),
        b2: sample(&[1, out_dim], 6),
    };
    let want = reference(&x, &g, &p);

    World::run_local(mp * dp, |world| {
        let ctx = ParallelContext::init(world, mp, dp, strategy).unwrap();
        let (m, rank) = (ctx.mp_index(), ctx.rank());
        let fc1 = ctx.build_layer(LayerPosition::First, in_dim, hidden).unwrap();
        let fc2 = ctx.build_layer(LayerPosition::Second, hidden, out_dim).unwrap();
        let mp_group = ctx.mp_group();

        // Local parameter shards.
        let w1 = shard_of(&p.w1, 1, m, mp).unwrap();
        let b1 = shard_of(&p.b1, 1, m, mp).unwrap();
        let (w2, b2) = if strategy.is_megatron() {
            let b2 = if m == 0 { p.b2.clone() } else { Tensor::zeros(&[1, out_dim]) };
            (shard_of(&p.w2, 0, m, mp).unwrap(), b2)
        } else {
            (shard_of(&p.w2, 1, m, mp).unwrap(), shard_of(&p.b2, 1, m, mp).unwrap())
        };
        assert_eq!(w1.shape(), &fc1.partition().weight_shape());
        assert_eq!(w2.shape(), &fc2.partition().weight_shape());

        let (xs, ys) = split_data(&x, &labels, mp, dp, rank).unwrap();
        let shard = DataShard::for_rank(batch, mp, dp, rank).unwrap();
        assert_eq!(ys.shape(), &[shard.len()]);
        let gs = g.slice_dim0(shard.rows.start, shard.rows.end).unwrap();

        // Forward.
        let x_in = fc1.collect_input(&xs, mp_group).unwrap();
        let h = add_bias(&x_in.matmul(&w1).unwrap(), &b1);
        let a = fc1.collect_output(&relu(&h), mp_group).unwrap();
        let a_in = fc2.collect_input(&a, mp_group).unwrap();
        let o = add_bias(&a_in.matmul(&w2).unwrap(), &b2);
        let out = fc2.collect_output(&o, mp_group).unwrap();

        let want_out = want.out.slice_dim0(shard.rows.start, shard.rows.end).unwrap();
        assert_close(&out, &want_out, "output");

        // Backward.
        let d_o = fc2.collect_output_grad(&gs, mp_group).unwrap();
        let dw2 = a_in.t().unwrap().matmul(&d_o).unwrap();
        let db2 = d_o.sum_dim(0).unwrap();
        let d_a_in = d_o.matmul(&w2.t().unwrap()).unwrap();
        let d_a = fc2.collect_grad_x(&d_a_in, mp_group).unwrap();
        let want_da = want.da.slice_dim0(shard.rows.start, shard.rows.end).unwrap();
        assert_close(&d_a, &shard_of(&want_da, 1, m, mp).unwrap(), "input gradient of fc2");

        let d_h = relu_grad(&fc1.collect_output_grad(&d_a, mp_group).unwrap(), &h);
        let dw1 = x_in.t().unwrap().matmul(&d_h).unwrap();
        let db1 = d_h.sum_dim(0).unwrap();
        let dx = d_h.matmul(&w1.t().unwrap()).unwrap();
        assert_eq!(fc1.collect_grad_x(&dx, mp_group).unwrap().shape(), &[shard.len(), in_dim]);

        // Data-parallel reduction.
        let reducer = GradientReducer::new(ctx.verify_gradient_shapes());
        let (dw1, db1) = reducer.reduce(&dw1, &db1, ctx.dp_group()).unwrap();
        let (dw2, db2) = reducer.reduce(&dw2, &db2, ctx.dp_group()).unwrap();

        assert_close(&dw1, &shard_of(&want.dw1, 1, m, mp).unwrap(), "dw1");
        assert_close(&db1, &shard_of(&want.db1, 1, m, mp).unwrap(), "db1");
        if strategy.is_megatron() {
            assert_close(&dw2, &shard_of(&want.dw2, 0, m, mp).unwrap(), "dw2");
            assert_close(&db2, &want.db2, "db2");
        } else {
            assert_close(&dw2, &shard_of(&want.dw2, 1, m, mp).unwrap(), "dw2");
            assert_close(&db2, &shard_of(&want.db2, 1, m, mp).unwrap(), "db2");
        }
    });
}

// =============================================================================
// Full Step
// =============================================================================

#[test]
fn test_naive_step_2x2_matches_single_process() {
    hybrid_step_matches_reference(2, 2, StrategyKind::Naive);
}

#[test]
fn test_megatron_step_2x2_matches_single_process() {
    hybrid_step_matches_reference(2, 2, StrategyKind::Megatron);
}

#[test]
fn test_pure_model_parallel_step() {
    hybrid_step_matches_reference(4, 1, StrategyKind::Naive);
    hybrid_step_matches_reference(4, 1, StrategyKind::Megatron);
}

#[test]
fn test_pure_data_parallel_step() {
    hybrid_step_matches_reference(1, 4, StrategyKind::Megatron);
}

// =============================================================================
// Partition Properties
// =============================================================================

#[test]
fn test_data_shards_partition_a_prefix() {
    for data_num in 0..20 {
        for dp in 1..6 {
            let chunk = data_num / dp;
            let mut covered = Vec::new();
            for d in 0..dp {
                let shard = DataShard::for_rank(data_num, 1, dp, d).unwrap();
                assert_eq!(shard.dp_index, d);
                covered.extend(shard.rows);
            }
            let prefix: Vec<usize> = (0..dp * chunk).collect();
            assert_eq!(covered, prefix, "data_num = {data_num}, dp = {dp}");
        }
    }
}

#[test]
fn test_rank_grid_round_trip() {
    for mp in 1..5 {
        for dp in 1..5 {
            let grid = RankGrid::new(mp, dp).unwrap();
            let mut seen = std::collections::HashSet::new();
            for r in 0..grid.world_size() {
                let coords = (grid.mp_index(r), grid.dp_index(r));
                assert!(seen.insert(coords));
                assert_eq!(grid.rank_at(coords.0, coords.1).unwrap(), r);
            }
        }
    }
}

#[test]
fn test_planner_table_through_partition() {
    assert_eq!(plan(true, false, 8, 4, 2).unwrap(), (8, 2));
    assert_eq!(plan(false, true, 8, 4, 2).unwrap(), (4, 4));
    assert_eq!(plan(false, false, 8, 4, 2).unwrap(), (8, 2));
}

// =============================================================================
// Collector Properties
// =============================================================================

#[test]
fn test_naive_forward_backward_duality() {
    let mp = 3;
    let full = sample(&[2, 6], 7);
    let results = World::run_local(mp, |world| {
        let pg = world.default_group();
        let block = shard_of(&full, 1, pg.rank(), mp).unwrap();
        let gathered = NaiveStrategy.collect_output(&block, pg).unwrap();
        let back = NaiveStrategy
            .collect_output_grad(&gathered, pg.rank(), mp)
            .unwrap();
        (gathered, block, back)
    });
    for (gathered, block, back) in results {
        assert_eq!(gathered, full);
        assert_eq!(back, block);
    }
}

#[test]
fn test_megatron_reduction_identical_everywhere() {
    let results = World::run_local(4, |world| {
        let partial = sample(&[3, 2], world.rank());
        MegatronStrategy
            .collect_output(&partial, world.default_group())
            .unwrap()
    });
    let expected = (1..4).fold(sample(&[3, 2], 0), |acc, r| acc.add(&sample(&[3, 2], r)).unwrap());
    for out in &results {
        assert_close(out, &expected, "megatron sum");
        assert_eq!(out, &results[0]);
    }
}

/// Rank r holds G_r[i][j] = 100 * r + 10 * i + j on a (3, 2 * mp) gradient,
/// so every element of the result identifies its source row and column.
fn reduce_scatter_places_elements(mp: usize) {
    let width = 2 * mp;
    let results = World::run_local(mp, |world| {
        let r = world.rank();
        let g = Tensor::from_fn(&[3, width], |k| (100 * r + 10 * (k / width) + k % width) as f32);
        NaiveStrategy.collect_grad_x(&g, world.default_group()).unwrap()
    });

    let rank_sum = 100 * mp * (mp - 1) / 2;
    for (rank, got) in results.iter().enumerate() {
        assert_eq!(got.shape(), &[3, 2]);
        for i in 0..3 {
            for j in 0..2 {
                let col = rank * 2 + j;
                let want = (rank_sum + mp * (10 * i + col)) as f32;
                assert_eq!(got.get(&[i, j]).unwrap(), want, "mp {mp} rank {rank} ({i}, {j})");
            }
        }
    }
}

#[test]
fn test_reduce_scatter_element_placement() {
    reduce_scatter_places_elements(2);
}

#[test]
fn test_reduce_scatter_element_placement_three_ranks() {
    reduce_scatter_places_elements(3);
}

#[test]
fn test_gradient_reduction_is_a_sum() {
    let results = World::run_local(2, |world| {
        let w = Tensor::full(&[2, 2], 1.5);
        let b = Tensor::full(&[1, 2], -1.0);
        reduce_gradients(&w, &b, world.default_group()).unwrap()
    });
    for (w, b) in results {
        assert_eq!(w.to_vec(), vec![3.0; 4]);
        assert_eq!(b.to_vec(), vec![-2.0; 2]);
    }
}

#[test]
fn test_two_rank_first_layer_scenario() {
    // mp = 2, dp = 1, in = 4, out = 2, naive: each rank owns one column.
    let results = World::run_local(2, |world| {
        let ctx = ParallelContext::init(world, 2, 1, StrategyKind::Naive).unwrap();
        let info = ctx.layer_info(LayerPosition::First, 4, 2).unwrap();
        assert_eq!(info.partition.part_out_dim(), 1);

        let column = Tensor::full(&[5, 1], (ctx.rank() + 1) as f32);
        NaiveStrategy.collect_output(&column, ctx.mp_group()).unwrap()
    });
    let local = |v: f32| Tensor::full(&[5, 1], v);
    let expected = cat(&[local(1.0), local(2.0)], 1).unwrap();
    for out in results {
        assert_eq!(out, expected);
    }
}

// =============================================================================
// Error Paths
// =============================================================================

#[test]
fn test_grid_size_mismatch() {
    let results = World::run_local(3, |world| {
        ParallelContext::init(world, 2, 2, StrategyKind::Naive).unwrap_err()
    });
    for err in results {
        assert!(err.is_configuration());
    }
}

#[test]
fn test_non_divisible_layer() {
    let results = World::run_local(2, |world| {
        let ctx = ParallelContext::init(world, 2, 1, StrategyKind::Megatron).unwrap();
        ctx.build_layer(LayerPosition::Second, 3, 4).unwrap_err()
    });
    for err in results {
        assert!(err.is_configuration());
    }
}

#[test]
fn test_unsplit_dim_remainder_fails_at_build_time() {
    // A naive second layer does not split in_dim, which must still divide.
    let results = World::run_local(2, |world| {
        let ctx = ParallelContext::init(world, 2, 1, StrategyKind::Naive).unwrap();
        let err = ctx.build_layer(LayerPosition::Second, 5, 4).unwrap_err();
        // Both ranks still agree on a collective after the failed build.
        let x = Tensor::full(&[1, 1], 1.0);
        let sum = MegatronStrategy.collect_output(&x, ctx.mp_group()).unwrap();
        (err, sum)
    });
    for (err, sum) in results {
        assert!(err.is_configuration());
        assert_eq!(sum.to_vec(), vec![2.0]);
    }
}

#[test]
fn test_layout_mismatch_is_detected_before_communication() {
    // Only rank 0 passes a bad tensor; it must fail without entering the
    // gather, so rank 1 is released by the abort below.
    let backends: Vec<Arc<MockBackend>> = MockBackend::create_world(2)
        .into_iter()
        .map(Arc::new)
        .collect();
    let results = std::thread::scope(|s| {
        let handles: Vec<_> = backends
            .iter()
            .map(|backend| {
                s.spawn(move || {
                    let pg = ProcessGroup::new(Arc::clone(backend) as Arc<dyn Backend>);
                    let layer = ShardedLayer::new(
                        LayerPartition::new(LayerPosition::Second, StrategyKind::Naive, 4, 2, 2)
                            .unwrap(),
                    );
                    let width = if pg.rank() == 0 { 3 } else { 2 };
                    let result = layer.collect_input(&Tensor::zeros(&[1, width]), &pg);
                    if result.is_err() {
                        backend.abort();
                    }
                    result
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });

    assert!(matches!(
        results[0],
        Err(DistributedError::LayoutMismatch { expected: 2, actual: 3, .. })
    ));
    assert!(matches!(
        results[1],
        Err(DistributedError::CollectiveFailure { .. })
    ));
}

#[test]
fn test_mismatched_gradient_shapes_across_replicas() {
    let results = World::run_local(2, |world| {
        let w = Tensor::zeros(if world.rank() == 0 { &[4, 1][..] } else { &[1, 4][..] });
        let b = Tensor::zeros(&[1, 1]);
        reduce_gradients(&w, &b, world.default_group()).unwrap_err()
    });
    for err in results {
        assert!(err.is_configuration());
    }
}
