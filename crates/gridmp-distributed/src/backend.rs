//! Backend - Communication Backend Abstractions
//!
//! Provides the message-passing trait the parallel layer is written against
//! and an in-process implementation for tests and simulations.
//!
//! Every collective is synchronous and blocking: all members of a
//! communicator must enter the same collective before any of them returns.
//! Callers must therefore issue collectives in the same order on every rank
//! of a group, otherwise the group deadlocks.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{DistributedError, Result};

// =============================================================================
// Reduce Operations
// =============================================================================

/// Reduction operation for collective communication.
///
/// Gradients and partial outputs are only ever summed, never averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Sum all values.
    Sum,
}

impl ReduceOp {
    /// Applies the reduction operation to two f32 values.
    #[must_use]
    pub fn apply_f32(&self, a: f32, b: f32) -> f32 {
        match self {
            ReduceOp::Sum => a + b,
        }
    }

    /// Reduces equally sized slices element-wise, in slice order.
    #[must_use]
    pub fn reduce_slices(&self, slices: &[Vec<f32>]) -> Vec<f32> {
        let Some((first, rest)) = slices.split_first() else {
            return Vec::new();
        };

        let mut result = first.clone();
        for slice in rest {
            for (acc, &val) in result.iter_mut().zip(slice.iter()) {
                *acc = self.apply_f32(*acc, val);
            }
        }
        result
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Trait for distributed communication backends.
///
/// A backend handle represents one rank's view of one communicator.
/// `rank()` is the position inside that communicator and `members()` lists
/// the world ranks of all members in communicator order.
pub trait Backend: Send + Sync {
    /// Returns the name of the backend.
    fn name(&self) -> &str;

    /// Returns the rank of this process within the communicator.
    fn rank(&self) -> usize;

    /// Returns the number of members of the communicator.
    fn world_size(&self) -> usize;

    /// Returns the world ranks of the members, in communicator rank order.
    fn members(&self) -> &[usize];

    /// Element-wise reduction of `data` across all members; every member
    /// receives the result in place.
    fn all_reduce(&self, data: &mut [f32], op: ReduceOp) -> Result<()>;

    /// Concatenates every member's `send_data` into `recv_data` in rank
    /// order. `recv_data` must hold `world_size * send_data.len()` values.
    fn all_gather(&self, send_data: &[f32], recv_data: &mut [f32]) -> Result<()>;

    /// Reduces `send_data` element-wise across members and leaves chunk
    /// `rank` of the result in `recv_data`. `send_data` must hold
    /// `world_size * recv_data.len()` values.
    fn reduce_scatter(&self, send_data: &[f32], recv_data: &mut [f32], op: ReduceOp) -> Result<()>;

    /// Synchronizes all members.
    fn barrier(&self) -> Result<()>;

    /// Partitions the communicator by `color`. Members sharing a color form a
    /// new communicator ordered by `(key, current rank)`. This is itself a
    /// collective: every member must call it.
    fn split(&self, color: usize, key: usize) -> Result<Arc<dyn Backend>>;
}

// =============================================================================
// Rendezvous
// =============================================================================

/// State of the collective currently in flight on a communicator.
struct Round<P> {
    contributions: Vec<Option<P>>,
    arrived: usize,
    departed: usize,
    result: Option<Arc<Vec<P>>>,
    /// Set once every member has contributed; cleared when the last one leaves.
    draining: bool,
    aborted: bool,
}

/// Blocking all-to-all exchange point shared by the members of a communicator.
struct Rendezvous<P> {
    size: usize,
    round: Mutex<Round<P>>,
    turnstile: Condvar,
}

impl<P> Rendezvous<P> {
    fn new(size: usize) -> Self {
        Self {
            size,
            round: Mutex::new(Round {
                contributions: (0..size).map(|_| None).collect(),
                arrived: 0,
                departed: 0,
                result: None,
                draining: false,
                aborted: false,
            }),
            turnstile: Condvar::new(),
        }
    }

    /// Deposits `payload` for `rank` and blocks until every member has done
    /// the same. Returns all payloads in rank order.
    fn exchange(&self, operation: &'static str, rank: usize, payload: P) -> Result<Arc<Vec<P>>> {
        let mut round = self.round.lock();

        // Members that already left the previous round wait for the stragglers.
        while round.draining && !round.aborted {
            self.turnstile.wait(&mut round);
        }
        if round.aborted {
            return Err(aborted(operation));
        }

        round.contributions[rank] = Some(payload);
        round.arrived += 1;

        if round.arrived == self.size {
            let all: Vec<P> = round
                .contributions
                .iter_mut()
                .filter_map(Option::take)
                .collect();
            round.result = Some(Arc::new(all));
            round.arrived = 0;
            round.draining = true;
            self.turnstile.notify_all();
        } else {
            while !round.draining && !round.aborted {
                self.turnstile.wait(&mut round);
            }
            if !round.draining {
                return Err(aborted(operation));
            }
        }

        let result = round
            .result
            .clone()
            .ok_or_else(|| DistributedError::collective(operation, "round finished without a result"))?;

        round.departed += 1;
        if round.departed == self.size {
            round.departed = 0;
            round.result = None;
            round.draining = false;
            self.turnstile.notify_all();
        }

        Ok(result)
    }

    fn abort(&self) {
        self.round.lock().aborted = true;
        self.turnstile.notify_all();
    }
}

fn aborted(operation: &'static str) -> DistributedError {
    DistributedError::collective(operation, "communicator was aborted by a peer")
}

/// Shared state of one in-process communicator.
struct Communicator {
    data: Rendezvous<Vec<f32>>,
    colors: Rendezvous<(usize, usize)>,
    /// Sub-communicators still being handed out, keyed by (split sequence
    /// number, color), with the number of members yet to collect them.
    pending_splits: Mutex<HashMap<(u64, usize), (Arc<Communicator>, usize)>>,
}

impl Communicator {
    fn new(size: usize) -> Self {
        Self {
            data: Rendezvous::new(size),
            colors: Rendezvous::new(size),
            pending_splits: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the sub-communicator of one split color. The first member to
    /// arrive creates it; the entry is removed once all `size` members hold it.
    fn collect_split(&self, id: (u64, usize), size: usize) -> Arc<Communicator> {
        let mut pending = self.pending_splits.lock();
        let (comm, done) = {
            let (comm, remaining) = pending
                .entry(id)
                .or_insert_with(|| (Arc::new(Communicator::new(size)), size));
            *remaining -= 1;
            (Arc::clone(comm), *remaining == 0)
        };
        if done {
            pending.remove(&id);
        }
        comm
    }

    #[cfg(test)]
    fn pending_split_count(&self) -> usize {
        self.pending_splits.lock().len()
    }
}

// =============================================================================
// Mock Backend
// =============================================================================

/// An in-process backend that simulates a communicator of `world_size` ranks.
///
/// Each rank's handle must be driven from its own thread, since collectives
/// block until every member has arrived. Handles are created together by
/// [`MockBackend::create_world`] and share one rendezvous.
pub struct MockBackend {
    rank: usize,
    members: Vec<usize>,
    comm: Arc<Communicator>,
    /// Number of splits this handle has taken part in.
    splits: AtomicU64,
}

impl MockBackend {
    /// Creates one handle per rank of a fresh communicator.
    #[must_use]
    pub fn create_world(world_size: usize) -> Vec<Self> {
        let comm = Arc::new(Communicator::new(world_size));
        let members: Vec<usize> = (0..world_size).collect();

        (0..world_size)
            .map(|rank| MockBackend {
                rank,
                members: members.clone(),
                comm: Arc::clone(&comm),
                splits: AtomicU64::new(0),
            })
            .collect()
    }

    /// Creates a single mock backend (rank 0, world size 1).
    #[must_use]
    pub fn single() -> Self {
        let comm = Arc::new(Communicator::new(1));
        MockBackend {
            rank: 0,
            members: vec![0],
            comm,
            splits: AtomicU64::new(0),
        }
    }

    /// Poisons the communicator, simulating a crashed peer. Every member
    /// blocked in a collective, and every later collective on this
    /// communicator, fails with [`DistributedError::CollectiveFailure`].
    pub fn abort(&self) {
        self.comm.data.abort();
        self.comm.colors.abort();
    }

    fn exchange(&self, operation: &'static str, payload: Vec<f32>) -> Result<Arc<Vec<Vec<f32>>>> {
        trace!(rank = self.rank, operation, len = payload.len(), "entering collective");
        let expected = payload.len();
        let parts = self.comm.data.exchange(operation, self.rank, payload)?;
        if let Some((peer, part)) = parts.iter().enumerate().find(|(_, p)| p.len() != expected) {
            return Err(DistributedError::configuration(format!(
                "{operation}: rank {} contributed {} values but rank {peer} contributed {}",
                self.rank,
                expected,
                part.len()
            )));
        }
        Ok(parts)
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.members.len()
    }

    fn members(&self) -> &[usize] {
        &self.members
    }

    fn all_reduce(&self, data: &mut [f32], op: ReduceOp) -> Result<()> {
        let parts = self.exchange("all_reduce", data.to_vec())?;
        let reduced = op.reduce_slices(&parts);
        data.copy_from_slice(&reduced);
        Ok(())
    }

    fn all_gather(&self, send_data: &[f32], recv_data: &mut [f32]) -> Result<()> {
        if recv_data.len() != send_data.len() * self.world_size() {
            return Err(DistributedError::configuration(format!(
                "all_gather: receive buffer holds {} values, expected {}",
                recv_data.len(),
                send_data.len() * self.world_size()
            )));
        }

        let parts = self.exchange("all_gather", send_data.to_vec())?;

        // Concatenate all data in rank order
        for (dst, part) in recv_data.chunks_mut(send_data.len().max(1)).zip(parts.iter()) {
            dst.copy_from_slice(part);
        }
        Ok(())
    }

    fn reduce_scatter(&self, send_data: &[f32], recv_data: &mut [f32], op: ReduceOp) -> Result<()> {
        let chunk_size = recv_data.len();
        if send_data.len() != chunk_size * self.world_size() {
            return Err(DistributedError::configuration(format!(
                "reduce_scatter: send buffer holds {} values, expected {}",
                send_data.len(),
                chunk_size * self.world_size()
            )));
        }

        let parts = self.exchange("reduce_scatter", send_data.to_vec())?;
        let reduced = op.reduce_slices(&parts);

        let start = self.rank * chunk_size;
        recv_data.copy_from_slice(&reduced[start..start + chunk_size]);
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.exchange("barrier", Vec::new()).map(|_| ())
    }

    fn split(&self, color: usize, key: usize) -> Result<Arc<dyn Backend>> {
        let entries = self.comm.colors.exchange("split", self.rank, (color, key))?;
        let seq = self.splits.fetch_add(1, Ordering::Relaxed);

        let mut group: Vec<(usize, usize)> = entries
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == color)
            .map(|(rank, &(_, k))| (k, rank))
            .collect();
        group.sort_unstable();

        let new_rank = group
            .iter()
            .position(|&(_, rank)| rank == self.rank)
            .ok_or_else(|| DistributedError::collective("split", "rank missing from its own color"))?;

        let comm = self.comm.collect_split((seq, color), group.len());

        trace!(rank = self.rank, color, key, new_rank, size = group.len(), "split communicator");

        Ok(Arc::new(MockBackend {
            rank: new_rank,
            members: group.iter().map(|&(_, rank)| self.members[rank]).collect(),
            comm,
            splits: AtomicU64::new(0),
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Runs `f` on one thread per rank and returns the results in rank order.
    fn run<T: Send>(backends: Vec<MockBackend>, f: impl Fn(&MockBackend) -> T + Sync) -> Vec<T> {
        thread::scope(|s| {
            let handles: Vec<_> = backends.iter().map(|b| s.spawn(|| f(b))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_reduce_op_apply() {
        assert_eq!(ReduceOp::Sum.apply_f32(1.0, 2.0), 3.0);
        assert_eq!(ReduceOp::Sum.apply_f32(-1.5, 0.5), -1.0);
    }

    #[test]
    fn test_reduce_slices_sum() {
        let slices = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        assert_eq!(ReduceOp::Sum.reduce_slices(&slices), vec![9.0, 12.0]);
    }

    #[test]
    fn test_reduce_slices_empty() {
        assert!(ReduceOp::Sum.reduce_slices(&[]).is_empty());
    }

    #[test]
    fn test_mock_backend_single() {
        let backend = MockBackend::single();
        assert_eq!(backend.rank(), 0);
        assert_eq!(backend.world_size(), 1);
        assert_eq!(backend.members(), &[0]);
        assert_eq!(backend.name(), "mock");
    }

    #[test]
    fn test_single_all_reduce_is_identity() {
        let backend = MockBackend::single();
        let mut data = vec![1.0, 2.0];
        backend.all_reduce(&mut data, ReduceOp::Sum).unwrap();
        assert_eq!(data, vec![1.0, 2.0]);
    }

    #[test]
    fn test_all_reduce_sum_across_threads() {
        let results = run(MockBackend::create_world(4), |b| {
            let mut data = vec![(b.rank() + 1) as f32; 3];
            b.all_reduce(&mut data, ReduceOp::Sum).unwrap();
            data
        });
        for data in results {
            assert_eq!(data, vec![10.0, 10.0, 10.0]);
        }
    }

    #[test]
    fn test_repeated_collectives_keep_rounds_separate() {
        let results = run(MockBackend::create_world(3), |b| {
            (0..20)
                .map(|step| {
                    let mut data = vec![(b.rank() * step) as f32];
                    b.all_reduce(&mut data, ReduceOp::Sum).unwrap();
                    data[0]
                })
                .collect::<Vec<_>>()
        });
        // Ranks 0, 1 and 2 contribute 0, step and 2 * step.
        let expected: Vec<f32> = (0..20).map(|step| (3 * step) as f32).collect();
        for r in results {
            assert_eq!(r, expected);
        }
    }

    #[test]
    fn test_all_gather_rank_order() {
        let results = run(MockBackend::create_world(3), |b| {
            let send = vec![b.rank() as f32, 10.0 + b.rank() as f32];
            let mut recv = vec![0.0; 6];
            b.all_gather(&send, &mut recv).unwrap();
            recv
        });
        for recv in results {
            assert_eq!(recv, vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);
        }
    }

    #[test]
    fn test_reduce_scatter_chunks() {
        let results = run(MockBackend::create_world(2), |b| {
            let send: Vec<f32> = (0..4).map(|i| (i + 10 * b.rank()) as f32).collect();
            let mut recv = vec![0.0; 2];
            b.reduce_scatter(&send, &mut recv, ReduceOp::Sum).unwrap();
            recv
        });
        // sum = [10, 12, 14, 16]
        assert_eq!(results[0], vec![10.0, 12.0]);
        assert_eq!(results[1], vec![14.0, 16.0]);
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let results = run(MockBackend::create_world(2), |b| {
            let mut data = vec![1.0; b.rank() + 1];
            b.all_reduce(&mut data, ReduceOp::Sum)
        });
        for r in results {
            assert!(r.unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_bad_receive_buffer() {
        let backend = MockBackend::single();
        let mut recv = vec![0.0; 3];
        assert!(backend.all_gather(&[1.0, 2.0], &mut recv).is_err());
    }

    #[test]
    fn test_split_orders_by_key() {
        let results = run(MockBackend::create_world(4), |b| {
            // Two colors, reversed key order.
            let sub = b.split(b.rank() % 2, 10 - b.rank()).unwrap();
            (sub.rank(), sub.world_size(), sub.members().to_vec())
        });
        assert_eq!(results[0], (1, 2, vec![2, 0]));
        assert_eq!(results[1], (1, 2, vec![3, 1]));
        assert_eq!(results[2], (0, 2, vec![2, 0]));
        assert_eq!(results[3], (0, 2, vec![3, 1]));
    }

    #[test]
    fn test_split_groups_communicate_independently() {
        let results = run(MockBackend::create_world(4), |b| {
            let sub = b.split(b.rank() / 2, b.rank()).unwrap();
            let mut data = vec![b.rank() as f32];
            sub.all_reduce(&mut data, ReduceOp::Sum).unwrap();
            data[0]
        });
        assert_eq!(results, vec![1.0, 1.0, 5.0, 5.0]);
    }

    #[test]
    fn test_split_entries_released_after_collection() {
        let backends = MockBackend::create_world(4);
        let sizes: Vec<(usize, usize)> = thread::scope(|s| {
            let handles: Vec<_> = backends
                .iter()
                .map(|b| {
                    s.spawn(move || {
                        let by_half = b.split(b.rank() / 2, b.rank()).unwrap();
                        let by_parity = b.split(b.rank() % 2, b.rank()).unwrap();
                        (by_half.world_size(), by_parity.world_size())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sizes, vec![(2, 2); 4]);
        assert_eq!(backends[0].comm.pending_split_count(), 0);
    }

    #[test]
    fn test_abort_fails_blocked_peer() {
        let backends = MockBackend::create_world(2);
        let results = run(backends, |b| {
            if b.rank() == 0 {
                b.abort();
                return None;
            }
            let mut data = vec![1.0];
            Some(b.all_reduce(&mut data, ReduceOp::Sum))
        });
        let err = results[1].clone().unwrap().unwrap_err();
        assert!(matches!(err, DistributedError::CollectiveFailure { .. }));
    }

    #[test]
    fn test_barrier() {
        let results = run(MockBackend::create_world(3), |b| b.barrier());
        assert!(results.iter().all(Result::is_ok));
    }
}
