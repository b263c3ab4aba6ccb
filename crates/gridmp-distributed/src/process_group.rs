//! `ProcessGroup` - Process Group Abstraction
//!
//! Provides a high-level, tensor-aware handle over one communicator. The MP
//! and DP groups of the rank grid are both `ProcessGroup`s obtained by
//! splitting the world group.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;
use std::thread;

use gridmp_tensor::Tensor;

use crate::backend::{Backend, MockBackend, ReduceOp};
use crate::error::{DistributedError, Result};

// =============================================================================
// ProcessGroup
// =============================================================================

/// A group of processes that can communicate with each other.
pub struct ProcessGroup {
    backend: Arc<dyn Backend>,
    ranks: Vec<usize>,
}

impl ProcessGroup {
    /// Creates a process group covering every member of `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let ranks = backend.members().to_vec();
        Self { backend, ranks }
    }

    /// Creates a mock process group for testing.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(Arc::new(MockBackend::single()))
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Returns the rank of this process within the group.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.backend.rank()
    }

    /// Returns the world rank of this process.
    #[must_use]
    pub fn global_rank(&self) -> usize {
        self.ranks[self.rank()]
    }

    /// Returns the number of processes in this group.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ranks.len()
    }

    /// Returns the world ranks in this group, in group rank order.
    #[must_use]
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// Synchronizes all processes in the group.
    pub fn barrier(&self) -> Result<()> {
        self.backend.barrier()
    }

    /// Splits the group by `color`; see [`Backend::split`].
    pub fn split(&self, color: usize, key: usize) -> Result<ProcessGroup> {
        Ok(ProcessGroup::new(self.backend.split(color, key)?))
    }

    /// Performs all-reduce on a tensor and returns the reduced copy.
    pub fn all_reduce_tensor(&self, tensor: &Tensor<f32>, op: ReduceOp) -> Result<Tensor<f32>> {
        let mut data = tensor.to_vec();
        self.backend.all_reduce(&mut data, op)?;
        Ok(Tensor::from_vec(data, tensor.shape())?)
    }

    /// Performs all-gather on tensors.
    ///
    /// Output shape is `[size, ...original_shape]`, stacked in group rank
    /// order.
    pub fn all_gather_tensor(&self, send_tensor: &Tensor<f32>) -> Result<Tensor<f32>> {
        let send_data = send_tensor.as_slice();
        let mut recv_data = vec![0.0; send_data.len() * self.size()];
        self.backend.all_gather(send_data, &mut recv_data)?;

        let mut new_shape = vec![self.size()];
        new_shape.extend(send_tensor.shape());
        Ok(Tensor::from_vec(recv_data, &new_shape)?)
    }

    /// Performs reduce-scatter on a tensor along dimension 0.
    ///
    /// Dimension 0 must be divisible by the group size; this rank receives
    /// row block `rank()` of the reduction.
    pub fn reduce_scatter_tensor(&self, send_tensor: &Tensor<f32>, op: ReduceOp) -> Result<Tensor<f32>> {
        let rows = send_tensor.size(0)?;
        if rows % self.size() != 0 {
            return Err(DistributedError::configuration(format!(
                "reduce_scatter: dimension 0 of size {rows} does not divide across {} ranks",
                self.size()
            )));
        }

        let mut recv_data = vec![0.0; send_tensor.numel() / self.size()];
        self.backend
            .reduce_scatter(send_tensor.as_slice(), &mut recv_data, op)?;

        let mut new_shape = send_tensor.shape().to_vec();
        new_shape[0] /= self.size();
        Ok(Tensor::from_vec(recv_data, &new_shape)?)
    }
}

impl Clone for ProcessGroup {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ranks: self.ranks.clone(),
        }
    }
}

impl std::fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("backend", &self.backend.name())
            .field("rank", &self.rank())
            .field("ranks", &self.ranks)
            .finish()
    }
}

// =============================================================================
// World
// =============================================================================

/// Global distributed world.
#[derive(Debug, Clone)]
pub struct World {
    default_group: ProcessGroup,
}

impl World {
    /// Initializes the distributed world.
    pub fn init(backend: Arc<dyn Backend>) -> Self {
        Self {
            default_group: ProcessGroup::new(backend),
        }
    }

    /// Creates a mock world for testing.
    #[must_use]
    pub fn mock() -> Self {
        Self {
            default_group: ProcessGroup::mock(),
        }
    }

    /// Runs `f` once per rank of an in-process world of `world_size` ranks,
    /// each on its own thread, and returns the results in rank order.
    ///
    /// A panic on any rank is resumed on the calling thread.
    pub fn run_local<T, F>(world_size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(World) -> T + Sync,
    {
        let worlds: Vec<World> = MockBackend::create_world(world_size)
            .into_iter()
            .map(|backend| World::init(Arc::new(backend)))
            .collect();

        thread::scope(|s| {
            let handles: Vec<_> = worlds
                .into_iter()
                .map(|world| {
                    let f = &f;
                    s.spawn(move || f(world))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    /// Returns the default process group.
    #[must_use]
    pub fn default_group(&self) -> &ProcessGroup {
        &self.default_group
    }

    /// Returns the rank of this process.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.default_group.rank()
    }

    /// Returns the world size.
    #[must_use]
    pub fn world_size(&self) -> usize {
        self.default_group.size()
    }
}

// =============================================================================
// Tests
// =============================================================================
