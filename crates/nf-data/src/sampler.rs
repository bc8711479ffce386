//! Window sampling over a trajectory.
//!
//! Every batch shares the leading time window `t[0..batch_time]`, whatever
//! index its windows start at. The learned field is autonomous, so windows
//! are compared on one relative time axis rather than their absolute times.

use candle_core::Tensor;
use nf_core::NfError;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::DataResult;
use crate::trajectory::Trajectory;

/// One training batch.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Window start indices into the trajectory.
    pub indices: Vec<usize>,
    /// Initial states, `(B, 3)`.
    pub y0: Tensor,
    /// Shared time window, `(T,)`.
    pub t: Tensor,
    /// Target states, `(T, B, 3)`.
    pub y: Tensor,
}

/// Draws windows of `batch_time` consecutive samples.
#[derive(Debug)]
pub struct BatchSampler {
    data_size: usize,
    batch_time: usize,
    batch_size: usize,
    rng: StdRng,
}

impl BatchSampler {
    pub fn new(
        data_size: usize,
        batch_time: usize,
        batch_size: usize,
        seed: Option<u64>,
    ) -> DataResult<Self> {
        if batch_time == 0 {
            return Err(NfError::config("batch_time must be positive").into());
        }
        if batch_size == 0 {
            return Err(NfError::config("batch_size must be positive").into());
        }
        if batch_time >= data_size {
            return Err(NfError::config(format!(
                "batch_time ({batch_time}) must be smaller than data_size ({data_size})"
            ))
            .into());
        }
        let windows = data_size - batch_time;
        if batch_size > windows {
            return Err(NfError::config(format!(
                "batch_size ({batch_size}) exceeds the {windows} available windows"
            ))
            .into());
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            data_size,
            batch_time,
            batch_size,
            rng,
        })
    }

    /// Number of valid window starts, `data_size - batch_time`.
    pub fn window_count(&self) -> usize {
        self.data_size - self.batch_time
    }

    pub fn batch_time(&self) -> usize {
        self.batch_time
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// `batch_size` distinct starts drawn uniformly from `[0, window_count)`.
    pub fn random_indices(&mut self) -> Vec<usize> {
        let windows = self.window_count();
        rand::seq::index::sample(&mut self.rng, windows, self.batch_size).into_vec()
    }

    /// Every valid start, in order.
    pub fn full_indices(&self) -> Vec<usize> {
        (0..self.window_count()).collect()
    }

    pub fn random_batch(&mut self, traj: &Trajectory) -> DataResult<Batch> {
        let indices = self.random_indices();
        self.batch_from_indices(traj, indices)
    }

    pub fn full_batch(&self, traj: &Trajectory) -> DataResult<Batch> {
        self.batch_from_indices(traj, self.full_indices())
    }

    pub fn batch_from_indices(&self, traj: &Trajectory, indices: Vec<usize>) -> DataResult<Batch> {
        if traj.len() != self.data_size {
            return Err(NfError::config(format!(
                "trajectory has {} points but sampler expects {}",
                traj.len(),
                self.data_size
            ))
            .into());
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.window_count()) {
            return Err(NfError::IndexOob {
                what: "window start",
                index: bad,
                len: self.window_count(),
            }
            .into());
        }

        let device = traj.device();
        let flat = traj.y().squeeze(1)?;

        let windows = (0..self.batch_time)
            .map(|k| {
                let ids: Vec<u32> = indices.iter().map(|&i| (i + k) as u32).collect();
                let ids = Tensor::from_vec(ids, indices.len(), device)?;
                flat.index_select(&ids, 0)
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let y0 = windows[0].clone();
        let y = Tensor::stack(&windows, 0)?;
        let t = traj.t().narrow(0, 0, self.batch_time)?;

        Ok(Batch { indices, y0, t, y })
    }
}
