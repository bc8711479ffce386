//! Ground-truth trajectories and minibatch sampling for nodefit.
//!
//! Provides:
//! - Closed-form 3D curves (`Equation`)
//! - Evenly sampled trajectories held both on the host and as device tensors
//! - Random and full-pass window samplers producing `(y0, t, y)` batches

pub mod equation;
pub mod error;
pub mod sampler;
pub mod trajectory;

pub use equation::Equation;
pub use error::{DataError, DataResult};
pub use sampler::{Batch, BatchSampler};
pub use trajectory::{Trajectory, TrajectorySpec};

/// Dimension of every trajectory state.
pub const STATE_DIM: usize = 3;
