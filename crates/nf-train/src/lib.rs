//! Neural ODE training for nodefit.
//!
//! [`Trainer`] owns the ground-truth trajectory, the batch sampler, the
//! vector field and its optimizer, and drives the
//! sample → integrate → loss → backprop → step → evaluate loop.

pub mod adjoint;
pub mod config;
pub mod error;
pub mod loss;
pub mod optim;
pub mod progress;
pub mod trainer;

pub use adjoint::{AdjointGradients, AdjointSystem, AugmentedState, adjoint_backward};
pub use config::TrainConfig;
pub use error::{TrainError, TrainResult};
pub use loss::mean_abs_error;
pub use optim::{ParamsRmsProp, RmsProp};
pub use progress::CheckpointEvent;
pub use trainer::{TrainReport, Trainer, select_device};
