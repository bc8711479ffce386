//! Differentiable ODE integration for nodefit.
//!
//! Provides:
//! - `OdeSystem` trait for pluggable right-hand sides and state algebra
//! - Fixed-step Euler and RK4 steppers
//! - Adaptive Dormand-Prince 5(4) with error control
//! - Fourth-order Adams-Bashforth-Moulton predictor-corrector
//! - `odeint`: integrate to a grid of output times (either direction)
//!
//! States are generic. With candle tensors every accepted stage stays on the
//! autograd graph, so a loss on the outputs backpropagates into whatever
//! parameters the right-hand side closes over.

pub mod adams;
pub mod dopri5;
pub mod error;
pub mod integrator;
pub mod odeint;
pub mod system;

pub use adams::Adams;
pub use dopri5::Dopri5;
pub use error::{SolverError, SolverResult};
pub use integrator::{Euler, FixedGrid, Rk4, Stepper};
pub use odeint::{Method, SolverOptions, odeint};
pub use system::{OdeSystem, TensorSystem, weighted_sq_sum};
