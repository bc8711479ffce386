//! Error types for ODE integration.

use thiserror::Error;

/// Errors encountered while integrating.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Step size underflow at t={t}: h={h}")]
    StepUnderflow { t: f64, h: f64 },

    #[error("Exceeded {max_steps} steps before reaching t={t}")]
    TooManySteps { max_steps: usize, t: f64 },

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;
