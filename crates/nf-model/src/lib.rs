//! Learnable vector field for nodefit.

pub mod error;
pub mod field;

pub use error::{ModelError, ModelResult};
pub use field::{NetworkSize, VectorField};

/// Parameter dtype used throughout training.
pub const DTYPE: candle_core::DType = candle_core::DType::F32;
