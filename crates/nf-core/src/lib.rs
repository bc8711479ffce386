//! nf-core: stable foundation for nodefit.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - meter (exponential running averages for per-iteration metrics)
//! - error (shared error types)

pub mod error;
pub mod meter;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{NfError, NfResult};
pub use meter::RunningAverageMeter;
pub use numeric::*;
