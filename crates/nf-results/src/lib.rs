//! nf-results: persisted training runs.
//!
//! A run is a manifest (config, equation, method, final loss), the
//! checkpoint history as JSON lines, and the trained weights.

pub mod hash;
pub mod store;
pub mod types;

pub use hash::compute_run_id;
pub use store::RunStore;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed run file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No stored run with id {run_id}")]
    RunNotFound { run_id: String },
}
