//! Error types for the training layer.

use std::path::PathBuf;

/// Training error wrapping the errors of every crate below it.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] nf_core::NfError),

    #[error("Solver error: {0}")]
    Solver(#[from] nf_solver::SolverError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Model error: {0}")]
    Model(#[from] nf_model::ModelError),

    #[error("Failed to read config file: {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Results error: {0}")]
    Results(#[from] nf_results::ResultsError),

    #[error("Render error: {0}")]
    Render(#[from] nf_viz::VizError),
}

pub type TrainResult<T> = Result<T, TrainError>;

impl From<nf_data::DataError> for TrainError {
    fn from(err: nf_data::DataError) -> Self {
        match err {
            nf_data::DataError::Core(e) => TrainError::Config(e),
            nf_data::DataError::Tensor(e) => TrainError::Tensor(e),
        }
    }
}
