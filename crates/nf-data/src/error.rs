//! Error types for data generation and sampling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error(transparent)]
    Core(#[from] nf_core::NfError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type DataResult<T> = Result<T, DataError>;
