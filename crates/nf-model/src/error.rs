use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Parameter store lock poisoned")]
    Poisoned,
}

pub type ModelResult<T> = Result<T, ModelError>;
