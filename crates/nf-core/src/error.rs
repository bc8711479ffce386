use thiserror::Error;

pub type NfResult<T> = Result<T, NfError>;

#[derive(Error, Debug)]
pub enum NfError {
    #[error("Invalid configuration: {what}")]
    InvalidConfiguration { what: String },

    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },
}

impl NfError {
    pub fn config(what: impl Into<String>) -> Self {
        NfError::InvalidConfiguration { what: what.into() }
    }
}
