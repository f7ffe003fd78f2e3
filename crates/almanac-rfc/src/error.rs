use thiserror::Error;

/// Filter validation errors
#[derive(Error, Debug)]
pub enum RfcError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

pub type RfcResult<T> = std::result::Result<T, RfcError>;
