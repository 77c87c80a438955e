//! Model validation errors.

use thiserror::Error;

/// Result type for model construction and parsing.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when input cannot be turned into a valid model value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid account identifier: {0}")]
    InvalidAccount(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid camera source: {0}")]
    InvalidCameraSource(String),

    #[error("Unknown detection mode: {0}")]
    InvalidMode(String),

    #[error("Invalid guard status: {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Validation(String),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
