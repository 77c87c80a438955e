//! Notification error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for notification operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors from an SMS gateway call.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The gateway answered but did not accept the message.
    #[error("SMS dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("SMS gateway did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
}
