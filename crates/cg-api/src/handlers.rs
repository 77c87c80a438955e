//! Request handlers.

pub mod analysis;
pub mod auth;
pub mod cameras;
pub mod feed;
pub mod gates;
pub mod guards;
pub mod health;

pub use analysis::*;
pub use auth::*;
pub use cameras::*;
pub use feed::*;
pub use gates::*;
pub use guards::*;
pub use health::*;

use serde::Serialize;

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
