//! SMS gateway seam.

use async_trait::async_trait;

use cg_models::PhoneNumber;

use crate::error::NotifyResult;

/// Something that can deliver one text message.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, to: &PhoneNumber, message: &str) -> NotifyResult<()>;
}
