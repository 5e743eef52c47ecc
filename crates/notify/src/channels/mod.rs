//! Delivery channel implementations.

pub mod slack;

use async_trait::async_trait;

use crate::blocks::WebhookMessage;
use crate::error::DeliveryError;

/// Trait for delivering a composed message (Slack webhook, test doubles, ...).
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Deliver one message.
    async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError>;
}
