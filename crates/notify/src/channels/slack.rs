//! Slack incoming-webhook delivery.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::blocks::WebhookMessage;
use crate::channels::Delivery;
use crate::error::DeliveryError;

/// Posts messages to a Slack incoming webhook.
pub struct SlackWebhook {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackWebhook {
    /// Create a Slack channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing HTTP client.
    #[must_use]
    pub fn with_client(webhook_url: String, client: reqwest::Client) -> Self {
        Self {
            webhook_url,
            client,
        }
    }
}

#[async_trait]
impl Delivery for SlackWebhook {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(message)?;

        debug!(channel = "slack", bytes = body.len(), "Posting webhook message");

        let response = self
            .client
            .post(&self.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(channel = "slack", "Webhook message delivered");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "slack",
                status = %status,
                body = %body,
                "Slack webhook request failed"
            );

            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Attachment, Block, DividerBlock, MessageDocument};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> WebhookMessage {
        WebhookMessage {
            text: None,
            attachments: vec![Attachment {
                color: "#22bb33".to_string(),
                blocks: MessageDocument::new(vec![Block::Divider(DividerBlock::default())]),
                fallback: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_posts_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/T000/B000"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "attachments": [{"color": "#22bb33", "blocks": [{"type": "divider"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap();
        let channel =
            SlackWebhook::with_client(format!("{}/services/T000/B000", server.uri()), client);
        channel.deliver(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let channel = SlackWebhook::new(server.uri());
        let err = channel.deliver(&message()).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Rejected { status: 404, ref body } if body == "no_service"
        ));
    }
}
