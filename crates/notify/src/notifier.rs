//! Slack notifier: the setup / notify lifecycle the host drives.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bindings::BindingResolver;
use crate::blocks::WebhookMessage;
use crate::channels::slack::SlackWebhook;
use crate::channels::Delivery;
use crate::compose::compose;
use crate::config::{NotifierConfig, WEBHOOK_URL_FIELD};
use crate::error::{NotifierError, SetupError};
use crate::events::BuildEvent;
use crate::filter::{EventFilter, FilterExpr};
use crate::secrets::SecretGetter;
use crate::template::TemplateEngine;

/// Result of a notification attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The filter rejected the event; nothing was sent
    Suppressed,
    /// The message was posted
    Delivered,
}

/// Notifier bound to one config and template.
///
/// Everything here is fixed at setup, so a single instance can serve
/// concurrent `notify` calls.
pub struct SlackNotifier {
    filter: Box<dyn EventFilter>,
    engine: TemplateEngine,
    resolver: Arc<dyn BindingResolver>,
    delivery: Box<dyn Delivery>,
}

impl SlackNotifier {
    /// Build the filter, fetch the webhook URL and compile the template.
    pub async fn setup(
        config: &NotifierConfig,
        template: &str,
        secrets: &dyn SecretGetter,
        resolver: Arc<dyn BindingResolver>,
    ) -> Result<Self, SetupError> {
        let filter = FilterExpr::parse(&config.spec.notification.filter)?;

        let secret_ref = config.secret_ref(WEBHOOK_URL_FIELD)?;
        let resource = config.secret_resource(secret_ref)?;
        let webhook_url =
            secrets
                .get_secret(resource)
                .await
                .map_err(|source| SetupError::Secret {
                    resource: resource.to_string(),
                    source,
                })?;

        let engine = TemplateEngine::parse(template)?;

        info!(
            notifier = %config.metadata.name,
            secret = resource,
            "Slack notifier initialized"
        );

        Ok(Self::from_parts(
            Box::new(filter),
            engine,
            resolver,
            Box::new(SlackWebhook::new(webhook_url)),
        ))
    }

    /// Assemble a notifier from already-built parts.
    #[must_use]
    pub fn from_parts(
        filter: Box<dyn EventFilter>,
        engine: TemplateEngine,
        resolver: Arc<dyn BindingResolver>,
        delivery: Box<dyn Delivery>,
    ) -> Self {
        Self {
            filter,
            engine,
            resolver,
            delivery,
        }
    }

    /// Filter, resolve and compose without delivering.
    ///
    /// Returns `None` when the filter rejects the event.
    pub async fn prepare(
        &self,
        event: &BuildEvent,
    ) -> Result<Option<WebhookMessage>, NotifierError> {
        if !self.filter.apply(event) {
            debug!(build_id = %event.id, status = %event.status, "Event filtered out, skipping");
            return Ok(None);
        }

        let bindings = self
            .resolver
            .resolve(event)
            .await
            .map_err(NotifierError::Resolve)?;

        compose(&self.engine, event, &bindings).map(Some)
    }

    /// Run the full pipeline for one event and deliver the result.
    pub async fn notify(&self, event: &BuildEvent) -> Result<Outcome, NotifierError> {
        let Some(message) = self.prepare(event).await? else {
            return Ok(Outcome::Suppressed);
        };

        info!(
            build_id = %event.id,
            status = %event.status,
            channel = self.delivery.name(),
            "Sending webhook for build"
        );

        self.delivery.deliver(&message).await?;
        Ok(Outcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{Bindings, ConfigBindings};
    use crate::error::{BoxError, DeliveryError, Stage};
    use crate::events::BuildStatus;
    use crate::secrets::StaticSecrets;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const TEMPLATE: &str = r#"[{"type": "section", "text": {"type": "mrkdwn", "text": "{{Build.id}} {{Params.env}}"}}]"#;

    #[derive(Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<WebhookMessage>>>,
    }

    #[async_trait]
    impl Delivery for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl BindingResolver for FailingResolver {
        async fn resolve(&self, _: &BuildEvent) -> Result<Bindings, BoxError> {
            Err("params service unavailable".into())
        }
    }

    fn notifier(
        filter: &str,
        resolver: Arc<dyn BindingResolver>,
    ) -> (SlackNotifier, Arc<Mutex<Vec<WebhookMessage>>>) {
        let recorder = Recorder::default();
        let sent = Arc::clone(&recorder.sent);
        let notifier = SlackNotifier::from_parts(
            Box::new(FilterExpr::parse(filter).unwrap()),
            TemplateEngine::parse(TEMPLATE).unwrap(),
            resolver,
            Box::new(recorder),
        );
        (notifier, sent)
    }

    fn event(status: BuildStatus) -> BuildEvent {
        BuildEvent {
            id: "177e4613".to_string(),
            status,
            ..BuildEvent::default()
        }
    }

    fn env_bindings() -> Arc<dyn BindingResolver> {
        Arc::new(ConfigBindings::new(
            [("env".to_string(), "staging".to_string())].into(),
        ))
    }

    #[tokio::test]
    async fn test_filtered_event_sends_nothing() {
        let (notifier, sent) =
            notifier("build.status == Build.Status.SUCCESS", Arc::new(FailingResolver));

        let outcome = notifier.notify(&event(BuildStatus::Working)).await.unwrap();
        assert_eq!(outcome, Outcome::Suppressed);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivers_composed_message() {
        let (notifier, sent) = notifier("", env_bindings());

        let outcome = notifier.notify(&event(BuildStatus::Failure)).await.unwrap();
        assert_eq!(outcome, Outcome::Delivered);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachments[0].color, "#bb2124");
        assert_eq!(sent[0].attachments[0].blocks.texts(), vec!["177e4613 staging"]);
    }

    #[tokio::test]
    async fn test_resolver_error_is_propagated() {
        let (notifier, sent) = notifier("", Arc::new(FailingResolver));

        let err = notifier.notify(&event(BuildStatus::Success)).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Resolve);
        assert_eq!(
            err.to_string(),
            "failed to resolve bindings: params service unavailable"
        );
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_setup_errors() {
        let resolver = env_bindings();
        let secrets = StaticSecrets::new();

        let config = NotifierConfig::from_yaml(
            "spec:\n  notification:\n    filter: build.status ==\n",
        )
        .unwrap();
        let err = SlackNotifier::setup(&config, TEMPLATE, &secrets, Arc::clone(&resolver))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Filter(_)));

        let config = NotifierConfig::from_yaml(
            "spec:\n  notification:\n    delivery:\n      webhookUrl:\n        secretRef: hook\n  secrets:\n  - name: hook\n    value: projects/p/secrets/hook\n",
        )
        .unwrap();
        let err = SlackNotifier::setup(&config, TEMPLATE, &secrets, Arc::clone(&resolver))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Secret { ref resource, .. } if resource == "projects/p/secrets/hook"));

        let secrets = StaticSecrets::new().with_secret("projects/p/secrets/hook", "https://hooks.example.com/x");
        let err = SlackNotifier::setup(&config, "{{#if Build.id}}x{{/each}}", &secrets, Arc::clone(&resolver))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::TemplateParse(_)));

        assert!(SlackNotifier::setup(&config, TEMPLATE, &secrets, resolver)
            .await
            .is_ok());
    }
}
