//! Message composition: render, parse as blocks, colorize.

use url::Url;

use crate::bindings::Bindings;
use crate::blocks::{Attachment, MessageDocument, WebhookMessage};
use crate::error::NotifierError;
use crate::events::BuildEvent;
use crate::template::{TemplateEngine, TemplateView};

const UTM_PARAMS: [(&str, &str); 3] = [
    ("utm_campaign", "google-cloud-build-notifiers"),
    ("utm_medium", "chat"),
    ("utm_source", "google-cloud-build"),
];

/// Add chat UTM tracking parameters to a log URL, replacing any existing ones.
pub fn with_utm_params(log_url: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(log_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !UTM_PARAMS.iter().any(|(utm, _)| key == utm))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(UTM_PARAMS);
    Ok(url.into())
}

/// Compose the webhook message for one event.
///
/// All-or-nothing: any failure yields no message.
pub fn compose(
    engine: &TemplateEngine,
    event: &BuildEvent,
    bindings: &Bindings,
) -> Result<WebhookMessage, NotifierError> {
    if !event.log_url.is_empty() {
        with_utm_params(&event.log_url).map_err(|source| NotifierError::LogUrl {
            url: event.log_url.clone(),
            source,
        })?;
    }

    let view = TemplateView {
        build: event,
        params: bindings,
    };
    let rendered = engine.render(&view)?;
    let blocks = MessageDocument::from_json(&rendered).map_err(NotifierError::Document)?;

    Ok(WebhookMessage {
        text: None,
        attachments: vec![Attachment {
            color: event.status.tone().color().to_string(),
            blocks,
            fallback: None,
        }],
    })
}
