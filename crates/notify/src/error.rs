//! Error types for the build notifier.

use std::fmt;

use thiserror::Error;

use crate::filter::FilterError;

/// Error type returned by host-supplied collaborators (secrets, bindings).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that keep the notifier from activating.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Notifier config could not be parsed
    #[error("failed to parse notifier config: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Filter expression did not compile
    #[error("failed to build event filter: {0}")]
    Filter(#[from] FilterError),

    /// Delivery block has no secret reference for the field
    #[error("delivery config has no secret reference for field {field:?}")]
    MissingSecretRef { field: String },

    /// Secret reference does not name a configured secret
    #[error("no secret named {0:?} in config secrets")]
    UnknownSecret(String),

    /// Secret lookup failed
    #[error("failed to get secret {resource:?}: {source}")]
    Secret {
        resource: String,
        #[source]
        source: BoxError,
    },

    /// Template text is not a valid template
    #[error("failed to parse message template: {0}")]
    TemplateParse(#[from] Box<handlebars::TemplateError>),

    /// Template calls a helper that is not registered
    #[error("message template calls unregistered helper {0:?}")]
    UnknownHelper(String),
}

/// Errors returned when delivering a composed message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Webhook answered with a non-success status
    #[error("webhook returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Pipeline stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Resolve,
    Render,
    DocumentParse,
    Delivery,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Resolve => "resolve",
            Self::Render => "render",
            Self::DocumentParse => "document-parse",
            Self::Delivery => "delivery",
        })
    }
}

/// A failed notification attempt.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Binding resolver failed
    #[error("failed to resolve bindings: {0}")]
    Resolve(#[source] BoxError),

    /// Template execution failed for this event
    #[error("failed to render message template: {0}")]
    Render(#[from] Box<handlebars::RenderError>),

    /// Build log URL is not a valid URL
    #[error("invalid build log URL {url:?}: {source}")]
    LogUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Rendered template is not a valid block array
    #[error("rendered template is not a valid block document: {0}")]
    Document(#[source] serde_json::Error),

    /// Webhook delivery failed
    #[error("failed to deliver message: {0}")]
    Delivery(#[from] DeliveryError),
}

impl NotifierError {
    /// Which stage of the pipeline failed.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Setup(_) => Stage::Setup,
            Self::Resolve(_) => Stage::Resolve,
            Self::Render(_) | Self::LogUrl { .. } => Stage::Render,
            Self::Document(_) => Stage::DocumentParse,
            Self::Delivery(_) => Stage::Delivery,
        }
    }
}

impl From<handlebars::RenderError> for NotifierError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Render(Box::new(err))
    }
}

impl From<handlebars::TemplateError> for SetupError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::TemplateParse(Box::new(err))
    }
}
