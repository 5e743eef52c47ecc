//! Build notifications for Slack.
//!
//! This crate turns a build lifecycle event into a Slack Block Kit message using
//! an operator-supplied Handlebars template, and posts it to an incoming webhook.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use build_notify::{BuildEvent, ConfigBindings, NotifierConfig, SlackNotifier, StaticSecrets};
//!
//! # async fn run(event: BuildEvent) -> Result<(), Box<dyn std::error::Error>> {
//! let config = NotifierConfig::from_yaml(&std::fs::read_to_string("notifier.yaml")?)?;
//! let template = std::fs::read_to_string("slack.json")?;
//! let secrets = StaticSecrets::with_fallback("https://hooks.slack.com/services/T000/B000/XXX");
//! let bindings = Arc::new(ConfigBindings::new(config.spec.notification.params.clone()));
//!
//! let notifier = SlackNotifier::setup(&config, &template, &secrets, bindings).await?;
//! notifier.notify(&event).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Pipeline
//!
//! For each event: filter, resolve bindings, render the template, parse the output
//! as a block array, wrap it in an attachment colored by build status, deliver.
//! Each stage fails with its own [`NotifierError`] variant; see [`NotifierError::stage`].
//!
//! # Templates
//!
//! Templates see `Build` (the event, camelCase fields) and `Params` (bindings), plus
//! these helpers:
//!
//! - `repo_label`, `ref_label`, `source_kind`, `provenance_kind` on `Build.source`
//! - `git_ref`, `deployment_info` on `Build.substitutions`; `is_production` on the latter's result
//! - `replace`, `contains`, `json`, `with_utm`

pub mod bindings;
pub mod blocks;
pub mod channels;
pub mod compose;
pub mod config;
pub mod environment;
pub mod error;
pub mod events;
pub mod extract;
pub mod filter;
pub mod notifier;
pub mod secrets;
pub mod template;

pub use bindings::{BindingResolver, Bindings, ConfigBindings};
pub use blocks::{Attachment, Block, MessageDocument, TextObject, WebhookMessage};
pub use channels::slack::SlackWebhook;
pub use channels::Delivery;
pub use compose::{compose, with_utm_params};
pub use config::NotifierConfig;
pub use environment::{deployment_info, is_production, DeploymentInfo};
pub use error::{BoxError, DeliveryError, NotifierError, SetupError, Stage};
pub use events::{
    substitution_value, BuildEvent, BuildStatus, GitSource, Provenance, RepoSource, StatusTone,
    StorageSource, Substitutions,
};
pub use extract::{git_ref_from_substitutions, ref_label, repo_label, source_kind_label};
pub use filter::{EventFilter, FilterError, FilterExpr};
pub use notifier::{Outcome, SlackNotifier};
pub use secrets::{SecretGetter, StaticSecrets};
pub use template::{TemplateEngine, TemplateView};
