//! Binding resolution: named parameters exposed to templates as `Params`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::error::BoxError;
use crate::events::BuildEvent;

/// Resolved parameter values, keyed by name.
pub type Bindings = BTreeMap<String, String>;

/// Resolves template parameters for one event.
#[async_trait]
pub trait BindingResolver: Send + Sync {
    async fn resolve(&self, event: &BuildEvent) -> Result<Bindings, BoxError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("param {param:?} references unknown value $({reference})")]
pub struct UnknownReference {
    pub param: String,
    pub reference: String,
}

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([^)]*)\)").expect("valid reference regex"));

/// Resolves the `params` block of a notifier config.
///
/// Values may embed `$(build.id)`, `$(build.project_id)`, `$(build.status)`,
/// `$(build.log_url)` and `$(build.substitutions.KEY)`; everything else is literal.
#[derive(Debug, Clone, Default)]
pub struct ConfigBindings {
    params: BTreeMap<String, String>,
}

impl ConfigBindings {
    #[must_use]
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    fn lookup(event: &BuildEvent, reference: &str) -> Option<String> {
        let value = match reference.trim() {
            "build.id" => event.id.clone(),
            "build.project_id" => event.project_id.clone(),
            "build.status" => event.status.to_string(),
            "build.log_url" => event.log_url.clone(),
            other => {
                let key = other.strip_prefix("build.substitutions.")?;
                event.substitutions.get(key).cloned().unwrap_or_default()
            }
        };
        Some(value)
    }

    /// Expand every parameter against `event`.
    pub fn expand(&self, event: &BuildEvent) -> Result<Bindings, UnknownReference> {
        let mut bindings = Bindings::new();

        for (name, template) in &self.params {
            let mut missing = None;
            let value = REFERENCE.replace_all(template, |caps: &Captures<'_>| {
                Self::lookup(event, &caps[1]).unwrap_or_else(|| {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                })
            });

            if let Some(reference) = missing {
                return Err(UnknownReference {
                    param: name.clone(),
                    reference,
                });
            }
            bindings.insert(name.clone(), value.into_owned());
        }

        Ok(bindings)
    }
}

#[async_trait]
impl BindingResolver for ConfigBindings {
    async fn resolve(&self, event: &BuildEvent) -> Result<Bindings, BoxError> {
        Ok(self.expand(event)?)
    }
}
