//! Secret lookup.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::BoxError;

/// Fetches secret values by resource name.
#[async_trait]
pub trait SecretGetter: Send + Sync {
    async fn get_secret(&self, resource: &str) -> Result<String, BoxError>;
}

/// Secrets held in memory, optionally with a value served for any name.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
    fallback: Option<String>,
}

impl StaticSecrets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` for every resource name not set explicitly.
    #[must_use]
    pub fn with_fallback(value: impl Into<String>) -> Self {
        Self {
            values: BTreeMap::new(),
            fallback: Some(value.into()),
        }
    }

    #[must_use]
    pub fn with_secret(mut self, resource: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(resource.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretGetter for StaticSecrets {
    async fn get_secret(&self, resource: &str) -> Result<String, BoxError> {
        self.values
            .get(resource)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| format!("secret {resource:?} not found").into())
    }
}
