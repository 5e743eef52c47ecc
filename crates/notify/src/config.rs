//! Notifier configuration document.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::SetupError;

/// Delivery field holding the webhook URL secret reference.
pub const WEBHOOK_URL_FIELD: &str = "webhookUrl";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

/// Where the message template lives.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub delivery: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub template: Option<TemplateConfig>,
}

/// Named secret; `value` is the resource name handed to the secret getter.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierSpec {
    pub notification: NotificationConfig,
    #[serde(default)]
    pub secrets: Vec<SecretConfig>,
}

/// Top-level notifier config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: NotifierSpec,
}

impl NotifierConfig {
    pub fn from_yaml(source: &str) -> Result<Self, SetupError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// The `secretRef` named by a delivery field.
    pub fn secret_ref(&self, field: &str) -> Result<&str, SetupError> {
        self.spec
            .notification
            .delivery
            .get(field)
            .and_then(|value| value.get("secretRef"))
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| SetupError::MissingSecretRef {
                field: field.to_string(),
            })
    }

    /// Resource name of the secret called `name`.
    pub fn secret_resource(&self, name: &str) -> Result<&str, SetupError> {
        self.spec
            .secrets
            .iter()
            .find(|secret| secret.name == name)
            .map(|secret| secret.value.as_str())
            .ok_or_else(|| SetupError::UnknownSecret(name.to_string()))
    }
}
