//! Deployment target extraction and production classification.

use serde::{Deserialize, Serialize};

use crate::events::{substitution_value, Substitutions};

const PROJECT_KEYS: &[&str] = &["_CLUSTER_PROJECT", "PROJECT_ID"];
const CLUSTER_KEYS: &[&str] = &["_CLUSTER", "CLUSTER"];
const NAMESPACE_KEYS: &[&str] = &["_NAMESPACE", "NAMESPACE"];

/// Namespaces that mean production without spelling it out.
const PRODUCTION_NAMESPACES: &[&str] = &["p", "prd"];

/// Where a build deploys to, as far as its substitutions say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl DeploymentInfo {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.project.is_none() && self.cluster.is_none() && self.namespace.is_none()
    }
}

/// First non-empty value among `keys`, in order.
fn first_present(substitutions: &Substitutions, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| substitution_value(substitutions, key))
        .map(str::to_string)
}

/// Collect project, cluster and namespace from the build substitutions.
#[must_use]
pub fn deployment_info(substitutions: &Substitutions) -> DeploymentInfo {
    DeploymentInfo {
        project: first_present(substitutions, PROJECT_KEYS),
        cluster: first_present(substitutions, CLUSTER_KEYS),
        namespace: first_present(substitutions, NAMESPACE_KEYS),
    }
}

/// Whether the target looks like production.
///
/// Deliberately loose: it drives a warning banner, so a false positive costs a
/// stray warning while a false negative hides one. Matches "prod" anywhere in the
/// cluster or namespace (any case), or a namespace of exactly `p` / `prd`.
#[must_use]
pub fn is_production(info: &DeploymentInfo) -> bool {
    let cluster = info.cluster.as_deref().unwrap_or_default().to_lowercase();
    let namespace = info.namespace.as_deref().unwrap_or_default().to_lowercase();

    cluster.contains("prod")
        || namespace.contains("prod")
        || PRODUCTION_NAMESPACES.contains(&namespace.as_str())
}
