//! Build event types delivered by the host.

use chrono::{DateTime, Utc};
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form substitution pairs attached to a build (branch, cluster, namespace, ...).
///
/// Ordered so anything derived from it renders the same way every time.
pub type Substitutions = BTreeMap<String, String>;

/// Look up a substitution value, treating empty values as absent.
#[must_use]
pub fn substitution_value<'a>(substitutions: &'a Substitutions, key: &str) -> Option<&'a str> {
    substitutions
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// How a build status reads at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    /// The build finished successfully
    Success,
    /// The build failed, errored, or timed out
    Failure,
    /// Anything else: queued, running, cancelled, ...
    Neutral,
}

impl StatusTone {
    /// Get the attachment color for this tone.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Success => "#22bb33", // Green
            Self::Failure => "#bb2124", // Red
            Self::Neutral => "#f0ad4e", // Amber
        }
    }
}

/// Lifecycle status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[default]
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
}

impl BuildStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::StatusUnknown,
        Self::Pending,
        Self::Queued,
        Self::Working,
        Self::Success,
        Self::Failure,
        Self::InternalError,
        Self::Timeout,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Wire name of this status (`SUCCESS`, `INTERNAL_ERROR`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Look up a status by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == name)
    }

    /// Classify this status for coloring.
    #[must_use]
    pub const fn tone(&self) -> StatusTone {
        match self {
            Self::Success => StatusTone::Success,
            Self::Failure | Self::InternalError | Self::Timeout => StatusTone::Failure,
            Self::StatusUnknown
            | Self::Pending
            | Self::Queued
            | Self::Working
            | Self::Cancelled
            | Self::Expired => StatusTone::Neutral,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source hosted in a managed repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSource {
    #[serde(default)]
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_sha: String,
}

/// Source fetched from a plain git URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub revision: String,
}

/// Source uploaded as an archive to object storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSource {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub object: String,
    /// Object generation; 0 means unpinned.
    #[serde(default, with = "int64_string")]
    pub generation: i64,
}

const REPO_SOURCE: &str = "repoSource";
const GIT_SOURCE: &str = "gitSource";
const STORAGE_SOURCE: &str = "storageSource";

/// Where the build's source came from.
///
/// Serialized the way build records carry it: a single key naming the variant,
/// e.g. `{"gitSource": {"url": ..., "revision": ...}}`. Kinds this crate does not
/// model (and an empty `{}`) are kept as [`Provenance::Other`] instead of failing
/// the whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Repo(RepoSource),
    Git(GitSource),
    Storage(StorageSource),
    /// Unrecognized source kind, by key; empty when the object had no key.
    Other(String),
}

impl Provenance {
    const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            Self::Repo(repo) => map.serialize_entry(REPO_SOURCE, repo)?,
            Self::Git(git) => map.serialize_entry(GIT_SOURCE, git)?,
            Self::Storage(storage) => map.serialize_entry(STORAGE_SOURCE, storage)?,
            Self::Other(kind) if kind.is_empty() => {}
            Self::Other(kind) => map.serialize_entry(kind, &BTreeMap::<String, String>::new())?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Provenance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ProvenanceVisitor)
    }
}

struct ProvenanceVisitor;

impl<'de> Visitor<'de> for ProvenanceVisitor {
    type Value = Provenance;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a build source object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Provenance, A::Error> {
        let mut found: Option<Provenance> = None;

        while let Some(key) = map.next_key::<String>()? {
            let source = match key.as_str() {
                REPO_SOURCE => Provenance::Repo(map.next_value()?),
                GIT_SOURCE => Provenance::Git(map.next_value()?),
                STORAGE_SOURCE => Provenance::Storage(map.next_value()?),
                _ => {
                    map.next_value::<IgnoredAny>()?;
                    Provenance::Other(key)
                }
            };
            // a recognized kind wins over unknown siblings
            if !found.as_ref().is_some_and(Provenance::is_known) {
                found = Some(source);
            }
        }

        Ok(found.unwrap_or_else(|| Provenance::Other(String::new())))
    }
}

/// A build lifecycle transition, as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub status: BuildStatus,
    #[serde(default)]
    pub log_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
    #[serde(default)]
    pub substitutions: Substitutions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
}

impl BuildEvent {
    /// Look up a substitution value, treating empty values as absent.
    #[must_use]
    pub fn substitution(&self, key: &str) -> Option<&str> {
        substitution_value(&self.substitutions, key)
    }
}

/// 64-bit integers arrive as JSON strings in build records but as numbers from
/// hand-written fixtures; accept both, always write a number.
mod int64_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) if s.is_empty() => Ok(0),
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tones_cover_every_status() {
        for status in BuildStatus::ALL {
            let expected = match status {
                BuildStatus::Success => StatusTone::Success,
                BuildStatus::Failure | BuildStatus::InternalError | BuildStatus::Timeout => {
                    StatusTone::Failure
                }
                _ => StatusTone::Neutral,
            };
            assert_eq!(status.tone(), expected, "{status}");
        }
    }

    #[test]
    fn test_tone_colors() {
        assert_eq!(StatusTone::Success.color(), "#22bb33");
        assert_eq!(StatusTone::Failure.color(), "#bb2124");
        assert_eq!(StatusTone::Neutral.color(), "#f0ad4e");
    }

    #[test]
    fn test_status_names() {
        assert_eq!(BuildStatus::InternalError.to_string(), "INTERNAL_ERROR");
        assert_eq!(BuildStatus::from_name("TIMEOUT"), Some(BuildStatus::Timeout));
        assert_eq!(BuildStatus::from_name("timeout"), None);
    }

    #[test]
    fn test_deserialize_build_record() {
        let event: BuildEvent = serde_json::from_value(serde_json::json!({
            "id": "7134be45",
            "projectId": "draftboard-368620",
            "status": "WORKING",
            "source": {
                "storageSource": {
                    "bucket": "draftboard-368620_cloudbuild",
                    "object": "source/archive.tgz",
                    "generation": "1742557737797427"
                }
            },
            "substitutions": {"_NAMESPACE": "s-prod"},
            "timeout": "600s"
        }))
        .unwrap();

        assert_eq!(event.status, BuildStatus::Working);
        assert_eq!(
            event.source,
            Some(Provenance::Storage(StorageSource {
                bucket: "draftboard-368620_cloudbuild".to_string(),
                object: "source/archive.tgz".to_string(),
                generation: 1_742_557_737_797_427,
            }))
        );
        assert_eq!(event.substitution("_NAMESPACE"), Some("s-prod"));
        assert_eq!(event.substitution("_CLUSTER"), None);
    }

    #[test]
    fn test_unrecognized_source_kinds_are_kept() {
        let event: BuildEvent = serde_json::from_str(
            r#"{"id": "1", "status": "SUCCESS", "source": {"connectedRepository": {"repository": "projects/p/repos/r", "revision": "main"}}}"#,
        )
        .unwrap();
        assert_eq!(
            event.source,
            Some(Provenance::Other("connectedRepository".to_string()))
        );

        let event: BuildEvent =
            serde_json::from_str(r#"{"id": "1", "status": "SUCCESS", "source": {}}"#).unwrap();
        assert_eq!(event.source, Some(Provenance::Other(String::new())));
    }

    #[test]
    fn test_source_serializes_as_single_key() {
        let git = Provenance::Git(GitSource {
            url: "https://github.com/draftboardco/api.git".to_string(),
            revision: "b8decbd".to_string(),
        });
        let value = serde_json::to_value(&git).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"gitSource": {"url": "https://github.com/draftboardco/api.git", "revision": "b8decbd"}})
        );
        assert_eq!(serde_json::from_value::<Provenance>(value).unwrap(), git);

        let other = Provenance::Other("developerConnectConfig".to_string());
        let value = serde_json::to_value(&other).unwrap();
        assert_eq!(value, serde_json::json!({"developerConnectConfig": {}}));
        assert_eq!(serde_json::from_value::<Provenance>(value).unwrap(), other);
        assert_eq!(
            serde_json::to_value(Provenance::Other(String::new())).unwrap(),
            serde_json::json!({})
        );
    }

    #[test]
    fn test_empty_substitution_counts_as_absent() {
        let substitutions: Substitutions = [
            ("_CLUSTER".to_string(), String::new()),
            ("_NAMESPACE".to_string(), "dev".to_string()),
        ]
        .into();
        assert_eq!(substitution_value(&substitutions, "_CLUSTER"), None);
        assert_eq!(substitution_value(&substitutions, "_NAMESPACE"), Some("dev"));
        assert_eq!(substitution_value(&substitutions, "CLUSTER"), None);
    }

    #[test]
    fn test_missing_source_is_none() {
        let event: BuildEvent = serde_json::from_str(r#"{"id": "1", "status": "QUEUED"}"#).unwrap();
        assert!(event.source.is_none());
        assert!(event.substitutions.is_empty());
    }
}
