//! Display strings derived from a build's provenance and substitutions.
//!
//! Every function here is total: an absent or unrecognized source degrades to an
//! empty string (or `"Unknown"` for the kind label) rather than an error.

use crate::events::{substitution_value, Provenance, Substitutions};

/// Repository label: repo name, `owner/repo` for git URLs, `gs://bucket` for storage.
#[must_use]
pub fn repo_label(source: Option<&Provenance>) -> String {
    match source {
        Some(Provenance::Repo(repo)) => repo.repo_name.clone(),
        Some(Provenance::Git(git)) => git_repo_path(&git.url),
        Some(Provenance::Storage(storage)) => format!("gs://{}", storage.bucket),
        Some(Provenance::Other(_)) | None => String::new(),
    }
}

/// Last two path segments of a git URL, minus one trailing `.git`.
///
/// URLs with a single segment yield that segment as-is.
fn git_repo_path(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let trimmed = url.strip_suffix(".git").unwrap_or(url);
    let parts: Vec<&str> = trimmed.split('/').collect();
    let tail = parts.len().saturating_sub(2);
    parts[tail..].join("/")
}

/// Ref label: `branch/…`, `tag/…`, `commit/…`, `generation/…` or `object/…`.
#[must_use]
pub fn ref_label(source: Option<&Provenance>) -> String {
    match source {
        Some(Provenance::Repo(repo)) => [
            ("branch", &repo.branch_name),
            ("tag", &repo.tag_name),
            ("commit", &repo.commit_sha),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_empty())
        .map(|(kind, value)| format!("{kind}/{value}"))
        .unwrap_or_default(),
        Some(Provenance::Git(git)) if !git.revision.is_empty() => {
            format!("commit/{}", git.revision)
        }
        Some(Provenance::Storage(storage)) if storage.generation != 0 => {
            format!("generation/{}", storage.generation)
        }
        Some(Provenance::Storage(storage)) => format!("object/{}", storage.object),
        Some(Provenance::Git(_) | Provenance::Other(_)) | None => String::new(),
    }
}

/// Human-readable source kind.
#[must_use]
pub const fn source_kind_label(source: Option<&Provenance>) -> &'static str {
    match source {
        Some(Provenance::Repo(_)) => "Cloud Source Repository",
        Some(Provenance::Git(_)) => "Git Repository",
        Some(Provenance::Storage(_)) => "Cloud Storage",
        Some(Provenance::Other(_)) | None => "Unknown",
    }
}

/// Short discriminant for branching in templates: `repo`, `git`, `storage`,
/// `other` for an unrecognized kind, or empty when there is no source.
#[must_use]
pub const fn provenance_kind(source: Option<&Provenance>) -> &'static str {
    match source {
        Some(Provenance::Repo(_)) => "repo",
        Some(Provenance::Git(_)) => "git",
        Some(Provenance::Storage(_)) => "storage",
        Some(Provenance::Other(_)) => "other",
        None => "",
    }
}

/// Git ref from the `BRANCH_NAME` / `TAG_NAME` / `SHORT_SHA` substitutions.
#[must_use]
pub fn git_ref_from_substitutions(substitutions: &Substitutions) -> String {
    let get = |key: &str| substitution_value(substitutions, key);

    match (get("BRANCH_NAME"), get("TAG_NAME"), get("SHORT_SHA")) {
        (Some(branch), _, Some(sha)) => format!("branch/{branch} ({sha})"),
        (None, Some(tag), Some(sha)) => format!("tag/{tag} ({sha})"),
        (_, _, Some(sha)) => format!("commit/{sha}"),
        _ => String::new(),
    }
}
