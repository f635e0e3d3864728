//! Crate-wide error type.
//!
//! Recoverable "what happened" outcomes (an unresolvable ref, a verdict
//! conflict, an empty candidate list) are modeled as plain enums returned
//! inside `Ok`, not as `Err` variants here — see [`crate::bisect::engine`].
//! Only genuinely exceptional conditions flow through [`Error`].

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bundle {bundle_id} is missing for commit {commit}")]
    BundleMissing { commit: String, bundle_id: String },

    #[error("failed to decompress bundle {bundle_id}: {reason}")]
    DecompressFailed { bundle_id: String, reason: String },

    #[error("failed to compress bundle {bundle_id}: {reason}")]
    CompressFailed { bundle_id: String, reason: String },

    #[error("range {start}..{end} is invalid: {reason}")]
    RangeInvalid { start: String, end: String, reason: String },

    #[error("no configuration file found at {searched:?}")]
    ConfigMissing { searched: Vec<PathBuf> },

    #[error("failed to parse configuration at {path}: {source}")]
    ConfigInvalid { path: PathBuf, source: toml::de::Error },

    #[error("git command failed: {0}")]
    Vcs(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn bundle_missing(commit: impl Into<String>, bundle_id: impl Into<String>) -> Self {
        Self::BundleMissing { commit: commit.into(), bundle_id: bundle_id.into() }
    }

    pub fn decompress_failed(bundle_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DecompressFailed { bundle_id: bundle_id.into(), reason: reason.into() }
    }

    pub fn compress_failed(bundle_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CompressFailed { bundle_id: bundle_id.into(), reason: reason.into() }
    }

    pub fn range_invalid(
        start: impl Into<String>,
        end: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RangeInvalid { start: start.into(), end: end.into(), reason: reason.into() }
    }
}
