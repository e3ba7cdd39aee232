//! Error types for the revision archive engine

use crate::version::VersionId;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors that can occur while encoding, parsing or reconstructing an archive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("Malformed diff script at line {line}: {reason}")]
    MalformedScript { line: usize, reason: String },

    #[error("Patch failed{}: {reason}", fmt_version(.version))]
    PatchFailed {
        version: Option<VersionId>,
        reason: String,
    },

    #[error("Duplicate version: {0}")]
    DuplicateVersion(VersionId),

    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Invalid version string: {0:?}")]
    InvalidVersion(String),

    #[error("Unparsable header in record {record}{}: {reason}", fmt_raw_version(.version))]
    UnparsableHeader {
        record: usize,
        version: Option<String>,
        reason: String,
    },

    #[error("Unparsable body for version {version}: {reason}")]
    UnparsableBody { version: VersionId, reason: String },

    #[error("Legacy metadata recovery failed for version {version}: {reason}")]
    LegacyRecoveryFailed { version: VersionId, reason: String },

    #[error("Record for document {found} does not belong to document {expected}")]
    DocumentMismatch { expected: i64, found: i64 },

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArchiveError {
    /// Attach the version being reconstructed to a patch failure that lacks one
    pub(crate) fn at_version(self, at: VersionId) -> Self {
        match self {
            ArchiveError::PatchFailed {
                version: None,
                reason,
            } => ArchiveError::PatchFailed {
                version: Some(at),
                reason,
            },
            other => other,
        }
    }
}

fn fmt_version(version: &Option<VersionId>) -> String {
    version.map(|v| format!(" at version {}", v)).unwrap_or_default()
}

fn fmt_raw_version(version: &Option<String>) -> String {
    version
        .as_ref()
        .map(|v| format!(" (version {})", v))
        .unwrap_or_default()
}
