//! Record shapes exchanged with the storage layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::VersionId;

/// One revision row as persisted by the storage layer
///
/// `content` holds the full text when `is_diff` is false, otherwise the
/// encoded diff script against the previous revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub doc_id: i64,
    pub version: VersionId,
    #[serde(default)]
    pub author: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    pub is_diff: bool,
    pub content: String,
    /// Metadata predates explicit author/comment/date fields
    #[serde(default)]
    pub legacy: bool,
}

/// Author, comment and date of a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    pub author: String,
    pub comment: String,
    pub date: DateTime<Utc>,
}

impl RevisionMetadata {
    pub fn new(author: impl Into<String>, comment: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            comment: comment.into(),
            date,
        }
    }
}

impl Default for RevisionMetadata {
    /// Values used when legacy metadata cannot be recovered
    fn default() -> Self {
        Self {
            author: String::new(),
            comment: String::new(),
            date: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Metadata view of one revision, without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub version: VersionId,
    pub author: String,
    pub comment: String,
    pub date: DateTime<Utc>,
    pub is_minor_edit: bool,
    pub is_diff: bool,
    pub legacy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_defaults() {
        let json = r#"{
            "doc_id": 42,
            "version": "1.2",
            "date": "2024-03-01T10:00:00Z",
            "is_diff": true,
            "content": "d1 1\n"
        }"#;
        let record: RevisionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.doc_id, 42);
        assert_eq!(record.version, VersionId::new(1, 2));
        assert!(record.author.is_empty());
        assert!(record.comment.is_empty());
        assert!(!record.legacy);
    }

    #[test]
    fn test_default_metadata() {
        let meta = RevisionMetadata::default();
        assert!(meta.author.is_empty());
        assert_eq!(meta.date.timestamp(), 0);
    }
}
