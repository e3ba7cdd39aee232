//! Revision history queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Window applied to the ascending list of matching versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Range {
    #[default]
    All,
    /// The oldest `n` matches
    First(usize),
    /// The newest `n` matches
    Last(usize),
    /// `size` matches starting at offset `start`
    Slice { start: usize, size: usize },
}

impl Range {
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        match *self {
            Range::All => items,
            Range::First(n) => {
                items.truncate(n);
                items
            }
            Range::Last(n) => {
                let skip = items.len().saturating_sub(n);
                items.split_off(skip)
            }
            Range::Slice { start, size } => items.into_iter().skip(start).take(size).collect(),
        }
    }
}

/// Filter for listing the revisions of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionCriteria {
    /// Only revisions by this author; empty matches everyone
    pub author: String,
    /// Exclusive lower bound on the revision date
    pub min_date: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the revision date
    pub max_date: Option<DateTime<Utc>>,
    /// When false, only the last revision of each major series is listed
    pub include_minor_versions: bool,
    pub range: Range,
}

impl Default for RevisionCriteria {
    fn default() -> Self {
        Self {
            author: String::new(),
            min_date: None,
            max_date: None,
            include_minor_versions: true,
            range: Range::All,
        }
    }
}

impl RevisionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn between(mut self, min: Option<DateTime<Utc>>, max: Option<DateTime<Utc>>) -> Self {
        self.min_date = min;
        self.max_date = max;
        self
    }

    pub fn major_only(mut self) -> Self {
        self.include_minor_versions = false;
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    pub(crate) fn matches_author(&self, author: &str) -> bool {
        self.author.is_empty() || self.author == author
    }

    pub(crate) fn matches_date(&self, date: &DateTime<Utc>) -> bool {
        self.min_date.is_none_or(|min| *date > min) && self.max_date.is_none_or(|max| *date < max)
    }
}
