//! Two-part revision identifiers
//!
//! Versions are written `major.minor`. A major edit starts a new series at
//! `minor == 1`; every further minor edit bumps the minor number.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ArchiveError;

/// Revision identifier ordered by major, then minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId {
    major: u32,
    minor: u32,
}

impl VersionId {
    /// Version given to the first revision of a document
    pub const FIRST: VersionId = VersionId { major: 1, minor: 1 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// A version is a minor edit unless it opens a major series
    pub fn is_minor_edit(&self) -> bool {
        self.minor != 1
    }

    /// Version following this one after a minor edit, if the minor number
    /// has room left
    pub fn next_minor(&self) -> Option<Self> {
        self.minor.checked_add(1).map(|minor| Self::new(self.major, minor))
    }

    /// Version following this one after a major edit, if the major number
    /// has room left
    pub fn next_major(&self) -> Option<Self> {
        self.major.checked_add(1).map(|major| Self::new(major, 1))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionId {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArchiveError::InvalidVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        if major.is_empty()
            || minor.is_empty()
            || !major.bytes().all(|b| b.is_ascii_digit())
            || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Self::new(major, minor))
    }
}

impl Serialize for VersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
