//! Engine configuration
//!
//! Stored as JSON; every field is optional in the file and falls back to
//! its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ArchiveError, Result};

/// Tunables for compaction and input bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Keep every n-th revision (from the oldest) as a full snapshot.
    /// `0` keeps only the oldest and newest full.
    pub nodes_per_full: usize,
    /// Largest archive text accepted by the serializer.
    pub max_archive_bytes: usize,
    /// Largest number of revisions accepted in one archive.
    pub max_revisions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nodes_per_full: 5,
            max_archive_bytes: 64 * 1024 * 1024,
            max_revisions: 100_000,
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file, using defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .map_err(|e| ArchiveError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&data)
            .map_err(|e| ArchiveError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Save config as JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| ArchiveError::Config(e.to_string()))?;
        fs::write(&tmp_path, &data)
            .map_err(|e| ArchiveError::Config(format!("Failed to write {:?}: {}", tmp_path, e)))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| ArchiveError::Config(format!("Failed to replace {:?}: {}", path, e)))?;
        Ok(())
    }

    /// Whether the node at `index` (0 = oldest) must be stored in full
    pub fn keeps_full(&self, index: usize) -> bool {
        if index == 0 {
            return true;
        }
        self.nodes_per_full > 0 && index % self.nodes_per_full == 0
    }
}
