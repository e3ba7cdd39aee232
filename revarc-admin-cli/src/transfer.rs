//! JSON import and export of revision records

use anyhow::{Context, Result};
use revarc_core::{EngineConfig, RevisionChain, RevisionRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::store;

/// Revision records of one document as exchanged with a storage layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsFile {
    pub doc_id: i64,
    #[serde(default)]
    pub wiki: String,
    pub records: Vec<RevisionRecord>,
}

/// Build an archive from a JSON records file, returning the revision count
pub fn import_records(input: &Path, output: &Path) -> Result<usize> {
    let data = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let file: RecordsFile = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse records in {}", input.display()))?;

    let chain = RevisionChain::build(file.doc_id, file.records)?.with_wiki(file.wiki);
    store::write_archive(output, &chain)?;
    Ok(chain.len())
}

/// Write the records of an archive as JSON, returning the record count
pub fn export_records(archive: &Path, output: &Path, config: &EngineConfig) -> Result<usize> {
    let parsed = store::read_archive(archive, config)?;
    let file = RecordsFile {
        doc_id: parsed.chain.doc_id(),
        wiki: parsed.chain.wiki().to_string(),
        records: parsed.chain.flatten()?,
    };
    let data = serde_json::to_string_pretty(&file)?;
    fs::write(output, data).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(file.records.len())
}
