//! Archive file access

use anyhow::{Context, Result, anyhow};
use revarc_core::{EngineConfig, ParsedArchive, RevisionChain};
use std::fs;
use std::path::Path;

/// Read and parse an archive file, logging records that had to be skipped
pub fn read_archive(path: &Path, config: &EngineConfig) -> Result<ParsedArchive> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read archive {}", path.display()))?;
    let parsed = revarc_core::deserialize_with(&text, config)
        .with_context(|| format!("Failed to parse archive {}", path.display()))?;
    for failure in &parsed.failures {
        tracing::warn!("{}: {}", path.display(), failure);
    }
    Ok(parsed)
}

/// Read an archive that is about to be rewritten
///
/// Records that failed to parse would be dropped by the rewrite, so any
/// failure refuses the update.
pub fn read_archive_for_update(path: &Path, config: &EngineConfig) -> Result<ParsedArchive> {
    let parsed = read_archive(path, config)?;
    if parsed.is_clean() {
        return Ok(parsed);
    }
    let failures: Vec<String> = parsed.failures.iter().map(|f| f.to_string()).collect();
    Err(anyhow!(
        "Refusing to rewrite {} with {} damaged record(s): {}",
        path.display(),
        failures.len(),
        failures.join("; ")
    ))
}

/// Serialize a chain and replace the file at `path`
pub fn write_archive(path: &Path, chain: &RevisionChain) -> Result<()> {
    let text = revarc_core::serialize(chain)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, text)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    tracing::info!("Wrote archive {} ({} revisions)", path.display(), chain.len());
    Ok(())
}
