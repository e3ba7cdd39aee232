//! Commands that rewrite an archive

use anyhow::Result;
use chrono::Utc;
use revarc_core::{EngineConfig, RevisionChain, RevisionMetadata, VersionId, XmlDocumentParser};
use std::path::Path;

use crate::store;

/// New archive identity, used when `commit` creates the file
#[derive(Debug, Clone, Default)]
pub struct NewArchive {
    pub doc_id: i64,
    pub wiki: String,
}

/// Re-encode `archive` into `output` (or in place); returns the revision count
pub fn compact_archive(archive: &Path, output: Option<&Path>, config: &EngineConfig) -> Result<usize> {
    let mut parsed = store::read_archive_for_update(archive, config)?;
    parsed.chain.compact(config)?;
    store::write_archive(output.unwrap_or(archive), &parsed.chain)?;
    Ok(parsed.chain.len())
}

/// Recover legacy metadata; returns (recovered, legacy) counts
pub fn recover_archive(
    archive: &Path,
    output: Option<&Path>,
    config: &EngineConfig,
) -> Result<(usize, usize)> {
    let mut parsed = store::read_archive_for_update(archive, config)?;
    let legacy = parsed.chain.nodes().iter().filter(|n| n.legacy).count();
    let failures = parsed.chain.recover_legacy(&XmlDocumentParser);
    for failure in &failures {
        eprintln!("  WARNING: {}", failure);
    }
    store::write_archive(output.unwrap_or(archive), &parsed.chain)?;
    Ok((legacy - failures.len(), legacy))
}

/// Append `text` as a new revision, creating the archive if it does not exist
pub fn commit_revision(
    archive: &Path,
    text: &str,
    metadata: RevisionMetadata,
    minor: bool,
    new: NewArchive,
    config: &EngineConfig,
) -> Result<VersionId> {
    let mut chain = if archive.exists() {
        store::read_archive_for_update(archive, config)?.chain
    } else {
        RevisionChain::new(new.doc_id).with_wiki(new.wiki)
    };
    let version = chain.commit(text, metadata, minor, config)?;
    store::write_archive(archive, &chain)?;
    Ok(version)
}

/// Commit metadata stamped with the current time
pub fn metadata_now(author: String, comment: String) -> RevisionMetadata {
    RevisionMetadata::new(author, comment, Utc::now())
}

/// Delete the revisions in `[from, to]`; returns how many were removed
pub fn remove_revisions(
    archive: &Path,
    from: VersionId,
    to: VersionId,
    output: Option<&Path>,
    config: &EngineConfig,
) -> Result<usize> {
    let mut parsed = store::read_archive_for_update(archive, config)?;
    let removed = parsed.chain.remove_versions(from, to)?;
    store::write_archive(output.unwrap_or(archive), &parsed.chain)?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DAMAGED: &str = "REVARC-archive-format-version: 1\n\
                           Document-id: 4\n\
                           Wiki: xwiki\n\
                           \n\
                           Revision: 1.1\n\
                           Storage: full\n\
                           Content-length: 1\n\
                           \n\
                           a\n\
                           Revision: 1.2\n\
                           Storage: full\n\
                           Content-length: x\n\
                           \n\
                           b\n\
                           Revision: 1.3\n\
                           Storage: full\n\
                           Content-length: 1\n\
                           \n\
                           c\n";

    fn damaged(tmp: &TempDir) -> std::path::PathBuf {
        let path = tmp.path().join("Main.Damaged.arc");
        fs::write(&path, DAMAGED).unwrap();
        path
    }

    #[test]
    fn test_commit_creates_then_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Main.New.arc");
        let config = EngineConfig::default();
        let new = NewArchive {
            doc_id: 9,
            wiki: "xwiki".to_string(),
        };

        let meta = metadata_now("XWiki.Admin".to_string(), String::new());
        let v1 = commit_revision(&path, "one", meta.clone(), false, new.clone(), &config).unwrap();
        let v2 = commit_revision(&path, "one\ntwo", meta, true, new, &config).unwrap();
        assert_eq!((v1, v2), (VersionId::new(1, 1), VersionId::new(1, 2)));

        let parsed = store::read_archive(&path, &config).unwrap();
        assert_eq!(parsed.chain.doc_id(), 9);
        assert_eq!(parsed.chain.reconstruct(v2).unwrap(), "one\ntwo");
    }

    #[test]
    fn test_compact_leaves_damaged_archive_alone() {
        let tmp = TempDir::new().unwrap();
        let path = damaged(&tmp);
        let config = EngineConfig::default();

        let err = compact_archive(&path, None, &config).unwrap_err();
        assert!(err.to_string().contains("Refusing to rewrite"));
        assert_eq!(fs::read_to_string(&path).unwrap(), DAMAGED);
    }

    #[test]
    fn test_every_rewrite_refuses_damaged_archive() {
        let tmp = TempDir::new().unwrap();
        let path = damaged(&tmp);
        let out = tmp.path().join("out.arc");
        let config = EngineConfig::default();

        assert!(recover_archive(&path, Some(&out), &config).is_err());
        assert!(
            remove_revisions(
                &path,
                VersionId::new(1, 3),
                VersionId::new(1, 3),
                Some(&out),
                &config
            )
            .is_err()
        );
        let meta = metadata_now("XWiki.Admin".to_string(), String::new());
        assert!(commit_revision(&path, "d", meta, true, NewArchive::default(), &config).is_err());

        assert!(!out.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), DAMAGED);
    }

    #[test]
    fn test_remove_and_compact_clean_archive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Main.Clean.arc");
        let config = EngineConfig::default();
        for text in ["a", "a\nb", "a\nb\nc"] {
            let meta = metadata_now("XWiki.Admin".to_string(), String::new());
            commit_revision(&path, text, meta, true, NewArchive::default(), &config).unwrap();
        }

        let removed =
            remove_revisions(&path, VersionId::new(1, 2), VersionId::new(1, 2), None, &config)
                .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(compact_archive(&path, None, &config).unwrap(), 2);

        let parsed = store::read_archive(&path, &config).unwrap();
        assert_eq!(
            parsed.chain.reconstruct(VersionId::new(1, 3)).unwrap(),
            "a\nb\nc"
        );
    }
}
