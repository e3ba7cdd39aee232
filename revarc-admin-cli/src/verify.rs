//! Verify archive integrity

use anyhow::{Result, anyhow};
use revarc_core::EngineConfig;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::store;

/// Counters collected while verifying one archive
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub verified: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// SHA-256 of a reconstructed revision text
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Parse an archive, reconstruct every revision and report failures
pub fn verify_archive(path: &Path, config: &EngineConfig, quiet: bool) -> Result<()> {
    let parsed = store::read_archive(path, config)?;

    if !quiet {
        println!("Verifying archive: {}", path.display());
        println!(
            "  Document: {} (wiki {:?})",
            parsed.chain.doc_id(),
            parsed.chain.wiki()
        );
        println!("  Revisions: {}", parsed.chain.len());
        println!();
    }

    let mut report = VerifyReport {
        errors: parsed.failures.len(),
        ..VerifyReport::default()
    };
    if !quiet {
        for failure in &parsed.failures {
            eprintln!("  ERROR: {}", failure);
        }
    }

    for node in parsed.chain.nodes().iter().filter(|n| n.legacy) {
        report.warnings += 1;
        if !quiet {
            eprintln!("  WARNING: {} has no recorded metadata", node.version);
        }
    }

    for (version, text) in parsed.chain.reconstruct_all() {
        match text {
            Ok(text) => {
                report.verified += 1;
                if !quiet {
                    println!("  {:<8} {}", version.to_string(), content_hash(&text));
                }
            }
            Err(e) => {
                report.errors += 1;
                if !quiet {
                    eprintln!("  ERROR: {} reconstruction failed: {}", version, e);
                }
            }
        }
    }

    println!("\nVerification:");
    println!("  Revisions verified: {}", report.verified);
    println!("  Errors:             {}", report.errors);
    println!("  Warnings:           {}", report.warnings);

    if report.errors > 0 {
        Err(anyhow!(
            "Archive verification failed with {} error(s)",
            report.errors
        ))
    } else {
        if !quiet {
            println!("\n✓ Archive is healthy");
        }
        Ok(())
    }
}
