//! Revision listings

use anyhow::Result;
use revarc_core::{RevisionChain, RevisionCriteria, RevisionInfo};

/// One line per revision: version, date, author, flags and comment
pub fn format_entry(info: &RevisionInfo) -> String {
    let author = if info.author.is_empty() {
        "(unknown)"
    } else {
        info.author.as_str()
    };
    let mut flags = Vec::new();
    if info.is_minor_edit {
        flags.push("minor");
    }
    if info.legacy {
        flags.push("legacy");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(","))
    };
    let comment = info.comment.replace('\n', " ");
    format!(
        "{:<8} {}  {}{}  {}",
        info.version.to_string(),
        info.date.format("%Y-%m-%d %H:%M:%S"),
        author,
        flags,
        comment
    )
    .trim_end()
    .to_string()
}

pub fn log_lines(chain: &RevisionChain, criteria: &RevisionCriteria) -> Result<Vec<String>> {
    chain
        .revisions(criteria)
        .into_iter()
        .rev()
        .map(|v| -> Result<String> { Ok(format_entry(&chain.revision_info(v)?)) })
        .collect()
}
