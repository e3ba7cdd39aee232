//! Flat text archive format
//!
//! An archive is a short preamble followed by one record per revision:
//!
//! ```text
//! REVARC-archive-format-version: 1
//! Document-id: 42
//! Wiki: xwiki
//!
//! Revision: 1.1
//! Author: XWiki_2EAdmin
//! Date: 2024.03.01.10.00.00
//! Comment: first\nversion
//! Storage: full
//! Content-length: 5
//!
//! hello
//! ```
//!
//! Legacy records carry neither `Author`, `Date` nor `Comment`; their
//! metadata has to be recovered from the document text. A record that fails
//! to parse is reported and skipped. A diff record right after it has lost
//! its base, so it and the diffs built on it fail to reconstruct.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;

use crate::author;
use crate::chain::{RevisionChain, RevisionNode, Storage};
use crate::config::EngineConfig;
use crate::diff::Script;
use crate::error::{ArchiveError, Result};
use crate::version::VersionId;

pub const FORMAT_VERSION: u32 = 1;

const FORMAT_HEADER: &str = "REVARC-archive-format-version";
const DATE_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

/// Outcome of parsing an archive
#[derive(Debug, Clone)]
pub struct ParsedArchive {
    /// Every record that parsed cleanly
    pub chain: RevisionChain,
    /// Per-record failures, in archive order
    pub failures: Vec<ArchiveError>,
}

impl ParsedArchive {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Write a chain as archive text. The latest revision is always stored full.
pub fn serialize(chain: &RevisionChain) -> Result<String> {
    let records = chain.flatten()?;

    let mut out = String::new();
    push_header(&mut out, FORMAT_HEADER, FORMAT_VERSION);
    push_header(&mut out, "Document-id", chain.doc_id());
    push_header(&mut out, "Wiki", chain.wiki());
    out.push('\n');

    for record in &records {
        push_header(&mut out, "Revision", record.version);
        if !record.legacy {
            push_header(&mut out, "Author", author::encode(&record.author));
            push_header(&mut out, "Date", record.date.format(DATE_FORMAT));
            push_header(&mut out, "Comment", escape_comment(&record.comment));
        }
        push_header(&mut out, "Storage", if record.is_diff { "diff" } else { "full" });
        push_header(&mut out, "Content-length", record.content.len());
        out.push('\n');
        out.push_str(&record.content);
        out.push('\n');
    }

    tracing::debug!(
        "Serialized document {} ({} revisions, {} bytes)",
        chain.doc_id(),
        records.len(),
        out.len()
    );
    Ok(out)
}

/// Parse archive text with the default limits
pub fn deserialize(text: &str) -> Result<ParsedArchive> {
    deserialize_with(text, &EngineConfig::default())
}

/// Parse archive text, rejecting input beyond the limits of `config`
///
/// Only a broken preamble or an exceeded limit fails the whole call; record
/// level problems end up in [`ParsedArchive::failures`].
pub fn deserialize_with(text: &str, config: &EngineConfig) -> Result<ParsedArchive> {
    if text.len() > config.max_archive_bytes {
        return Err(ArchiveError::LimitExceeded(format!(
            "archive is {} bytes, limit is {}",
            text.len(),
            config.max_archive_bytes
        )));
    }

    let mut cursor = Cursor::new(text);
    let (doc_id, wiki) = read_preamble(&mut cursor)?;

    let mut nodes = Vec::new();
    let mut seen = HashSet::new();
    let mut failures = Vec::new();
    let mut detached = Vec::new();
    // Most recent record that was skipped, until a record parses
    let mut gap: Option<usize> = None;
    let mut record = 0usize;

    loop {
        cursor.skip_blank_lines();
        if cursor.at_end() {
            break;
        }
        record += 1;
        if record > config.max_revisions {
            return Err(ArchiveError::LimitExceeded(format!(
                "archive holds more than {} revisions",
                config.max_revisions
            )));
        }

        match read_record(&mut cursor, record) {
            Ok(node) => {
                if seen.insert(node.version) {
                    if let Some(base) = gap.take().filter(|_| node.is_diff()) {
                        tracing::warn!(
                            "Version {} is a diff against skipped record {}",
                            node.version,
                            base
                        );
                        detached.push((node.version, base));
                    }
                    nodes.push(node);
                } else {
                    tracing::warn!("Skipping duplicate version {} in record {}", node.version, record);
                    failures.push(ArchiveError::DuplicateVersion(node.version));
                    gap = Some(record);
                }
            }
            Err(err) => {
                tracing::warn!("Skipping archive record {}: {}", record, err);
                failures.push(err);
                gap = Some(record);
            }
        }
    }

    let mut chain = RevisionChain::from_nodes(doc_id, nodes)?.with_wiki(wiki);
    for (version, base) in detached {
        chain.detach(version, format!("base record {} failed to parse", base));
    }
    tracing::debug!(
        "Parsed document {} ({} revisions, {} failures)",
        doc_id,
        chain.len(),
        failures.len()
    );
    Ok(ParsedArchive { chain, failures })
}

fn push_header(out: &mut String, name: &str, value: impl std::fmt::Display) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&value.to_string());
    out.push('\n');
}

fn escape_comment(comment: &str) -> String {
    let mut out = String::with_capacity(comment.len());
    for c in comment.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Unknown escapes are kept as written
fn unescape_comment(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Byte position over the archive text, always on a line or char boundary
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek_line(&self) -> Option<&'a str> {
        if self.at_end() {
            return None;
        }
        let rest = self.rest();
        Some(rest.split('\n').next().unwrap_or(rest))
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.peek_line()?;
        self.pos = (self.pos + line.len() + 1).min(self.text.len());
        Some(line)
    }

    fn skip_blank_lines(&mut self) {
        while let Some(line) = self.peek_line() {
            if !line.is_empty() {
                break;
            }
            self.next_line();
        }
    }

    /// Take exactly `len` bytes, if they exist and end on a char boundary
    fn take(&mut self, len: usize) -> Option<&'a str> {
        let end = self.pos.checked_add(len)?;
        let body = self.text.get(self.pos..end)?;
        self.pos = end;
        Some(body)
    }

    /// Consume the newline that terminates a record body
    fn take_terminator(&mut self) -> bool {
        if self.at_end() {
            return true;
        }
        if self.rest().starts_with('\n') {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Move to the next line that opens a record
    fn skip_to_next_record(&mut self) {
        while let Some(line) = self.peek_line() {
            if line.starts_with("Revision:") {
                break;
            }
            self.next_line();
        }
    }
}

/// `Name: value` split; the single space after the colon is optional
fn split_header(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name, value.strip_prefix(' ').unwrap_or(value)))
}

fn read_preamble(cursor: &mut Cursor<'_>) -> Result<(i64, String)> {
    let preamble_error = |reason: String| ArchiveError::UnparsableHeader {
        record: 0,
        version: None,
        reason,
    };

    cursor.skip_blank_lines();
    match cursor.peek_line() {
        Some(line) if line.starts_with(FORMAT_HEADER) => {}
        Some(line) if line.starts_with("Revision:") => {
            tracing::debug!("Archive has no preamble, reading bare records");
            return Ok((0, String::new()));
        }
        Some(line) => return Err(preamble_error(format!("unexpected line {:?}", line))),
        None => return Ok((0, String::new())),
    }

    let mut doc_id = 0i64;
    let mut wiki = String::new();
    while let Some(line) = cursor.next_line() {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = split_header(line) else {
            return Err(preamble_error(format!("malformed line {:?}", line)));
        };
        match name {
            FORMAT_HEADER => {
                if value.trim() != FORMAT_VERSION.to_string() {
                    return Err(preamble_error(format!(
                        "unsupported format version {:?}",
                        value
                    )));
                }
            }
            "Document-id" => {
                doc_id = value
                    .trim()
                    .parse()
                    .map_err(|_| preamble_error(format!("invalid document id {:?}", value)))?;
            }
            "Wiki" => wiki = value.to_string(),
            other => tracing::debug!("Ignoring preamble header {:?}", other),
        }
    }
    Ok((doc_id, wiki))
}

/// Header block of one record
#[derive(Default)]
struct RecordHeaders<'a> {
    revision: Option<&'a str>,
    author: Option<&'a str>,
    date: Option<&'a str>,
    comment: Option<&'a str>,
    storage: Option<&'a str>,
    content_length: Option<&'a str>,
    malformed: Option<&'a str>,
}

impl<'a> RecordHeaders<'a> {
    fn read(cursor: &mut Cursor<'a>) -> Self {
        let mut headers = Self::default();
        while let Some(line) = cursor.next_line() {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = split_header(line) else {
                headers.malformed.get_or_insert(line);
                continue;
            };
            let slot = match name {
                "Revision" => &mut headers.revision,
                "Author" => &mut headers.author,
                "Date" => &mut headers.date,
                "Comment" => &mut headers.comment,
                "Storage" => &mut headers.storage,
                "Content-length" => &mut headers.content_length,
                other => {
                    tracing::debug!("Ignoring record header {:?}", other);
                    continue;
                }
            };
            slot.get_or_insert(value);
        }
        headers
    }

    fn content_length(&self) -> Option<usize> {
        self.content_length.and_then(|v| v.trim().parse().ok())
    }
}

fn read_record(cursor: &mut Cursor<'_>, record: usize) -> Result<RevisionNode> {
    let headers = RecordHeaders::read(cursor);
    let raw_version = headers.revision.map(|v| v.trim().to_string());

    let header_error = |reason: String| ArchiveError::UnparsableHeader {
        record,
        version: raw_version.clone(),
        reason,
    };

    let parsed = parse_headers(&headers).map_err(header_error);
    let (version, metadata, is_diff, length) = match parsed {
        Ok(fields) => fields,
        Err(err) => {
            resync(cursor, headers.content_length());
            return Err(err);
        }
    };

    let body_error = |reason: &str| ArchiveError::UnparsableBody {
        version,
        reason: reason.to_string(),
    };
    let Some(body) = cursor.take(length) else {
        cursor.skip_to_next_record();
        return Err(body_error("content length runs past the end of the archive"));
    };
    if !cursor.take_terminator() {
        cursor.skip_to_next_record();
        return Err(body_error("content is not followed by a record separator"));
    }

    let storage = if is_diff {
        let script = Script::decode(body).map_err(|e| body_error(&e.to_string()))?;
        Storage::Diff(script)
    } else {
        Storage::Full(body.to_string())
    };

    let (author, date, comment, legacy) = match metadata {
        Some((author, date, comment)) => (author, date, comment, false),
        None => (String::new(), DateTime::<Utc>::UNIX_EPOCH, String::new(), true),
    };

    Ok(RevisionNode {
        version,
        author,
        date,
        comment,
        storage,
        legacy,
    })
}

type RecordMetadata = (String, DateTime<Utc>, String);

fn parse_headers(
    headers: &RecordHeaders<'_>,
) -> std::result::Result<(VersionId, Option<RecordMetadata>, bool, usize), String> {
    if let Some(line) = headers.malformed {
        return Err(format!("malformed header line {:?}", line));
    }

    let raw = headers.revision.ok_or("missing Revision header")?;
    let version: VersionId = raw.trim().parse().map_err(|e: ArchiveError| e.to_string())?;

    let metadata = match (headers.author, headers.date, headers.comment) {
        (None, None, None) => None,
        (Some(author), Some(date), Some(comment)) => {
            let date = NaiveDateTime::parse_from_str(date.trim(), DATE_FORMAT)
                .map_err(|_| format!("invalid date {:?}", date))?
                .and_utc();
            Some((author::decode(author.trim()), date, unescape_comment(comment)))
        }
        _ => return Err("only some of Author, Date and Comment are present".to_string()),
    };

    let is_diff = match headers.storage.map(str::trim) {
        Some("full") => false,
        Some("diff") => true,
        Some(other) => return Err(format!("unknown storage {:?}", other)),
        None => return Err("missing Storage header".to_string()),
    };

    let length = headers
        .content_length
        .ok_or("missing Content-length header")?;
    let length: usize = length
        .trim()
        .parse()
        .map_err(|_| format!("invalid content length {:?}", length))?;

    Ok((version, metadata, is_diff, length))
}

/// Skip the body of a record whose headers were rejected
fn resync(cursor: &mut Cursor<'_>, length: Option<usize>) {
    if let Some(length) = length {
        let checkpoint = cursor.pos;
        if cursor.take(length).is_some() && cursor.take_terminator() {
            return;
        }
        cursor.pos = checkpoint;
    }
    cursor.skip_to_next_record();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::record::RevisionMetadata;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sample_chain() -> RevisionChain {
        let config = EngineConfig {
            nodes_per_full: 0,
            ..EngineConfig::default()
        };
        let revisions = [
            ("hello", "XWiki.Admin", "first\nversion", false),
            ("hello\nworld", "", "back\\slash", true),
            ("hello\r\nworld\n", "José", "", false),
        ];
        let mut chain = RevisionChain::new(42).with_wiki("xwiki");
        for (i, (text, author, comment, minor)) in revisions.into_iter().enumerate() {
            let meta = RevisionMetadata::new(author, comment, at(1_700_000_000 + 60 * i as i64));
            chain.commit(text, meta, minor, &config).unwrap();
        }
        chain
    }

    #[test]
    fn test_serialize_layout() {
        let mut chain = RevisionChain::new(42).with_wiki("xwiki");
        chain
            .commit(
                "hello",
                RevisionMetadata::new("XWiki.Admin", "a\nb", at(1_709_287_200)),
                false,
                &EngineConfig::default(),
            )
            .unwrap();

        let text = serialize(&chain).unwrap();
        assert_eq!(
            text,
            "REVARC-archive-format-version: 1\n\
             Document-id: 42\n\
             Wiki: xwiki\n\
             \n\
             Revision: 1.1\n\
             Author: XWiki_2EAdmin\n\
             Date: 2024.03.01.10.00.00\n\
             Comment: a\\nb\n\
             Storage: full\n\
             Content-length: 5\n\
             \n\
             hello\n"
        );
    }

    #[test]
    fn test_roundtrip() {
        let chain = sample_chain();
        let text = serialize(&chain).unwrap();
        let parsed = deserialize(&text).unwrap();

        assert!(parsed.is_clean(), "{:?}", parsed.failures);
        assert_eq!(parsed.chain.doc_id(), 42);
        assert_eq!(parsed.chain.wiki(), "xwiki");
        assert_eq!(parsed.chain, chain);
        for v in chain.versions() {
            assert_eq!(parsed.chain.reconstruct(v).unwrap(), chain.reconstruct(v).unwrap());
        }
    }

    #[test]
    fn test_latest_is_serialized_full() {
        let records = vec![
            crate::record::RevisionRecord {
                doc_id: 1,
                version: VersionId::new(1, 1),
                author: "a".into(),
                date: at(0),
                comment: String::new(),
                is_diff: false,
                content: "x".into(),
                legacy: false,
            },
            crate::record::RevisionRecord {
                doc_id: 1,
                version: VersionId::new(1, 2),
                author: "a".into(),
                date: at(1),
                comment: String::new(),
                is_diff: true,
                content: diff::diff_text("x", "x\ny").encode(),
                legacy: false,
            },
        ];
        let chain = RevisionChain::build(1, records).unwrap();
        let text = serialize(&chain).unwrap();
        assert!(text.ends_with("Storage: full\nContent-length: 3\n\nx\ny\n"));

        let parsed = deserialize(&text).unwrap();
        assert!(!parsed.chain.nodes()[1].is_diff());
        assert_eq!(parsed.chain.reconstruct(VersionId::new(1, 2)).unwrap(), "x\ny");
    }

    #[test]
    fn test_comment_escaping() {
        for comment in ["", "plain", "a\nb", "c\r\nd", "back\\slash", "\\n literal"] {
            assert_eq!(unescape_comment(&escape_comment(comment)), comment);
            assert!(!escape_comment(comment).contains('\n'));
        }
        assert_eq!(unescape_comment("odd\\q"), "odd\\q");
        assert_eq!(unescape_comment("tail\\"), "tail\\");
    }

    #[test]
    fn test_legacy_records() {
        let text = "Revision: 1.1\n\
                    Storage: full\n\
                    Content-length: 3\n\
                    \n\
                    old\n";
        let parsed = deserialize(text).unwrap();
        assert!(parsed.is_clean());
        assert_eq!(parsed.chain.doc_id(), 0);

        let node = parsed.chain.node(VersionId::FIRST).unwrap();
        assert!(node.legacy);
        assert!(node.author.is_empty());

        let again = serialize(&parsed.chain).unwrap();
        assert!(!again.contains("Author:"));
        assert!(deserialize(&again).unwrap().chain.nodes()[0].legacy);
    }

    #[test]
    fn test_partial_metadata_is_rejected() {
        let text = "Revision: 1.1\n\
                    Author: a\n\
                    Storage: full\n\
                    Content-length: 1\n\
                    \n\
                    x\n\
                    Revision: 1.2\n\
                    Storage: full\n\
                    Content-length: 1\n\
                    \n\
                    y\n";
        let parsed = deserialize(text).unwrap();
        assert_eq!(parsed.failures.len(), 1);
        assert!(matches!(
            &parsed.failures[0],
            ArchiveError::UnparsableHeader { record: 1, version: Some(v), .. } if v == "1.1"
        ));
        assert_eq!(parsed.chain.versions(), vec![VersionId::new(1, 2)]);
    }

    #[test]
    fn test_bad_records_are_isolated() {
        let good = sample_chain();
        let text = serialize(&good).unwrap();
        // Break the first record's date and the second record's diff body
        let text = text.replacen("Date: 2023.", "Date: yesterday.", 1);
        let text = text.replacen("\n\na", "\n\nq", 1);

        let parsed = deserialize(&text).unwrap();
        assert_eq!(parsed.failures.len(), 2);
        assert!(matches!(parsed.failures[0], ArchiveError::UnparsableHeader { .. }));
        assert!(matches!(
            parsed.failures[1],
            ArchiveError::UnparsableBody { version, .. } if version == VersionId::new(1, 2)
        ));
        assert_eq!(parsed.chain.versions(), vec![VersionId::new(2, 1)]);
        assert_eq!(
            parsed.chain.reconstruct(VersionId::new(2, 1)).unwrap(),
            "hello\r\nworld\n"
        );
    }

    #[test]
    fn test_diff_after_bad_record_is_not_rebased() {
        let config = EngineConfig {
            nodes_per_full: 0,
            ..EngineConfig::default()
        };
        let mut chain = RevisionChain::new(42).with_wiki("xwiki");
        for (i, text) in ["x", "y", "y\nz", "w"].into_iter().enumerate() {
            let meta = RevisionMetadata::new("XWiki.Admin", "", at(1_700_000_000 + 60 * i as i64));
            chain.commit(text, meta, true, &config).unwrap();
        }
        // Break the date of 1.2, the base of the 1.3 diff
        let date = at(1_700_000_060).format(DATE_FORMAT).to_string();
        let text = serialize(&chain).unwrap();
        assert!(text.contains(&date));
        let text = text.replacen(&format!("Date: {}", date), "Date: never", 1);

        let parsed = deserialize(&text).unwrap();
        assert_eq!(parsed.failures.len(), 1);
        assert!(matches!(parsed.failures[0], ArchiveError::UnparsableHeader { record: 2, .. }));
        assert_eq!(
            parsed.chain.versions(),
            vec![VersionId::new(1, 1), VersionId::new(1, 3), VersionId::new(1, 4)]
        );
        assert_eq!(parsed.chain.detached_versions(), vec![VersionId::new(1, 3)]);

        assert_eq!(
            parsed.chain.reconstruct(VersionId::new(1, 3)).unwrap_err(),
            ArchiveError::PatchFailed {
                version: Some(VersionId::new(1, 3)),
                reason: "base record 2 failed to parse".to_string(),
            }
        );
        assert_eq!(parsed.chain.reconstruct(VersionId::new(1, 1)).unwrap(), "x");
        assert_eq!(parsed.chain.reconstruct(VersionId::new(1, 4)).unwrap(), "w");
        assert!(serialize(&parsed.chain).is_err());
    }

    #[test]
    fn test_resync_without_content_length() {
        let text = "Revision: 1.1\n\
                    Storage: full\n\
                    \n\
                    lost body\n\
                    \n\
                    Revision: 1.2\n\
                    Storage: full\n\
                    Content-length: 4\n\
                    \n\
                    kept\n";
        let parsed = deserialize(text).unwrap();
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.chain.reconstruct(VersionId::new(1, 2)).unwrap(), "kept");
    }

    #[test]
    fn test_truncated_body() {
        let text = "Revision: 1.1\nStorage: full\nContent-length: 50\n\nshort\n";
        let parsed = deserialize(text).unwrap();
        assert!(parsed.chain.is_empty());
        assert!(matches!(parsed.failures[0], ArchiveError::UnparsableBody { .. }));
    }

    #[test]
    fn test_duplicate_versions_keep_first() {
        let text = "Revision: 1.1\nStorage: full\nContent-length: 5\n\nfirst\n\
                    Revision: 1.1\nStorage: full\nContent-length: 6\n\nsecond\n";
        let parsed = deserialize(text).unwrap();
        assert_eq!(
            parsed.failures,
            vec![ArchiveError::DuplicateVersion(VersionId::FIRST)]
        );
        assert_eq!(parsed.chain.reconstruct(VersionId::FIRST).unwrap(), "first");
    }

    #[test]
    fn test_preamble_errors() {
        assert!(deserialize("REVARC-archive-format-version: 2\n\n").is_err());
        assert!(deserialize("REVARC-archive-format-version: 1\nDocument-id: x\n\n").is_err());
        assert!(deserialize("garbage\n").is_err());

        let empty = deserialize("").unwrap();
        assert!(empty.chain.is_empty());
        assert!(empty.is_clean());
    }

    #[test]
    fn test_limits() {
        let text = serialize(&sample_chain()).unwrap();

        let small = EngineConfig {
            max_archive_bytes: 16,
            ..EngineConfig::default()
        };
        assert!(matches!(
            deserialize_with(&text, &small),
            Err(ArchiveError::LimitExceeded(_))
        ));

        let few = EngineConfig {
            max_revisions: 2,
            ..EngineConfig::default()
        };
        assert!(matches!(
            deserialize_with(&text, &few),
            Err(ArchiveError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_body_containing_headers() {
        let mut chain = RevisionChain::new(3);
        let body = "Revision: 9.9\nStorage: full\n\nnot a record";
        chain
            .commit(body, RevisionMetadata::new("a", "", at(0)), false, &EngineConfig::default())
            .unwrap();
        let parsed = deserialize(&serialize(&chain).unwrap()).unwrap();
        assert!(parsed.is_clean());
        assert_eq!(parsed.chain.versions(), vec![VersionId::FIRST]);
        assert_eq!(parsed.chain.reconstruct(VersionId::FIRST).unwrap(), body);
    }
}
