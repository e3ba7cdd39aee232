//! Revision chain of a single document
//!
//! Nodes are kept in ascending version order. A `Diff` node stores the
//! script turning its predecessor's text into its own, so the oldest node
//! is always a full snapshot and reconstruction walks forward from the
//! nearest snapshot at or before the requested version.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::criteria::RevisionCriteria;
use crate::diff::{self, Script, join_lines, split_lines};
use crate::error::{ArchiveError, Result};
use crate::legacy::DocumentParser;
use crate::record::{RevisionInfo, RevisionMetadata, RevisionRecord};
use crate::version::VersionId;

/// How a revision's text is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Full(String),
    Diff(Script),
}

impl Storage {
    pub fn is_diff(&self) -> bool {
        matches!(self, Storage::Diff(_))
    }
}

/// One revision of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionNode {
    pub version: VersionId,
    pub author: String,
    pub date: DateTime<Utc>,
    pub comment: String,
    pub storage: Storage,
    /// Metadata must be recovered from the document text
    pub legacy: bool,
}

impl RevisionNode {
    pub fn new(version: VersionId, metadata: RevisionMetadata, storage: Storage) -> Self {
        Self {
            version,
            author: metadata.author,
            date: metadata.date,
            comment: metadata.comment,
            storage,
            legacy: false,
        }
    }

    pub fn is_diff(&self) -> bool {
        self.storage.is_diff()
    }

    pub fn metadata(&self) -> RevisionMetadata {
        RevisionMetadata::new(self.author.clone(), self.comment.clone(), self.date)
    }

    pub fn info(&self) -> RevisionInfo {
        RevisionInfo {
            version: self.version,
            author: self.author.clone(),
            comment: self.comment.clone(),
            date: self.date,
            is_minor_edit: self.version.is_minor_edit(),
            is_diff: self.is_diff(),
            legacy: self.legacy,
        }
    }

    fn set_metadata(&mut self, metadata: RevisionMetadata) {
        self.author = metadata.author;
        self.comment = metadata.comment;
        self.date = metadata.date;
    }
}

/// Ordered history of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionChain {
    doc_id: i64,
    wiki: String,
    nodes: Vec<RevisionNode>,
    /// Diff nodes whose stored base was lost, with the reason
    detached: BTreeMap<VersionId, String>,
}

impl RevisionChain {
    /// Create an empty chain
    pub fn new(doc_id: i64) -> Self {
        Self {
            doc_id,
            wiki: String::new(),
            nodes: Vec::new(),
            detached: BTreeMap::new(),
        }
    }

    pub fn with_wiki(mut self, wiki: impl Into<String>) -> Self {
        self.wiki = wiki.into();
        self
    }

    /// Build a chain from storage records, keeping their stored encoding
    pub fn build(doc_id: i64, records: Vec<RevisionRecord>) -> Result<Self> {
        let mut nodes = Vec::with_capacity(records.len());
        for record in records {
            if record.doc_id != doc_id {
                return Err(ArchiveError::DocumentMismatch {
                    expected: doc_id,
                    found: record.doc_id,
                });
            }
            let storage = if record.is_diff {
                Storage::Diff(Script::decode(&record.content)?)
            } else {
                Storage::Full(record.content)
            };
            nodes.push(RevisionNode {
                version: record.version,
                author: record.author,
                date: record.date,
                comment: record.comment,
                storage,
                legacy: record.legacy,
            });
        }

        let chain = Self::from_nodes(doc_id, nodes)?;
        tracing::debug!("Built chain for document {} with {} revisions", doc_id, chain.len());
        Ok(chain)
    }

    /// Assemble a chain from nodes in any order
    pub fn from_nodes(doc_id: i64, mut nodes: Vec<RevisionNode>) -> Result<Self> {
        nodes.sort_by_key(|n| n.version);
        if let Some(pair) = nodes.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(ArchiveError::DuplicateVersion(pair[0].version));
        }
        Ok(Self {
            doc_id,
            wiki: String::new(),
            nodes,
            detached: BTreeMap::new(),
        })
    }

    /// Mark a diff node whose base revision is missing from the chain
    ///
    /// The node and every diff built on it fail to reconstruct instead of
    /// being patched onto whichever older node happens to precede it.
    pub(crate) fn detach(&mut self, version: VersionId, reason: impl Into<String>) {
        self.detached.insert(version, reason.into());
    }

    /// Diff nodes cut off from their base, oldest first
    pub fn detached_versions(&self) -> Vec<VersionId> {
        self.detached.keys().copied().collect()
    }

    pub fn doc_id(&self) -> i64 {
        self.doc_id
    }

    pub fn wiki(&self) -> &str {
        &self.wiki
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RevisionNode] {
        &self.nodes
    }

    pub fn node(&self, version: VersionId) -> Result<&RevisionNode> {
        Ok(&self.nodes[self.index_of(version)?])
    }

    pub fn versions(&self) -> Vec<VersionId> {
        self.nodes.iter().map(|n| n.version).collect()
    }

    pub fn first_version(&self) -> Option<VersionId> {
        self.nodes.first().map(|n| n.version)
    }

    pub fn latest_version(&self) -> Option<VersionId> {
        self.nodes.last().map(|n| n.version)
    }

    /// Closest version strictly older than `version`
    pub fn previous_version(&self, version: VersionId) -> Option<VersionId> {
        let idx = self.nodes.partition_point(|n| n.version < version);
        idx.checked_sub(1).map(|i| self.nodes[i].version)
    }

    /// Closest version strictly newer than `version`
    pub fn next_version(&self, version: VersionId) -> Option<VersionId> {
        let idx = self.nodes.partition_point(|n| n.version <= version);
        self.nodes.get(idx).map(|n| n.version)
    }

    pub fn revision_info(&self, version: VersionId) -> Result<RevisionInfo> {
        Ok(self.node(version)?.info())
    }

    fn index_of(&self, version: VersionId) -> Result<usize> {
        self.nodes
            .binary_search_by_key(&version, |n| n.version)
            .map_err(|_| ArchiveError::VersionNotFound(version))
    }

    /// Reconstruct the text of one revision
    pub fn reconstruct(&self, version: VersionId) -> Result<String> {
        let index = self.index_of(version)?;
        Resolver::new(&self.nodes, &self.detached).resolve_text(index)
    }

    /// Reconstruct every revision in one pass, oldest first
    pub fn reconstruct_all(&self) -> Vec<(VersionId, Result<String>)> {
        let mut resolver = Resolver::new(&self.nodes, &self.detached);
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.version, resolver.resolve_text(i)))
            .collect()
    }

    /// Records for the storage layer; the latest is always a full snapshot
    pub fn flatten(&self) -> Result<Vec<RevisionRecord>> {
        if let Some((version, reason)) = self.detached.iter().next() {
            return Err(ArchiveError::PatchFailed {
                version: Some(*version),
                reason: reason.clone(),
            });
        }
        let Some(last) = self.nodes.len().checked_sub(1) else {
            return Ok(Vec::new());
        };
        let latest_text = Resolver::new(&self.nodes, &self.detached).resolve_text(last)?;

        let records = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let (is_diff, content) = if i == last {
                    (false, latest_text.clone())
                } else {
                    match &node.storage {
                        Storage::Full(text) => (false, text.clone()),
                        Storage::Diff(script) => (true, script.encode()),
                    }
                };
                RevisionRecord {
                    doc_id: self.doc_id,
                    version: node.version,
                    author: node.author.clone(),
                    date: node.date,
                    comment: node.comment.clone(),
                    is_diff,
                    content,
                    legacy: node.legacy,
                }
            })
            .collect();
        Ok(records)
    }

    /// Fill in metadata of legacy nodes from their document text
    ///
    /// Failures never abort: the node gets default metadata, keeps its legacy
    /// flag, and a `LegacyRecoveryFailed` entry is returned for it.
    pub fn recover_legacy(&mut self, parser: &dyn DocumentParser) -> Vec<ArchiveError> {
        let mut updates = Vec::new();
        let mut failures = Vec::new();
        {
            let mut resolver = Resolver::new(&self.nodes, &self.detached);
            for (i, node) in self.nodes.iter().enumerate() {
                if !node.legacy {
                    continue;
                }
                let parsed = resolver
                    .resolve_text(i)
                    .map_err(|e| e.to_string())
                    .and_then(|text| parser.parse_metadata(&text).map_err(|e| e.to_string()));
                match parsed {
                    Ok(metadata) => updates.push((i, metadata, false)),
                    Err(reason) => {
                        tracing::warn!(
                            "Legacy metadata recovery failed for version {}: {}",
                            node.version,
                            reason
                        );
                        failures.push(ArchiveError::LegacyRecoveryFailed {
                            version: node.version,
                            reason,
                        });
                        updates.push((i, RevisionMetadata::default(), true));
                    }
                }
            }
        }

        for (i, metadata, still_legacy) in updates {
            let node = &mut self.nodes[i];
            node.set_metadata(metadata);
            node.legacy = still_legacy;
        }
        failures
    }

    /// Append a new revision and return its version
    ///
    /// The new head is stored in full; the previous head becomes a diff
    /// against its own predecessor unless `config` keeps it as a snapshot.
    pub fn commit(
        &mut self,
        text: &str,
        metadata: RevisionMetadata,
        minor_edit: bool,
        config: &EngineConfig,
    ) -> Result<VersionId> {
        let version = match self.latest_version() {
            None => VersionId::FIRST,
            Some(latest) => {
                let next = if minor_edit {
                    latest.next_minor()
                } else {
                    latest.next_major()
                };
                next.ok_or_else(|| {
                    ArchiveError::LimitExceeded(format!("no version follows {}", latest))
                })?
            }
        };

        if let Some(prev) = self.nodes.len().checked_sub(1) {
            let mut resolver = Resolver::new(&self.nodes, &self.detached);
            let prev_text = resolver.resolve_text(prev)?;
            let storage = if config.keeps_full(prev) {
                Storage::Full(prev_text)
            } else {
                let base = resolver.resolve_text(prev - 1)?;
                Storage::Diff(diff::diff_text(&base, &prev_text))
            };
            self.nodes[prev].storage = storage;
        }

        self.nodes.push(RevisionNode::new(
            version,
            metadata,
            Storage::Full(text.to_string()),
        ));
        tracing::debug!("Committed version {} of document {}", version, self.doc_id);
        Ok(version)
    }

    /// Remove every revision in `[from, to]`, returning how many were removed
    pub fn remove_versions(&mut self, from: VersionId, to: VersionId) -> Result<usize> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let lo = self.nodes.partition_point(|n| n.version < from);
        let hi = self.nodes.partition_point(|n| n.version <= to);
        if lo >= hi {
            return Ok(0);
        }

        // Texts needed to re-anchor the survivors, computed before mutating
        let mut resolver = Resolver::new(&self.nodes, &self.detached);
        let successor = if hi < self.nodes.len() {
            Some(resolver.resolve_text(hi)?)
        } else {
            None
        };
        let predecessor = match lo.checked_sub(1) {
            Some(p) => Some(resolver.resolve_text(p)?),
            None => None,
        };

        let removed = hi - lo;
        self.nodes.drain(lo..hi);
        self.detached.retain(|v, _| *v < from || *v > to);

        let last = self.nodes.len().checked_sub(1);
        if let Some(text) = successor {
            let was_diff = self.nodes[lo].is_diff();
            self.nodes[lo].storage = match &predecessor {
                Some(base) if was_diff && Some(lo) != last => {
                    Storage::Diff(diff::diff_text(base, &text))
                }
                _ => Storage::Full(text),
            };
        } else if let (Some(text), Some(last)) = (predecessor, last) {
            // The head was removed; the new head must be a snapshot
            self.nodes[last].storage = Storage::Full(text);
        }

        tracing::debug!(
            "Removed {} revisions ({}..={}) from document {}",
            removed,
            from,
            to,
            self.doc_id
        );
        Ok(removed)
    }

    /// Re-encode the whole chain per the snapshot interval of `config`
    pub fn compact(&mut self, config: &EngineConfig) -> Result<()> {
        let mut texts = Vec::with_capacity(self.nodes.len());
        for (_, text) in self.reconstruct_all() {
            texts.push(text?);
        }

        let last = texts.len().saturating_sub(1);
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.storage = if i == last || config.keeps_full(i) {
                Storage::Full(texts[i].clone())
            } else {
                Storage::Diff(diff::diff_text(&texts[i - 1], &texts[i]))
            };
        }
        tracing::debug!(
            "Compacted document {} ({} revisions, snapshot every {})",
            self.doc_id,
            self.nodes.len(),
            config.nodes_per_full
        );
        Ok(())
    }

    /// Versions matching `criteria`, oldest first
    pub fn revisions(&self, criteria: &RevisionCriteria) -> Vec<VersionId> {
        let matching = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                criteria.include_minor_versions
                    || self
                        .nodes
                        .get(i + 1)
                        .is_none_or(|next| !next.version.is_minor_edit())
            })
            .filter(|(_, node)| criteria.matches_author(&node.author))
            .filter(|(_, node)| criteria.matches_date(&node.date))
            .map(|(_, node)| node.version)
            .collect();
        criteria.range.apply(matching)
    }
}

enum NodeState {
    Unresolved,
    Resolved(Rc<Vec<String>>),
    Failed(ArchiveError),
}

/// Memoizing text reconstruction over one borrow of the nodes
struct Resolver<'c> {
    nodes: &'c [RevisionNode],
    detached: &'c BTreeMap<VersionId, String>,
    states: Vec<NodeState>,
}

impl<'c> Resolver<'c> {
    fn new(nodes: &'c [RevisionNode], detached: &'c BTreeMap<VersionId, String>) -> Self {
        Self {
            nodes,
            detached,
            states: nodes.iter().map(|_| NodeState::Unresolved).collect(),
        }
    }

    fn resolve_text(&mut self, index: usize) -> Result<String> {
        Ok(join_lines(&self.resolve(index)?))
    }

    fn resolve(&mut self, index: usize) -> Result<Rc<Vec<String>>> {
        // Walk back to the nearest snapshot or already settled node
        let mut start = index;
        loop {
            match &self.states[start] {
                NodeState::Resolved(_) => break,
                NodeState::Failed(err) => return Err(err.clone()),
                NodeState::Unresolved => {}
            }
            if !self.nodes[start].is_diff() {
                break;
            }
            if let Some(reason) = self.detached.get(&self.nodes[start].version) {
                let err = ArchiveError::PatchFailed {
                    version: Some(self.nodes[start].version),
                    reason: reason.clone(),
                };
                self.states[start] = NodeState::Failed(err.clone());
                return Err(err);
            }
            if start == 0 {
                let err = ArchiveError::PatchFailed {
                    version: Some(self.nodes[0].version),
                    reason: "oldest revision is a diff with no base revision".to_string(),
                };
                self.states[0] = NodeState::Failed(err.clone());
                return Err(err);
            }
            start -= 1;
        }

        let mut current: Option<Rc<Vec<String>>> = None;
        for k in start..=index {
            if let NodeState::Resolved(lines) = &self.states[k] {
                current = Some(Rc::clone(lines));
                continue;
            }
            let node = &self.nodes[k];
            let result = match &node.storage {
                Storage::Full(text) => {
                    Ok(split_lines(text).into_iter().map(str::to_string).collect())
                }
                Storage::Diff(script) => {
                    let base: &[String] = match &current {
                        Some(lines) => lines.as_slice(),
                        None => &[],
                    };
                    script.apply(base).map_err(|e| e.at_version(node.version))
                }
            };
            match result {
                Ok(lines) => {
                    let lines = Rc::new(lines);
                    self.states[k] = NodeState::Resolved(Rc::clone(&lines));
                    current = Some(lines);
                }
                Err(err) => {
                    self.states[k] = NodeState::Failed(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(current.unwrap_or_default())
    }
}
