//! Line-oriented diff scripts
//!
//! A script is an ordered list of add/delete operations whose positions
//! refer to the line numbering of the *original* text. The textual encoding
//! is the classic RCS one:
//!
//! ```text
//! d2 1        delete 1 line starting at original line 2
//! a2 1        add 1 line after original line 2
//! X           the added line
//! ```

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{ArchiveError, Result};

/// Largest LCS table filled before a changed section is replaced wholesale
const MAX_TABLE_CELLS: usize = 1 << 22;

static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.)(\d+) (\d+)$").expect("directive pattern"));

/// Split text into lines on `\n` only. The empty text has no lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Inverse of [`split_lines`]
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    out
}

/// A single edit operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Remove `count` original lines starting at 1-based line `position`
    Delete { position: usize, count: usize },
    /// Insert `lines` after the first `position` original lines
    Add { position: usize, lines: Vec<String> },
}

impl EditOp {
    pub fn position(&self) -> usize {
        match self {
            EditOp::Delete { position, .. } | EditOp::Add { position, .. } => *position,
        }
    }

    /// Number of lines the operation affects
    pub fn count(&self) -> usize {
        match self {
            EditOp::Delete { count, .. } => *count,
            EditOp::Add { lines, .. } => lines.len(),
        }
    }
}

/// Ordered edit script transforming one line sequence into another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    ops: Vec<EditOp>,
}

impl Script {
    /// Create an empty (identity) script
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn from_ops(ops: Vec<EditOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Serialize to the RCS directive format
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                EditOp::Delete { position, count } => {
                    out.push_str(&format!("d{} {}\n", position, count));
                }
                EditOp::Add { position, lines } => {
                    out.push_str(&format!("a{} {}\n", position, lines.len()));
                    for line in lines {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }
        out
    }

    /// Parse the RCS directive format
    pub fn decode(text: &str) -> Result<Self> {
        let mut lines = split_lines(text);
        if text.ends_with('\n') {
            lines.pop();
        }

        let mut ops = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let line_no = i + 1;
            let caps = DIRECTIVE
                .captures(lines[i])
                .ok_or_else(|| ArchiveError::MalformedScript {
                    line: line_no,
                    reason: format!("cannot tokenize directive {:?}", lines[i]),
                })?;
            let number = |idx: usize| -> Result<usize> {
                caps[idx].parse().map_err(|_| ArchiveError::MalformedScript {
                    line: line_no,
                    reason: format!("number out of range in {:?}", lines[i]),
                })
            };
            let position = number(2)?;
            let count = number(3)?;
            i += 1;

            match &caps[1] {
                "d" => ops.push(EditOp::Delete { position, count }),
                "a" => {
                    if lines.len() - i < count {
                        return Err(ArchiveError::MalformedScript {
                            line: line_no,
                            reason: format!(
                                "expected {} added lines, found {}",
                                count,
                                lines.len() - i
                            ),
                        });
                    }
                    let added = lines[i..i + count].iter().map(|l| l.to_string()).collect();
                    i += count;
                    ops.push(EditOp::Add {
                        position,
                        lines: added,
                    });
                }
                other => {
                    return Err(ArchiveError::MalformedScript {
                        line: line_no,
                        reason: format!("unknown action {:?}", other),
                    });
                }
            }
        }

        Ok(Self { ops })
    }

    /// Apply to `base` in a single pass over the original numbering
    pub fn apply<S: AsRef<str>>(&self, base: &[S]) -> Result<Vec<String>> {
        let patch_failed = |reason: String| ArchiveError::PatchFailed {
            version: None,
            reason,
        };

        let mut out: Vec<String> = Vec::with_capacity(base.len());
        let mut consumed = 0usize;

        for op in &self.ops {
            match op {
                EditOp::Delete { position, count } => {
                    if *position == 0 {
                        return Err(patch_failed("delete at line 0".to_string()));
                    }
                    let start = position - 1;
                    if start < consumed {
                        return Err(patch_failed(format!(
                            "delete at line {} overlaps an earlier operation",
                            position
                        )));
                    }
                    let end = start
                        .checked_add(*count)
                        .filter(|end| *end <= base.len())
                        .ok_or_else(|| {
                            patch_failed(format!(
                                "delete of {} lines at line {} exceeds {} lines",
                                count,
                                position,
                                base.len()
                            ))
                        })?;
                    out.extend(base[consumed..start].iter().map(|l| l.as_ref().to_string()));
                    consumed = end;
                }
                EditOp::Add { position, lines } => {
                    if *position < consumed {
                        return Err(patch_failed(format!(
                            "add after line {} overlaps an earlier operation",
                            position
                        )));
                    }
                    if *position > base.len() {
                        return Err(patch_failed(format!(
                            "add after line {} exceeds {} lines",
                            position,
                            base.len()
                        )));
                    }
                    out.extend(base[consumed..*position].iter().map(|l| l.as_ref().to_string()));
                    consumed = *position;
                    out.extend(lines.iter().cloned());
                }
            }
        }

        out.extend(base[consumed..].iter().map(|l| l.as_ref().to_string()));
        Ok(out)
    }

    /// Apply to a whole text, splitting and joining lines
    pub fn apply_text(&self, base: &str) -> Result<String> {
        let lines = self.apply(&split_lines(base))?;
        Ok(join_lines(&lines))
    }
}

/// Compute the line diff transforming `original` into `revised`
pub fn diff<S: AsRef<str>>(original: &[S], revised: &[S]) -> Script {
    let a: Vec<&str> = original.iter().map(AsRef::as_ref).collect();
    let b: Vec<&str> = revised.iter().map(AsRef::as_ref).collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let mut ops = Vec::new();
    let mut hunk = Hunk::default();
    let mut consumed = prefix;

    for edit in lcs_edits(a_mid, b_mid) {
        match edit {
            Edit::Keep => {
                hunk.flush(consumed, &mut ops);
                consumed += 1;
            }
            Edit::Delete => {
                if hunk.deleted == 0 {
                    hunk.start = consumed;
                }
                hunk.deleted += 1;
                consumed += 1;
            }
            Edit::Insert(j) => hunk.added.push(b_mid[j].to_string()),
        }
    }
    hunk.flush(consumed, &mut ops);

    Script { ops }
}

/// Diff two whole texts
pub fn diff_text(original: &str, revised: &str) -> Script {
    diff(&split_lines(original), &split_lines(revised))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Delete,
    Insert(usize),
}

#[derive(Default)]
struct Hunk {
    start: usize,
    deleted: usize,
    added: Vec<String>,
}

impl Hunk {
    /// Emit the pending hunk; `consumed` is the original line count so far
    fn flush(&mut self, consumed: usize, ops: &mut Vec<EditOp>) {
        if self.deleted > 0 {
            ops.push(EditOp::Delete {
                position: self.start + 1,
                count: self.deleted,
            });
        }
        if !self.added.is_empty() {
            ops.push(EditOp::Add {
                position: consumed,
                lines: std::mem::take(&mut self.added),
            });
        }
        self.deleted = 0;
    }
}

/// LCS edit walk preferring the earliest match, then deletions
fn lcs_edits(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return (0..m).map(Edit::Insert).collect();
    }
    if m == 0 {
        return vec![Edit::Delete; n];
    }
    let width = m + 1;
    if (n + 1).checked_mul(width).is_none_or(|cells| cells > MAX_TABLE_CELLS) {
        tracing::debug!("Replacing {} lines with {} without alignment", n, m);
        let mut edits = vec![Edit::Delete; n];
        edits.extend((0..m).map(Edit::Insert));
        return edits;
    }

    // Intern lines so the table fill compares integers
    let mut ids: HashMap<&str, u32> = HashMap::new();
    let a_ids: Vec<u32> = a.iter().map(|&s| intern(&mut ids, s)).collect();
    let b_ids: Vec<u32> = b.iter().map(|&s| intern(&mut ids, s)).collect();

    // table[i * (m + 1) + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a_ids[i] == b_ids[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut edits = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a_ids[i] == b_ids[j] {
            edits.push(Edit::Keep);
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            edits.push(Edit::Delete);
            i += 1;
        } else {
            edits.push(Edit::Insert(j));
            j += 1;
        }
    }
    edits.extend((i..n).map(|_| Edit::Delete));
    edits.extend((j..m).map(Edit::Insert));
    edits
}

fn intern<'a>(ids: &mut HashMap<&'a str, u32>, line: &'a str) -> u32 {
    let next = ids.len() as u32;
    *ids.entry(line).or_insert(next)
}
