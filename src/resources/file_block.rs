//! Marker-delimited block inside a file the user otherwise owns.
//!
//! Blocks look like
//!
//! ```text
//! # >>> provision:aliases >>>
//! alias ll='ls -alF'
//! # <<< provision:aliases <<<
//! ```
//!
//! Everything outside the markers is left byte-for-byte untouched.
use anyhow::Result;
use std::path::PathBuf;

use super::helpers::fs::{read_optional, write_atomic};
use super::{Resource, ResourceChange, ResourceState};

/// Opening marker line for block `id`.
#[must_use]
pub fn begin_marker(id: &str) -> String {
    format!("# >>> provision:{id} >>>")
}

/// Closing marker line for block `id`.
#[must_use]
pub fn end_marker(id: &str) -> String {
    format!("# <<< provision:{id} <<<")
}

/// A managed block inside a text file.
#[derive(Debug, Clone)]
pub struct FileBlockResource {
    /// File containing the block.
    pub path: PathBuf,
    /// Block identifier used in the markers.
    pub id: String,
    /// Block body, without markers.
    pub body: String,
}

impl FileBlockResource {
    /// Create a new block resource.
    #[must_use]
    pub const fn new(path: PathBuf, id: String, body: String) -> Self {
        Self { path, id, body }
    }

    /// The full block text including markers and a trailing newline.
    #[must_use]
    pub fn rendered_block(&self) -> String {
        let body = self.body.trim_end_matches('\n');
        if body.is_empty() {
            format!("{}\n{}\n", begin_marker(&self.id), end_marker(&self.id))
        } else {
            format!(
                "{}\n{body}\n{}\n",
                begin_marker(&self.id),
                end_marker(&self.id)
            )
        }
    }
}

/// Return `existing` with exactly one copy of `block` for `id`.
///
/// The first existing block is replaced in place, later duplicates are
/// dropped, and an absent block is appended after a blank separator line.
/// A begin marker with no end marker before the next begin marker (or the
/// end of the file) is left as plain text.
#[must_use]
pub fn upsert_block(existing: &str, id: &str, block: &str) -> String {
    let begin = begin_marker(id);
    let end = end_marker(id);

    let mut out = String::with_capacity(existing.len() + block.len());
    let mut inserted = false;
    let mut lines = existing.split_inclusive('\n');
    let mut pending: Vec<&str> = Vec::new();

    while let Some(line) = lines.next() {
        if line.trim_end() != begin {
            out.push_str(line);
            continue;
        }
        // Collect until the matching end marker.
        pending.clear();
        pending.push(line);
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim_end() == begin {
                // The earlier begin marker was never closed.
                pending.drain(..).for_each(|l| out.push_str(l));
                pending.push(inner);
                continue;
            }
            pending.push(inner);
            if inner.trim_end() == end {
                closed = true;
                break;
            }
        }
        if closed {
            if !inserted {
                out.push_str(block);
                inserted = true;
            }
        } else {
            pending.iter().for_each(|l| out.push_str(l));
        }
    }

    if !inserted {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(block);
    }
    out
}

impl Resource for FileBlockResource {
    fn description(&self) -> String {
        format!("block '{}' in {}", self.id, self.path.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(existing) = read_optional(&self.path)? else {
            return Ok(ResourceState::Missing);
        };
        let desired = upsert_block(&existing, &self.id, &self.rendered_block());
        if desired == existing {
            Ok(ResourceState::Correct)
        } else if existing.contains(&begin_marker(&self.id)) {
            Ok(ResourceState::Incorrect {
                current: "block content differs".to_string(),
            })
        } else {
            Ok(ResourceState::Missing)
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        let existing = read_optional(&self.path)?.unwrap_or_default();
        let desired = upsert_block(&existing, &self.id, &self.rendered_block());
        if desired == existing {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        write_atomic(&self.path, &desired)?;
        Ok(ResourceChange::Applied)
    }
}
