//! `[[links]]` entries: files from the repository linked into place.
use serde::Deserialize;

/// A symlink to create: `target` → `source`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    /// Path of the linked file, relative to the root when not absolute.
    pub source: String,
    /// Where the link is created, usually under `~`.
    pub target: String,
    /// Extra step ids this link waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Link {
    /// Step id for this link, keyed by the target as written.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("link:{}", self.target)
    }
}
