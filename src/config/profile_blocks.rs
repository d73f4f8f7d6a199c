//! `[[profile_blocks]]` entries: templated blocks upserted into shell rc files.
use serde::Deserialize;

/// A marker-delimited block in a shell startup file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileBlock {
    /// Block id used in the markers.
    pub id: String,
    /// Target file; `settings.shell_rc` when absent.
    #[serde(default)]
    pub file: Option<String>,
    /// Block body; may contain `{{ key }}` placeholders.
    pub body: String,
    /// Extra step ids this block waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ProfileBlock {
    /// Step id for this block.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("profile:{}", self.id)
    }
}
