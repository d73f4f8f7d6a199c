//! `[[plugins]]` entries: shallow git clones (shell plugins, themes).
use serde::Deserialize;

/// A repository cloned into a fixed directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plugin {
    /// Plugin name.
    pub name: String,
    /// Remote URL.
    pub url: String,
    /// Checkout directory.
    pub dest: String,
    /// Branch or tag.
    #[serde(default)]
    pub branch: Option<String>,
    /// Extra step ids this plugin waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Plugin {
    /// Step id for this plugin.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("plugin:{}", self.name)
    }
}
