//! `[[scripts]]` entries: vendor install scripts run once.
use serde::Deserialize;
use std::collections::BTreeMap;

/// A remote install script guarded by a `creates` path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Script name.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// Path whose existence marks the script as done.
    pub creates: String,
    /// Arguments passed to the script.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment for the script.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Expected script digest.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Extra step ids this script waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Script {
    /// Step id for this script.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("script:{}", self.name)
    }
}
