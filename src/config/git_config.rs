//! `[[git_config]]` entries.
use serde::Deserialize;

/// A git config key-value pair to apply globally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitSetting {
    /// Config key (e.g. `"pull.rebase"`).
    pub key: String,
    /// Desired value (e.g. `"true"`).
    pub value: String,
}

impl GitSetting {
    /// Step id for this setting.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("git-config:{}", self.key)
    }
}
