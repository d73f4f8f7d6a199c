//! `[[templates]]` entries: whole files rendered from the environment model.
use serde::Deserialize;

/// A configuration file rendered from a template.
///
/// Exactly one of `source` (a file under the root) or `body` must be given.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateFile {
    /// Template name.
    pub name: String,
    /// Destination path.
    pub dest: String,
    /// Template file, relative to the root when not absolute.
    #[serde(default)]
    pub source: Option<String>,
    /// Inline template body.
    #[serde(default)]
    pub body: Option<String>,
    /// Keys required in addition to the body's placeholders.
    #[serde(default)]
    pub required_keys: Vec<String>,
    /// Extra step ids this template waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TemplateFile {
    /// Step id for this template.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("template:{}", self.name)
    }
}
