//! `[[packages]]` entries.
use serde::Deserialize;

/// An apt package to install.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    /// Debian package name.
    pub name: String,
    /// Exact version to pin, as printed by `dpkg-query`.
    #[serde(default)]
    pub version: Option<String>,
    /// Extra step ids this package waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Package {
    /// Step id for this package.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("package:{}", self.name)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::Manifest;

    #[test]
    fn parses_minimal_and_pinned() {
        let manifest: Manifest = toml::from_str(
            r#"
            [[packages]]
            name = "git"

            [[packages]]
            name = "zsh"
            version = "5.9-4"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.packages.len(), 2);
        assert_eq!(manifest.packages[0].step_id(), "package:git");
        assert_eq!(manifest.packages[1].version.as_deref(), Some("5.9-4"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<Manifest, _> = toml::from_str("[[packages]]\nname = \"git\"\naur = true\n");
        assert!(result.is_err());
    }
}
