//! `[[toolchains]]` entries: archive-installed tools with version resolution.
use serde::Deserialize;

/// Placeholder substituted with the resolved version in `url`.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Version keyword meaning "resolve from `latest_url`".
pub const LATEST: &str = "latest";

fn default_version() -> String {
    LATEST.to_string()
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

const fn default_strip_components() -> u32 {
    1
}

/// A toolchain unpacked from a release archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Toolchain {
    /// Toolchain name; also the install directory under `install_root`.
    pub name: String,
    /// `"latest"` or an exact version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Endpoint returning the latest version (text or JSON `tag_name`).
    #[serde(default)]
    pub latest_url: Option<String>,
    /// Prefix stripped from the fetched version (`go`, `v`).
    #[serde(default)]
    pub strip_prefix: Option<String>,
    /// Version used when the latest lookup fails.
    #[serde(default)]
    pub fallback: Option<String>,
    /// Archive URL containing `{version}`.
    pub url: String,
    /// Expected archive digest.  Only meaningful with a pinned version.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Binary relative to the install directory, e.g. `bin/go`.
    pub binary: String,
    /// Arguments that print the version.
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    /// Leading archive path components to strip.
    #[serde(default = "default_strip_components")]
    pub strip_components: u32,
    /// Extra step ids this toolchain waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Toolchain {
    /// Step id for this toolchain.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("toolchain:{}", self.name)
    }

    /// Whether the version is resolved at run time.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.version.eq_ignore_ascii_case(LATEST)
    }

    /// Archive URL for `version`.
    #[must_use]
    pub fn url_for(&self, version: &str) -> String {
        self.url.replace(VERSION_PLACEHOLDER, version)
    }
}
