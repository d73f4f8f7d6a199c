//! Manifest loading, path expansion and validation.
pub mod git_config;
pub mod identity;
pub mod packages;
pub mod plugins;
pub mod profile_blocks;
pub mod scripts;
pub mod ssh;
pub mod symlinks;
pub mod templates;
pub mod toml_loader;
pub mod toolchains;
pub mod validation;

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use identity::{Identity, IdentityConfig};
use validation::ValidationWarning;

/// Manifest path used when neither `--config` nor `PROVISION_CONFIG` is set.
pub const DEFAULT_MANIFEST: &str = "conf/provision.toml";

fn default_install_root() -> String {
    "~/.local/opt".to_string()
}

fn default_shell_rc() -> String {
    "~/.zshrc".to_string()
}

fn default_ssh_config() -> String {
    "~/.ssh/config".to_string()
}

const fn default_version_timeout_secs() -> u64 {
    5
}

/// `[settings]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory toolchains are unpacked under.
    #[serde(default = "default_install_root")]
    pub install_root: String,
    /// Default file for profile blocks.
    #[serde(default = "default_shell_rc")]
    pub shell_rc: String,
    /// SSH client config maintained by `[[ssh_hosts]]`.
    #[serde(default = "default_ssh_config")]
    pub ssh_config: String,
    /// Timeout for latest-version lookups.
    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            shell_rc: default_shell_rc(),
            ssh_config: default_ssh_config(),
            version_timeout_secs: default_version_timeout_secs(),
        }
    }
}

/// The whole declarative manifest, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Engine settings.
    pub settings: Settings,
    /// Identity defaults.
    pub identity: IdentityConfig,
    /// Keypair settings.
    pub ssh: ssh::SshSettings,
    /// Apt packages.
    pub packages: Vec<packages::Package>,
    /// Archive toolchains.
    pub toolchains: Vec<toolchains::Toolchain>,
    /// Vendor install scripts.
    pub scripts: Vec<scripts::Script>,
    /// Plugin clones.
    pub plugins: Vec<plugins::Plugin>,
    /// Symlinks.
    pub links: Vec<symlinks::Link>,
    /// Shell rc blocks.
    pub profile_blocks: Vec<profile_blocks::ProfileBlock>,
    /// Rendered files.
    pub templates: Vec<templates::TemplateFile>,
    /// SSH `Host` stanzas.
    pub ssh_hosts: Vec<ssh::SshHost>,
    /// Global git settings.
    pub git_config: Vec<git_config::GitSetting>,
}

impl Manifest {
    /// Number of declared entries across all step-producing sections.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.packages.len()
            + self.toolchains.len()
            + self.scripts.len()
            + self.plugins.len()
            + self.links.len()
            + self.profile_blocks.len()
            + self.templates.len()
            + self.ssh_hosts.len()
            + self.git_config.len()
    }

    /// Collapse identical duplicate entries; the first occurrence keeps its
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingStep`] when two entries share a
    /// step id but differ in any field.
    pub fn dedupe(&mut self) -> Result<(), ConfigError> {
        dedupe_by_id(&mut self.packages, packages::Package::step_id)?;
        dedupe_by_id(&mut self.toolchains, toolchains::Toolchain::step_id)?;
        dedupe_by_id(&mut self.scripts, scripts::Script::step_id)?;
        dedupe_by_id(&mut self.plugins, plugins::Plugin::step_id)?;
        dedupe_by_id(&mut self.links, symlinks::Link::step_id)?;
        dedupe_by_id(&mut self.profile_blocks, profile_blocks::ProfileBlock::step_id)?;
        dedupe_by_id(&mut self.templates, templates::TemplateFile::step_id)?;
        dedupe_by_id(&mut self.ssh_hosts, ssh::SshHost::step_id)?;
        dedupe_by_id(&mut self.git_config, git_config::GitSetting::step_id)?;
        Ok(())
    }

    /// Replace every toolchain's fallback version.
    pub fn override_fallback_versions(&mut self, version: &str) {
        for toolchain in &mut self.toolchains {
            toolchain.fallback = Some(version.to_string());
        }
    }
}

fn dedupe_by_id<T: PartialEq>(
    items: &mut Vec<T>,
    step_id: impl Fn(&T) -> String,
) -> Result<(), ConfigError> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        let id = step_id(&item);
        match kept.iter().find(|k| step_id(k) == id) {
            Some(existing) if *existing == item => {}
            Some(_) => return Err(ConfigError::ConflictingStep(id)),
            None => kept.push(item),
        }
    }
    *items = kept;
    Ok(())
}

/// Expand a leading `~` to `home`.
#[must_use]
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    raw.strip_prefix("~/")
        .map_or_else(|| PathBuf::from(raw), |rest| home.join(rest))
}

/// Expand `~`, then anchor a relative result at `base`.
#[must_use]
pub fn resolve_under(raw: &str, home: &Path, base: &Path) -> PathBuf {
    let path = expand_home(raw, home);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// A loaded, deduplicated and validated manifest plus its surroundings.
#[derive(Debug)]
pub struct Config {
    /// Repository root; relative sources resolve against it.
    pub root: PathBuf,
    /// Home directory `~` expands to.
    pub home: PathBuf,
    /// The manifest.
    pub manifest: Manifest,
    /// Identity after flags, environment, manifest and prompting.
    pub identity: Identity,
    /// Non-fatal validation findings.
    pub warnings: Vec<ValidationWarning>,
}

impl Config {
    /// Load the manifest at `manifest_path` (relative paths resolve
    /// against `root`), dedupe it and validate it.
    ///
    /// `default_version`, when set, replaces every toolchain's fallback.
    ///
    /// The identity comes from the manifest only; callers layer flags and
    /// prompting on top with [`Config::with_identity`].
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing, malformed, declares
    /// conflicting steps or holds invalid values.
    pub fn load(
        root: &Path,
        manifest_path: &Path,
        home: &Path,
        default_version: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let path = if manifest_path.is_absolute() {
            manifest_path.to_path_buf()
        } else {
            root.join(manifest_path)
        };
        let mut manifest: Manifest = toml_loader::load_config(&path)?;
        if let Some(version) = default_version {
            manifest.override_fallback_versions(version);
        }
        Self::from_manifest(root, home, manifest)
    }

    /// Build from an already parsed manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest declares conflicting steps or holds
    /// invalid values.
    pub fn from_manifest(root: &Path, home: &Path, mut manifest: Manifest) -> Result<Self, ConfigError> {
        manifest.dedupe()?;
        let warnings = validation::validate_all(&manifest, root)?;
        let identity = Identity::resolve(None, None, &manifest.identity);
        Ok(Self {
            root: root.to_path_buf(),
            home: home.to_path_buf(),
            manifest,
            identity,
            warnings,
        })
    }

    /// Replace the resolved identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Expand a manifest path relative to the home directory.
    #[must_use]
    pub fn home_path(&self, raw: &str) -> PathBuf {
        resolve_under(raw, &self.home, &self.home)
    }

    /// Expand a manifest path relative to the repository root.
    #[must_use]
    pub fn root_path(&self, raw: &str) -> PathBuf {
        resolve_under(raw, &self.home, &self.root)
    }

    /// Directory toolchains are installed under.
    #[must_use]
    pub fn install_root(&self) -> PathBuf {
        self.home_path(&self.manifest.settings.install_root)
    }
}
