//! Subcommand entry points and the setup they share: locating the root,
//! loading the manifest and settling the Git identity.
pub mod completions;
pub mod list;
pub mod run;
pub mod version;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::config::identity::{Identity, Prompter};
use crate::config::{Config, DEFAULT_MANIFEST};
use crate::error::{ConfigError, GraphError, ProvisionError};
use crate::logging::Log;

/// How a command finished, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Every step succeeded or needs a manual action.
    Success,
    /// At least one step failed and the run was not told to continue.
    StepsFailed,
    /// Ctrl-C stopped the run.
    Interrupted,
}

impl Exit {
    /// Process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::StepsFailed => 1,
            Self::Interrupted => 130,
        }
    }
}

/// Exit code for an error that escaped a command: 2 for configuration and
/// graph errors raised before any step ran, 1 otherwise.
#[must_use]
pub fn error_exit_code(err: &anyhow::Error) -> u8 {
    let setup = err.chain().any(|cause| {
        cause.is::<ConfigError>() || cause.is::<GraphError>() || cause.is::<ProvisionError>()
    });
    if setup { 2 } else { 1 }
}

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Loaded configuration with the identity resolved.
    pub config: Config,
}

impl CommandSetup {
    /// Resolve the root, load the manifest and settle the identity.
    ///
    /// `prompter` is asked for missing identity fields; pass `None` to
    /// never prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or home directory cannot be determined,
    /// or the manifest fails to load.
    pub fn init(global: &GlobalOpts, log: &dyn Log, prompter: Option<&dyn Prompter>) -> Result<Self> {
        let root = resolve_root(global)?;
        let home = home_dir()?;
        log.debug(&format!("root: {}", root.display()));

        log.stage("Loading configuration");
        let manifest_path = global
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST));
        let config = Config::load(
            &root,
            &manifest_path,
            &home,
            global.default_version.as_deref(),
        )?;
        log.info(&format!(
            "loaded {} entries from {}",
            config.manifest.entry_count(),
            manifest_path.display()
        ));

        if !config.warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                config.warnings.len()
            ));
            for warning in &config.warnings {
                log.warn(&format!("  {warning}"));
            }
        }

        let mut identity = Identity::resolve(
            global.name.as_deref(),
            global.email.as_deref(),
            &config.manifest.identity,
        );
        let missing = identity.missing_fields();
        if !missing.is_empty() {
            match prompter {
                Some(prompter) => identity.prompt_missing(prompter)?,
                None => log.warn(&format!(
                    "identity {} not set; steps that need it will fail",
                    missing.join(" and ")
                )),
            }
        }

        Ok(Self {
            config: config.with_identity(identity),
        })
    }
}

/// The current user's home directory.
///
/// # Errors
///
/// Returns an error if `HOME` is unset.
pub fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .context("HOME is not set")
}

fn has_manifest(dir: &Path) -> bool {
    dir.join(DEFAULT_MANIFEST).exists()
}

/// Resolve the workspace root from CLI arguments or auto-detection.
///
/// # Errors
///
/// Returns an error if no directory holding `conf/provision.toml` can be
/// found.
pub fn resolve_root(global: &GlobalOpts) -> Result<PathBuf> {
    if let Some(ref root) = global.root {
        return Ok(root.clone());
    }

    let cwd = std::env::current_dir()?;
    if has_manifest(&cwd) {
        return Ok(cwd);
    }

    // An explicit --config makes the current directory the root.
    if global.config.is_some() {
        return Ok(cwd);
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(parent) = exe.parent()
    {
        // target/release/ → repo root, or bin/ → repo root
        let candidates = [parent.join("../.."), parent.join("..")];
        for candidate in &candidates {
            if has_manifest(candidate) {
                return Ok(dunce::canonicalize(candidate)?);
            }
        }
    }

    anyhow::bail!(
        "cannot find {DEFAULT_MANIFEST}. Use --root or set PROVISION_ROOT"
    );
}
