//! Archive-installed toolchain resource (Go, Node, …).
//!
//! The archive is downloaded and unpacked into a staging directory beside
//! the final location, then swapped into place with a rename, so an
//! interrupted install never leaves a half-extracted tree at `dest`.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::helpers::download::{download, verify_sha256};
use super::{Resource, ResourceChange, ResourceState};
use crate::error::StepError;
use crate::exec::Executor;

/// A toolchain unpacked from a tarball into `dest`.
#[derive(Debug)]
pub struct ToolchainResource<'a> {
    /// Toolchain name, used in messages.
    pub name: String,
    /// Desired version.
    pub version: String,
    /// Archive URL for `version`.
    pub url: String,
    /// Expected archive digest, if known.
    pub sha256: Option<String>,
    /// Install directory.
    pub dest: PathBuf,
    /// Binary relative to `dest` whose output proves the version.
    pub binary: PathBuf,
    /// Arguments printing the version, e.g. `["version"]`.
    pub version_args: Vec<String>,
    /// Leading path components stripped by `tar`.
    pub strip_components: u32,
    executor: &'a dyn Executor,
}

impl<'a> ToolchainResource<'a> {
    /// Create a toolchain resource with `--version` and one stripped
    /// component as defaults.
    #[must_use]
    pub fn new(
        name: String,
        version: String,
        url: String,
        dest: PathBuf,
        binary: PathBuf,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            name,
            version,
            url,
            sha256: None,
            dest,
            binary,
            version_args: vec!["--version".to_string()],
            strip_components: 1,
            executor,
        }
    }

    /// Require the archive to match `sha256`.
    #[must_use]
    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }

    /// Override the version arguments.
    #[must_use]
    pub fn with_version_args(mut self, args: Vec<String>) -> Self {
        self.version_args = args;
        self
    }

    /// Override the number of stripped path components.
    #[must_use]
    pub const fn with_strip_components(mut self, n: u32) -> Self {
        self.strip_components = n;
        self
    }

    /// Absolute path of the version binary.
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.dest.join(&self.binary)
    }

    /// Version output of the installed binary, `None` if it does not run.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary path is not valid UTF-8.
    pub fn installed_version_output(&self) -> Result<Option<String>> {
        let binary = self.binary_path();
        if !binary.is_file() {
            return Ok(None);
        }
        let program = binary
            .to_str()
            .with_context(|| format!("non UTF-8 path: {}", binary.display()))?;
        let args: Vec<&str> = self.version_args.iter().map(String::as_str).collect();
        match self.executor.run_unchecked(program, &args) {
            Ok(r) if r.success => Ok(Some(format!("{}{}", r.stdout, r.stderr))),
            _ => Ok(None),
        }
    }

    fn unpack(&self, archive: &Path, into: &Path) -> Result<()> {
        let strip = format!("--strip-components={}", self.strip_components);
        let archive = archive
            .to_str()
            .with_context(|| format!("non UTF-8 path: {}", archive.display()))?;
        let into_str = into
            .to_str()
            .with_context(|| format!("non UTF-8 path: {}", into.display()))?;
        std::fs::create_dir_all(into).with_context(|| format!("create {}", into.display()))?;
        self.executor
            .run("tar", &["-xf", archive, "-C", into_str, &strip])?;
        Ok(())
    }

    /// Move `staged` to `dest`, keeping the previous tree until the rename
    /// succeeded.
    fn swap_into_place(&self, staged: &Path) -> Result<()> {
        let previous = previous_path(&self.dest);
        if previous.exists() {
            std::fs::remove_dir_all(&previous)
                .with_context(|| format!("remove {}", previous.display()))?;
        }
        let had_previous = self.dest.exists();
        if had_previous {
            std::fs::rename(&self.dest, &previous)
                .with_context(|| format!("move aside {}", self.dest.display()))?;
        }
        if let Err(e) = std::fs::rename(staged, &self.dest) {
            if had_previous {
                // Best effort restore; the original error is what matters.
                let _ = std::fs::rename(&previous, &self.dest);
            }
            return Err(e).with_context(|| format!("install into {}", self.dest.display()));
        }
        if had_previous {
            std::fs::remove_dir_all(&previous)
                .with_context(|| format!("remove {}", previous.display()))?;
        }
        Ok(())
    }
}

/// Sibling path the previous install is parked at during a swap.
fn previous_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".provision-old");
    PathBuf::from(name)
}

/// Whether `output` names `version` as a whole token, so `1.22.1` does not
/// match `go1.22.10` and `1.2` does not match `v1.21.0`.
fn reports_version(output: &str, version: &str) -> bool {
    output.match_indices(version).any(|(start, _)| {
        let before = output.get(..start).and_then(|s| s.chars().next_back());
        let after = output
            .get(start + version.len()..)
            .and_then(|s| s.chars().next());
        !before.is_some_and(|c| c.is_ascii_digit())
            && !after.is_some_and(|c| c.is_ascii_digit() || c == '.')
    })
}

impl Resource for ToolchainResource<'_> {
    fn description(&self) -> String {
        format!("{} {} in {}", self.name, self.version, self.dest.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        match self.installed_version_output()? {
            None => Ok(ResourceState::Missing),
            Some(out) if reports_version(&out, &self.version) => Ok(ResourceState::Correct),
            Some(out) => Ok(ResourceState::Incorrect {
                current: out.lines().next().unwrap_or_default().trim().to_string(),
            }),
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        let parent = self
            .dest
            .parent()
            .with_context(|| format!("{} has no parent", self.dest.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-staging-", self.name))
            .tempdir_in(parent)
            .with_context(|| format!("create staging dir in {}", parent.display()))?;
        let archive = staging.path().join("archive");
        let tree = staging.path().join("tree");

        download(self.executor, &self.url, &archive)?;
        if let Some(expected) = &self.sha256 {
            verify_sha256(&archive, expected)?;
        }
        self.unpack(&archive, &tree)?;
        self.swap_into_place(&tree)?;

        match self.current_state()? {
            ResourceState::Correct => Ok(ResourceChange::Applied),
            ResourceState::Incorrect { current } => Err(StepError::VerificationFailed {
                subject: format!("{} version", self.name),
                expected: self.version.clone(),
                found: current,
            }
            .into()),
            _ => Err(StepError::VerificationFailed {
                subject: format!("{} binary", self.name),
                expected: self.binary_path().display().to_string(),
                found: "not runnable".to_string(),
            }
            .into()),
        }
    }
}
