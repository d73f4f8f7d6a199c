//! Shallow git clone resource for plugin and theme repositories.
use anyhow::{Context as _, Result};
use std::path::PathBuf;

use super::helpers::fs::ensure_parent_dir;
use super::{Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// A repository cloned into a fixed directory.
#[derive(Debug)]
pub struct GitRepoResource<'a> {
    /// Remote URL used as `origin`.
    pub url: String,
    /// Checkout directory.
    pub dest: PathBuf,
    /// Branch or tag to clone, default branch when `None`.
    pub branch: Option<String>,
    executor: &'a dyn Executor,
}

impl<'a> GitRepoResource<'a> {
    /// Create a new clone resource.
    #[must_use]
    pub const fn new(
        url: String,
        dest: PathBuf,
        branch: Option<String>,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            url,
            dest,
            branch,
            executor,
        }
    }

    fn dest_str(&self) -> Result<&str> {
        self.dest
            .to_str()
            .with_context(|| format!("non UTF-8 path: {}", self.dest.display()))
    }
}

/// Compare remote URLs ignoring a trailing `/` or `.git`.
fn same_remote(a: &str, b: &str) -> bool {
    let norm = |s: &str| {
        let s = s.trim().trim_end_matches('/');
        s.strip_suffix(".git").unwrap_or(s).to_string()
    };
    norm(a) == norm(b)
}

impl Resource for GitRepoResource<'_> {
    fn description(&self) -> String {
        format!("clone {} into {}", self.url, self.dest.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        if !self.dest.exists() {
            return Ok(ResourceState::Missing);
        }
        if !self.dest.join(".git").exists() {
            return Ok(ResourceState::Invalid {
                reason: format!("{} exists but is not a git checkout", self.dest.display()),
            });
        }
        let result = self.executor.run_unchecked(
            "git",
            &["-C", self.dest_str()?, "remote", "get-url", "origin"],
        )?;
        let origin = result.stdout.trim();
        if result.success && same_remote(origin, &self.url) {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Invalid {
                reason: format!(
                    "{} tracks '{origin}' instead of {}; remove it to re-clone",
                    self.dest.display(),
                    self.url
                ),
            })
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        match self.current_state()? {
            ResourceState::Correct => Ok(ResourceChange::AlreadyCorrect),
            ResourceState::Invalid { reason } => anyhow::bail!(reason),
            ResourceState::Missing | ResourceState::Incorrect { .. } => {
                ensure_parent_dir(&self.dest)?;
                let mut args = vec!["clone", "--depth", "1"];
                if let Some(branch) = &self.branch {
                    args.extend(["--branch", branch.as_str()]);
                }
                args.extend([self.url.as_str(), self.dest_str()?]);
                self.executor.run("git", &args)?;
                Ok(ResourceChange::Applied)
            }
        }
    }
}
