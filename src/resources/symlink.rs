//! Symlink resource.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::helpers::fs::{backup_existing, ensure_parent_dir, remove_existing};
use super::{Resource, ResourceChange, ResourceState};

/// A symlink resource that can be checked and applied.
#[derive(Debug, Clone)]
pub struct SymlinkResource {
    /// The source file/directory (what the symlink points to).
    pub source: PathBuf,
    /// The target path (where the symlink will be created).
    pub target: PathBuf,
}

impl SymlinkResource {
    /// Create a new symlink resource.
    #[must_use]
    pub const fn new(source: PathBuf, target: PathBuf) -> Self {
        Self { source, target }
    }
}

impl Resource for SymlinkResource {
    fn description(&self) -> String {
        format!("{} -> {}", self.target.display(), self.source.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        if !self.source.exists() {
            return Ok(ResourceState::Invalid {
                reason: format!("source does not exist: {}", self.source.display()),
            });
        }

        let meta = match std::fs::symlink_metadata(&self.target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ResourceState::Missing);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("stat {}", self.target.display()));
            }
        };

        if meta.is_dir() {
            return Ok(ResourceState::Invalid {
                reason: "target is a real directory".to_string(),
            });
        }
        if !meta.is_symlink() {
            return Ok(ResourceState::Incorrect {
                current: "target is a regular file".to_string(),
            });
        }

        let existing = std::fs::read_link(&self.target)
            .with_context(|| format!("read link {}", self.target.display()))?;
        if existing == self.source {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: format!("points to {}", existing.display()),
            })
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        ensure_parent_dir(&self.target)?;

        // A regular file in the way is kept as a backup before linking.
        if self
            .target
            .symlink_metadata()
            .is_ok_and(|m| m.file_type().is_file())
        {
            backup_existing(&self.target)?;
        }
        remove_existing(&self.target)?;

        create_symlink(&self.source, &self.target)?;
        Ok(ResourceChange::Applied)
    }
}

/// Create a symlink at `link` pointing to `target`.
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "creating symlink {} -> {}",
            link.display(),
            target.display()
        )
    })
}
