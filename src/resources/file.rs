//! Whole-file content resource, written atomically.
use anyhow::Result;
use std::path::PathBuf;

use super::helpers::fs::{read_optional, write_atomic};
use super::{Resource, ResourceChange, ResourceState};

/// A file whose entire content is owned by the provisioner.
#[derive(Debug, Clone)]
pub struct FileResource {
    /// Destination path.
    pub path: PathBuf,
    /// Exact desired content.
    pub contents: String,
}

impl FileResource {
    /// Create a new file resource.
    #[must_use]
    pub const fn new(path: PathBuf, contents: String) -> Self {
        Self { path, contents }
    }
}

impl Resource for FileResource {
    fn description(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        if self.path.is_dir() {
            return Ok(ResourceState::Invalid {
                reason: format!("{} is a directory", self.path.display()),
            });
        }
        Ok(match read_optional(&self.path)? {
            None => ResourceState::Missing,
            Some(current) if current == self.contents => ResourceState::Correct,
            Some(current) => ResourceState::Incorrect {
                current: format!("{} bytes differ", current.len()),
            },
        })
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.current_state()? == ResourceState::Correct {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        write_atomic(&self.path, &self.contents)?;
        Ok(ResourceChange::Applied)
    }
}
