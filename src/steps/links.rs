//! `link:<target>`: symlinks from the repository into the home directory.
use anyhow::Result;
use std::path::PathBuf;

use super::{Applied, Context, Step, StepHeader, converge, resource_satisfied};
use crate::model::EnvironmentModel;
use crate::resources::helpers::fs::list_backups;
use crate::resources::symlink::SymlinkResource;

/// A symlink placed at `target`, pointing to `source`.
#[derive(Debug, Clone)]
pub struct LinkStep {
    header: StepHeader,
    source: PathBuf,
    target: PathBuf,
}

impl LinkStep {
    /// Create a link step.
    #[must_use]
    pub const fn new(header: StepHeader, source: PathBuf, target: PathBuf) -> Self {
        Self {
            header,
            source,
            target,
        }
    }

    fn resource(&self) -> SymlinkResource {
        SymlinkResource::new(self.source.clone(), self.target.clone())
    }
}

impl Step for LinkStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!(
            "link {} -> {}",
            self.target.display(),
            self.source.display()
        )
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        resource_satisfied(&self.resource())
    }

    fn apply(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        converge(&self.resource())
    }

    fn rollback_hint(&self) -> Option<String> {
        let backup = list_backups(&self.target)
            .ok()
            .and_then(|found| found.into_iter().last());
        Some(backup.map_or_else(
            || format!("rm {}", self.target.display()),
            |b| format!("mv {} {}", b.display(), self.target.display()),
        ))
    }
}
