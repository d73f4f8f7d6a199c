//! Declarative provisioning steps: a probe that checks and an apply that
//! converges, wired to the [`resources`](crate::resources) layer.
pub mod credentials;
pub mod files;
pub mod git;
pub mod installs;
pub mod links;
pub mod registry;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::exec::Executor;
use crate::logging::Log;
use crate::model::{EnvironmentModel, ModelDelta};
use crate::resolver::VersionResolver;
use crate::resources::{Resource, ResourceChange, ResourceState};

/// Shared services handed to every probe and apply.
pub struct Context {
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Logger for step progress.
    pub log: Arc<dyn Log>,
    /// Version lookups, memoised for the run.
    pub resolver: Arc<VersionResolver>,
    /// User's home directory path.
    pub home: PathBuf,
    /// Whether to perform a dry run (probe only).
    pub dry_run: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("executor", &"<dyn Executor>")
            .field("log", &"<dyn Log>")
            .field("resolver", &self.resolver)
            .field("home", &self.home)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// What a successful apply produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Facts to merge into the model.
    pub delta: ModelDelta,
    /// One-line summary of the change.
    pub detail: String,
    /// Non-fatal warnings, e.g. a version fallback.
    pub warnings: Vec<String>,
    /// The step could only describe what a human must do.
    pub manual: bool,
}

impl Applied {
    /// A change that was carried out.
    #[must_use]
    pub fn changed(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Self::default()
        }
    }

    /// An action the user has to complete.
    #[must_use]
    pub fn manual(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            manual: true,
            ..Self::default()
        }
    }

    /// Attach model facts.
    #[must_use]
    pub fn with_delta(mut self, delta: ModelDelta) -> Self {
        self.delta = delta;
        self
    }

    /// Attach warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// One provisioning unit.
///
/// `probe` and `observe` must not mutate anything; the engine calls `apply`
/// only when `probe` returned `false`.
pub trait Step: Send + Sync {
    /// Unique id, `<kind>:<name>`.
    fn id(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> String;

    /// Ids of steps that must run first.
    fn depends_on(&self) -> &[String];

    /// Whether the desired state already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn probe(&self, ctx: &Context, model: &EnvironmentModel) -> Result<bool>;

    /// Facts a satisfied step contributes to the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the facts cannot be read.
    fn observe(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<ModelDelta> {
        Ok(ModelDelta::new())
    }

    /// Warnings raised while probing, e.g. a version lookup that fell back.
    ///
    /// Reported on outcomes where `apply` did not run.
    fn probe_warnings(&self, _ctx: &Context) -> Vec<String> {
        Vec::new()
    }

    /// Converge to the desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be made or verified.
    fn apply(&self, ctx: &Context, model: &EnvironmentModel) -> Result<Applied>;

    /// How to undo the step by hand.
    fn rollback_hint(&self) -> Option<String> {
        None
    }
}

/// Id and dependency list shared by every step type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHeader {
    /// Step id.
    pub id: String,
    /// Dependencies, explicit first.
    pub depends_on: Vec<String>,
}

impl StepHeader {
    /// Create a header; duplicate dependencies are dropped.
    #[must_use]
    pub fn new(id: String, depends_on: Vec<String>) -> Self {
        let mut header = Self {
            id,
            depends_on: Vec::new(),
        };
        for dep in depends_on {
            header.add_dependency(dep);
        }
        header
    }

    /// Add a dependency unless it is already listed or names the step itself.
    pub fn add_dependency(&mut self, dep: String) {
        if dep != self.id && !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
    }
}

/// Whether a resource is already in its desired state.
///
/// An [`Invalid`](ResourceState::Invalid) resource is unsatisfied; its apply
/// reports the reason.
///
/// # Errors
///
/// Propagates errors from [`Resource::current_state`].
pub fn resource_satisfied(resource: &dyn Resource) -> Result<bool> {
    Ok(resource.current_state()? == ResourceState::Correct)
}

/// Apply a resource, refusing to touch one in an invalid state.
///
/// # Errors
///
/// Returns the invalid reason, or any error from [`Resource::apply`].
pub fn converge(resource: &dyn Resource) -> Result<Applied> {
    let before = resource.current_state()?;
    if let ResourceState::Invalid { reason } = before {
        anyhow::bail!(reason);
    }
    let detail = match (resource.apply()?, before) {
        (ResourceChange::AlreadyCorrect, _) => {
            format!("{} (already correct)", resource.description())
        }
        (ResourceChange::Applied, ResourceState::Incorrect { current }) => {
            format!("{} (was: {current})", resource.description())
        }
        (ResourceChange::Applied, _) => resource.description(),
    };
    Ok(Applied::changed(detail))
}
