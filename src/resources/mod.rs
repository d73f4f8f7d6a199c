//! Things on the machine that can be inspected and converged: packages,
//! archives, files, links, git settings and keys.
//!
//! `current_state` never changes anything, so probes and dry runs can call
//! it freely.  `apply` moves the resource to its desired state and is only
//! reached through [`converge`](crate::steps::converge), which refuses
//! resources in an [`Invalid`](ResourceState::Invalid) state.
pub mod file;
pub mod file_block;
pub mod git_config;
pub mod git_repo;
pub mod helpers;
pub mod keypair;
pub mod package;
pub mod script;
pub mod ssh_config;
pub mod symlink;
pub mod toolchain;

use std::fmt;

use anyhow::Result;

/// Observed state of a resource relative to what the manifest asks for.
///
/// # Examples
///
/// ```
/// use workstation_provision::resources::ResourceState;
///
/// let stale = ResourceState::Incorrect { current: "1.21.0".into() };
/// assert!(stale.needs_change());
/// assert_eq!(stale.to_string(), "incorrect (1.21.0)");
/// assert!(!ResourceState::Correct.needs_change());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Not present at all.
    Missing,
    /// Present and matching.
    Correct,
    /// Present with a different value.
    Incorrect {
        /// What is there now, e.g. the installed version.
        current: String,
    },
    /// Cannot be converged without help, e.g. a link source is missing.
    Invalid {
        /// Shown as the step's failure detail.
        reason: String,
    },
}

impl ResourceState {
    /// Whether `apply` would change something.
    #[must_use]
    pub const fn needs_change(&self) -> bool {
        matches!(self, Self::Missing | Self::Incorrect { .. })
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Correct => f.write_str("correct"),
            Self::Incorrect { current } => write!(f, "incorrect ({current})"),
            Self::Invalid { reason } => write!(f, "invalid ({reason})"),
        }
    }
}

/// What `apply` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// Created or updated.
    Applied,
    /// Found already correct; nothing written.
    AlreadyCorrect,
}

/// A checkable, convergeable piece of machine state.
pub trait Resource {
    /// Short description used as the step's change detail.
    fn description(&self) -> String;

    /// Inspect the resource.  Must not mutate anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined, e.g. a file
    /// exists but is unreadable.
    fn current_state(&self) -> Result<ResourceState>;

    /// Converge the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be made.
    fn apply(&self) -> Result<ResourceChange>;

    /// Shorthand for `current_state()?.needs_change()`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`current_state`](Self::current_state).
    fn needs_change(&self) -> Result<bool> {
        Ok(self.current_state()?.needs_change())
    }
}
