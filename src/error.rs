//! Domain-specific error types for the provisioning engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`ConfigError`], [`GraphError`])
//! while step bodies and command handlers work with [`anyhow::Error`] and
//! convert via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ProvisionError
//! ├── Config(ConfigError)  : manifest loading and validation
//! ├── Graph(GraphError)    : step registry and dependency ordering
//! ├── Step(StepError)      : failures raised while applying one step
//! └── Render(RenderError)  : template rendering
//! ```
//!
//! [`FailureKind`] is the flat classification recorded on a failed
//! [`Outcome`](crate::outcome::Outcome); [`FailureKind::classify`] derives it
//! from an error chain.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Manifest or command-line configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Step registry or dependency graph error.
    #[error("Step graph error: {0}")]
    Graph(#[from] GraphError),

    /// Step execution error.
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// Template rendering error.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Errors that arise from loading and validating the manifest.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The manifest file does not exist.
    #[error("Manifest not found: {0}")]
    NotFound(String),

    /// The manifest could not be parsed.
    #[error("Invalid manifest {file}: {message}")]
    InvalidSyntax {
        /// Path of the manifest.
        file: String,
        /// Parser message.
        message: String,
    },

    /// Two entries declare the same step id with different contents.
    #[error("Conflicting definitions for step '{0}'")]
    ConflictingStep(String),

    /// A field holds a value the engine cannot use.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Why the value was rejected.
        message: String,
    },

    /// `--only` named a step that is not in the registry.
    #[error("Unknown step '{0}' in --only selection")]
    UnknownSelection(String),

    /// An I/O error occurred while reading a configuration input.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors detected while ordering steps, before any step executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected: {}", .0.join(" → "))]
    CycleDetected(Vec<String>),

    /// A step depends on an id that no step declares.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// Step declaring the dependency.
        step: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// Two steps share the same id.
    #[error("Duplicate step id '{0}'")]
    DuplicateStep(String),
}

/// Errors raised by step bodies that the executor classifies explicitly.
#[derive(Error, Debug)]
pub enum StepError {
    /// A network fetch failed and no fallback was available.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The operation was refused by the operating system.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A post-apply check did not confirm the expected state.
    #[error("Verification failed for {subject}: expected {expected}, found {found}")]
    VerificationFailed {
        /// What was being verified (package, binary, checksum).
        subject: String,
        /// Expected value.
        expected: String,
        /// Observed value.
        found: String,
    },

    /// An external command failed.
    #[error("{command} failed: {reason}")]
    ExecutionFailed {
        /// Command label.
        command: String,
        /// Human-readable reason.
        reason: String,
    },
}

/// Errors raised by the template renderer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A required key is absent from the environment model.
    #[error("Template '{template}' requires missing key '{key}'")]
    MissingKey {
        /// Template name.
        template: String,
        /// The absent key.
        key: String,
    },
}

/// Classification of a failed step, recorded on its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network fetch failed without fallback.
    NetworkUnavailable,
    /// Operating system refused the operation.
    PermissionDenied,
    /// Dependency graph contains a cycle.
    CycleDetected,
    /// Template key absent from the model.
    MissingKey,
    /// Post-apply verification mismatch.
    VerificationFailed,
    /// A dependency of this step failed.
    Blocked,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Classify an error by walking its cause chain.
    #[must_use]
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(step) = cause.downcast_ref::<StepError>() {
                return match step {
                    StepError::NetworkUnavailable(_) => Self::NetworkUnavailable,
                    StepError::PermissionDenied(_) => Self::PermissionDenied,
                    StepError::VerificationFailed { .. } => Self::VerificationFailed,
                    StepError::ExecutionFailed { .. } => Self::Other,
                };
            }
            if cause.downcast_ref::<RenderError>().is_some() {
                return Self::MissingKey;
            }
            if cause.downcast_ref::<GraphError>().is_some() {
                return Self::CycleDetected;
            }
            if let Some(io) = cause.downcast_ref::<std::io::Error>()
                && io.kind() == std::io::ErrorKind::PermissionDenied
            {
                return Self::PermissionDenied;
            }
        }
        Self::Other
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NetworkUnavailable => "network unavailable",
            Self::PermissionDenied => "permission denied",
            Self::CycleDetected => "cycle detected",
            Self::MissingKey => "missing key",
            Self::VerificationFailed => "verification failed",
            Self::Blocked => "blocked",
            Self::Other => "error",
        };
        f.write_str(s)
    }
}
