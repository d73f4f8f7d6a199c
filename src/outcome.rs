//! Recorded results of attempting a step.
use std::fmt;

use serde::Serialize;

use crate::error::FailureKind;

/// Final status of one step in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The probe reported the desired state already holds.
    Skipped,
    /// The step was applied and changed the system.
    Applied,
    /// Probe or apply failed, or a dependency failed.
    Failed,
    /// The step needs an action only a human can confirm.
    RequiresManualStep,
    /// Dry run: the step would have been applied.
    DryRun,
}

impl Status {
    /// Whether the status should be surfaced prominently in the report.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::Failed | Self::RequiresManualStep)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Skipped => "skipped",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::RequiresManualStep => "manual",
            Self::DryRun => "dry-run",
        };
        f.write_str(s)
    }
}

/// The immutable record of one step's attempt.
///
/// Fields are private; an outcome is built once by the executor and only
/// read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    step_id: String,
    status: Status,
    detail: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback_hint: Option<String>,
}

impl Outcome {
    /// Start building an outcome for `step_id` with `status`.
    #[must_use]
    pub fn new(step_id: impl Into<String>, status: Status, detail: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            detail: detail.into(),
            duration_ms: 0,
            warnings: Vec::new(),
            failure_kind: None,
            rollback_hint: None,
        }
    }

    /// Attach the elapsed time.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Attach warnings collected while running the step.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Attach the failure classification.
    #[must_use]
    pub const fn with_failure_kind(mut self, kind: FailureKind) -> Self {
        self.failure_kind = Some(kind);
        self
    }

    /// Attach the step's rollback hint.
    #[must_use]
    pub fn with_rollback_hint(mut self, hint: Option<String>) -> Self {
        self.rollback_hint = hint;
        self
    }

    /// Id of the step this outcome belongs to.
    #[must_use]
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    /// Recorded status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Human-readable detail (error chain, skip reason, or change summary).
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Wall-clock time spent probing and applying.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Non-fatal warnings, e.g. a version fallback.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Failure classification, for failed outcomes.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind
    }

    /// How to undo the step by hand, if the step declares one.
    #[must_use]
    pub fn rollback_hint(&self) -> Option<&str> {
        self.rollback_hint.as_deref()
    }
}
