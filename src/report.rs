//! Final run summary: aggregation plus text and JSON renderings.
//!
//! [`summarize`] is pure; [`log_report`] sends the text form through the
//! logger and [`print_json`] writes the JSON form to stdout.
use std::io::Write as _;

use anyhow::{Context as _, Result};
use serde::Serialize;

use crate::error::FailureKind;
use crate::logging::Log;
use crate::outcome::{Outcome, Status};

/// Number of outcomes per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Already in the desired state.
    pub skipped: usize,
    /// Changed by this run.
    pub applied: usize,
    /// Failed or blocked.
    pub failed: usize,
    /// Waiting on a human.
    pub manual: usize,
    /// Would have been applied.
    pub dry_run: usize,
}

impl StatusCounts {
    fn record(&mut self, status: Status) {
        match status {
            Status::Skipped => self.skipped += 1,
            Status::Applied => self.applied += 1,
            Status::Failed => self.failed += 1,
            Status::RequiresManualStep => self.manual += 1,
            Status::DryRun => self.dry_run += 1,
        }
    }

    /// Total number of outcomes.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.skipped + self.applied + self.failed + self.manual + self.dry_run
    }
}

/// A failed or manual step surfaced at the end of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttentionItem {
    /// Step id.
    pub step_id: String,
    /// `failed` or `requires_manual_step`.
    pub status: Status,
    /// Error chain or the manual instruction.
    pub detail: String,
    /// Failure classification, for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// How to undo the step by hand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_hint: Option<String>,
}

/// A warning raised by one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepWarning {
    /// Step id.
    pub step_id: String,
    /// Warning text.
    pub message: String,
}

/// Aggregated view of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Outcomes per status.
    pub counts: StatusCounts,
    /// Sum of step durations.
    pub total_duration_ms: u64,
    /// Failed and manual steps, in execution order.
    pub attention: Vec<AttentionItem>,
    /// Warnings from every step, in execution order.
    pub warnings: Vec<StepWarning>,
    /// Every outcome, in execution order.
    pub steps: Vec<Outcome>,
    /// The run stopped early on Ctrl-C.
    pub interrupted: bool,
}

/// Aggregate `outcomes` into a [`Report`].
#[must_use]
pub fn summarize(outcomes: &[Outcome]) -> Report {
    let mut report = Report::default();
    for outcome in outcomes {
        report.counts.record(outcome.status());
        report.total_duration_ms = report
            .total_duration_ms
            .saturating_add(outcome.duration_ms());

        if outcome.status().needs_attention() {
            report.attention.push(AttentionItem {
                step_id: outcome.step_id().to_string(),
                status: outcome.status(),
                detail: outcome.detail().to_string(),
                failure_kind: outcome.failure_kind(),
                rollback_hint: outcome.rollback_hint().map(str::to_string),
            });
        }

        report
            .warnings
            .extend(outcome.warnings().iter().map(|message| StepWarning {
                step_id: outcome.step_id().to_string(),
                message: message.clone(),
            }));
    }
    report.steps = outcomes.to_vec();
    report
}

const fn icon(status: Status) -> &'static str {
    match status {
        Status::Applied => "✓",
        Status::Skipped => "○",
        Status::DryRun => "~",
        Status::RequiresManualStep => "!",
        Status::Failed => "✗",
    }
}

/// Cut `line` to `width` characters, marking the cut with `…`.
fn fit(line: String, width: usize) -> String {
    if width == 0 || line.chars().count() <= width {
        return line;
    }
    let mut cut: String = line.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Plain-text summary lines, each at most `width` characters.
#[must_use]
pub fn render_text(report: &Report, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for outcome in &report.steps {
        let line = if outcome.detail().is_empty() {
            format!("{} {}", icon(outcome.status()), outcome.step_id())
        } else {
            format!(
                "{} {} ({})",
                icon(outcome.status()),
                outcome.step_id(),
                outcome.detail()
            )
        };
        lines.push(fit(line, width));
    }

    let c = &report.counts;
    lines.push(format!(
        "{} steps: {} applied, {} skipped, {} failed, {} manual, {} dry-run in {}ms",
        c.total(),
        c.applied,
        c.skipped,
        c.failed,
        c.manual,
        c.dry_run,
        report.total_duration_ms
    ));
    if report.interrupted {
        lines.push("interrupted: remaining steps were not started".to_string());
    }

    for item in &report.attention {
        let label = match item.failure_kind {
            Some(kind) => format!("{} [{kind}]", item.status),
            None => item.status.to_string(),
        };
        lines.push(fit(format!("{} {label}: {}", item.step_id, item.detail), width));
        if let Some(hint) = &item.rollback_hint {
            lines.push(fit(format!("  rollback: {hint}"), width));
        }
    }

    for warning in &report.warnings {
        lines.push(fit(
            format!("warning {}: {}", warning.step_id, warning.message),
            width,
        ));
    }

    lines
}

/// Log the text rendering under a "Summary" stage.
pub fn log_report(report: &Report, log: &dyn Log, width: usize) {
    log.stage("Summary");
    for line in render_text(report, width) {
        log.info(&line);
    }
}

/// Serialize the report as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("serializing report")
}

/// Write the JSON rendering to stdout.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn print_json(report: &Report) -> Result<()> {
    let json = render_json(report)?;
    writeln!(std::io::stdout().lock(), "{json}").context("writing report")?;
    Ok(())
}
