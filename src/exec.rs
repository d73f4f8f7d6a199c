//! External command execution behind an injectable [`Executor`] trait.
use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output};

use crate::error::StepError;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the command exited zero.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over process execution.
///
/// Every external command a probe or apply issues goes through this trait so
/// that steps can be unit-tested without touching the system.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and fail if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command in `dir` and fail if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command, returning its result even when it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Whether `program` is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// Production [`Executor`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

/// Execute a command and return the result, bailing on non-zero exit.
///
/// Output mentioning a permission problem is surfaced as
/// [`StepError::PermissionDenied`] so the executor can classify it.
fn execute_checked(mut cmd: Command, label: &str) -> Result<ExecResult> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to execute: {label}"))?;
    let result = ExecResult::from(output);
    if !result.success {
        let stderr = result.stderr.trim();
        if looks_like_permission_error(stderr) {
            return Err(StepError::PermissionDenied(format!("{label}: {stderr}")).into());
        }
        return Err(StepError::ExecutionFailed {
            command: label.to_string(),
            reason: format!("exit {}: {stderr}", result.code.unwrap_or(-1)),
        }
        .into());
    }
    Ok(result)
}

/// Heuristic match for permission failures reported on stderr.
fn looks_like_permission_error(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("permission denied")
        || lower.contains("are you root")
        || lower.contains("operation not permitted")
}

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        execute_checked(cmd, program)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        execute_checked(cmd, &format!("{program} in {}", dir.display()))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
