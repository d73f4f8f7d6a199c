//! The `tracing`-backed [`Log`] implementation.
use std::path::PathBuf;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::Log;
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// [`Log`] implementation that emits `tracing` events.
///
/// Stage and dry-run messages use dedicated targets so the console and file
/// formatters can style them; everything else uses the level alone.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a logger for `command`.
    ///
    /// Only remembers where the log file lives so it can be shown at the
    /// end of a run; [`init_subscriber`](super::subscriber::init_subscriber)
    /// creates the file.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
        }
    }

    /// Path of this command's log file, if one could be placed.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// A step or the run failed.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Something degraded but the run continues, e.g. a version fallback.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Section header, one per step and one for the summary.
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Step detail shown under its header.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// File-only unless `--verbose`.
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// What a dry run would have changed.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);
}
