//! Console and log-file output.
//!
//! Everything goes through [`Log`], implemented by [`Logger`] on top of
//! `tracing`.  The runner wraps each step in a [`STEP_SPAN`] span; the log
//! file uses it to attribute every line to its step.

mod logger;
mod subscriber;
mod types;
mod utils;

pub use logger::Logger;
pub use subscriber::{ConsoleOutput, STEP_SPAN, init_subscriber};
pub use types::Log;
pub use utils::{LOG_DIR_ENV, terminal_columns};

/// Serializes `PROVISION_LOG_DIR` changes across parallel test threads.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// A [`Logger`] whose file layer writes into a fresh temporary directory,
/// installed as the thread-local subscriber.
///
/// Keep the returned guard alive for the whole test.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn isolated_logger() -> (Logger, tempfile::TempDir, tracing::dispatcher::DefaultGuard) {
    use tracing_subscriber::{Layer as _, filter::LevelFilter, layer::SubscriberExt as _};
    let tmp = tempfile::tempdir().expect("create temp dir");
    let file_layer;
    let log;
    {
        let _env = TEST_ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // SAFETY: guarded by TEST_ENV_MUTEX and removed before it is released.
        #[allow(unsafe_code)]
        unsafe {
            std::env::set_var(LOG_DIR_ENV, tmp.path());
        }
        file_layer = subscriber::FileLayer::new("test").expect("open log file");
        log = Logger::new("test");
        // SAFETY: still inside the TEST_ENV_MUTEX guard.
        #[allow(unsafe_code)]
        unsafe {
            std::env::remove_var(LOG_DIR_ENV);
        }
    }
    let subscriber =
        tracing_subscriber::registry().with(file_layer.with_filter(LevelFilter::DEBUG));
    let guard = tracing::dispatcher::set_default(&tracing::Dispatch::new(subscriber));
    (log, tmp, guard)
}
