//! Log file location, terminal width, ANSI stripping and timestamps.
use std::fs;
use std::path::PathBuf;

/// Overrides the directory log files are written to.
pub const LOG_DIR_ENV: &str = "PROVISION_LOG_DIR";

/// Remove CSI escape sequences (`ESC [ ... final`) and lone two-byte
/// escapes such as `ESC 7`.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.next_if_eq(&'[').is_some() {
            // Parameters and intermediates run until a final byte in `@`..=`~`.
            for inner in chars.by_ref() {
                if ('@'..='~').contains(&inner) {
                    break;
                }
            }
        } else {
            chars.next();
        }
    }
    out
}

/// Return the terminal width in columns.
///
/// Queries the attached terminal first, then `COLUMNS`, and falls back
/// to 80.
#[must_use]
pub fn terminal_columns() -> usize {
    if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size()
        && w > 0
    {
        return usize::from(w);
    }
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(80)
}

/// Directory holding log files, created on demand.
///
/// `PROVISION_LOG_DIR` wins; otherwise `$XDG_CACHE_HOME/provision` or
/// `~/.cache/provision`.
pub(super) fn log_dir() -> Option<PathBuf> {
    let cache_dir = || {
        std::env::var_os("XDG_CACHE_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))
            .map(|cache| cache.join("provision"))
    };
    let dir = std::env::var_os(LOG_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(cache_dir)?;
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Log file for `command`, e.g. `~/.cache/provision/run.log`.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    Some(log_dir()?.join(format!("{command}.log")))
}

/// Where the previous run's log is kept.
pub(super) fn previous_log_path(current: &std::path::Path) -> PathBuf {
    let mut name = current.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

/// Current UTC time for the file header.
pub(super) fn header_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Current UTC time for a log line.
pub(super) fn line_timestamp() -> String {
    chrono::Utc::now().format("%H:%M:%S%.3f").to_string()
}
