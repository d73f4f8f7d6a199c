//! Downloads through `curl` and SHA-256 verification.
use anyhow::{Context as _, Result};
use std::path::Path;

use crate::error::StepError;
use crate::exec::Executor;

/// Connection timeout for downloads in seconds.
const CONNECT_TIMEOUT: u64 = 10;

/// Maximum total transfer time in seconds.
const TRANSFER_TIMEOUT: u64 = 600;

/// Download `url` to `dest` with bounded timeouts.
///
/// A `curl` failure is reported as [`StepError::NetworkUnavailable`] so the
/// step outcome is classified as a network problem.
///
/// # Errors
///
/// Returns an error if `curl` is missing, cannot be spawned, or fails.
pub fn download(executor: &dyn Executor, url: &str, dest: &Path) -> Result<()> {
    let dest_str = dest
        .to_str()
        .with_context(|| format!("non UTF-8 path: {}", dest.display()))?;
    if !executor.which("curl") {
        anyhow::bail!("curl is required to download {url}");
    }
    let connect_timeout = CONNECT_TIMEOUT.to_string();
    let transfer_timeout = TRANSFER_TIMEOUT.to_string();
    let result = executor.run_unchecked(
        "curl",
        &[
            "-fsSL",
            "--connect-timeout",
            &connect_timeout,
            "--max-time",
            &transfer_timeout,
            "-o",
            dest_str,
            url,
        ],
    )?;
    if !result.success {
        return Err(StepError::NetworkUnavailable(format!(
            "download {url}: {}",
            result.stderr.trim()
        ))
        .into());
    }
    Ok(())
}

/// Compute the lowercase hex SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let bytes =
        std::fs::read(path).with_context(|| format!("reading {} for checksum", path.display()))?;
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(64);
    for b in &digest {
        // write! to a String is infallible; unwrap_or(()) makes that explicit.
        write!(hex, "{b:02x}").unwrap_or(());
    }
    Ok(hex)
}

/// Check `path` against an expected SHA-256 digest.
///
/// # Errors
///
/// Returns [`StepError::VerificationFailed`] on mismatch.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = compute_sha256(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(StepError::VerificationFailed {
            subject: format!("sha256 of {}", path.display()),
            expected: expected.trim().to_lowercase(),
            found: actual,
        }
        .into());
    }
    Ok(())
}
