//! Latest-or-pinned version resolution for external toolchains.
//!
//! Latest versions are fetched over HTTP with a short global timeout.  When
//! the endpoint is unreachable, slow, or returns something unusable, the
//! resolver falls back to a configured default and reports a warning rather
//! than failing the step.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::error::{ConfigError, StepError};

/// Default timeout for a version lookup.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("provision/", env!("CARGO_PKG_VERSION"));

/// Transport-level failure of a version lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the timeout.
    #[error("timed out")]
    Timeout,
    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// DNS, TLS, connection or body errors.
    #[error("{0}")]
    Transport(String),
}

/// Minimal HTTP GET abstraction so lookups can be simulated in tests.
#[cfg_attr(test, mockall::automock)]
pub trait HttpFetch: Send + Sync {
    /// Fetch `url` and return the response body as text.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on timeout, non-success status, or transport failure.
    fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// [`HttpFetch`] backed by a `ureq` agent with a global timeout.
#[derive(Debug)]
pub struct UreqFetch {
    agent: ureq::Agent,
}

impl UreqFetch {
    /// Create a fetcher whose requests fail after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqFetch {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => Self::Timeout,
            ureq::Error::StatusCode(code) => Self::Status(code),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl HttpFetch for UreqFetch {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()?;
        response
            .body_mut()
            .read_to_string()
            .map_err(FetchError::from)
    }
}

/// Where and how to look up the latest version of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSource {
    /// Endpoint returning either plain text or a JSON object.
    pub url: String,
    /// Prefix stripped from the fetched value (`go` for `go1.22.1`, `v` for tags).
    pub strip_prefix: Option<String>,
    /// Version used when the lookup fails.
    pub fallback: Option<String>,
}

/// A resolved version plus any warning produced on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The version to install.
    pub version: String,
    /// Set when the fallback version was used.
    pub warning: Option<String>,
}

/// Resolves latest-or-pinned versions, memoising lookups for one run.
pub struct VersionResolver {
    fetch: Box<dyn HttpFetch>,
    cache: Mutex<HashMap<VersionSource, Resolution>>,
}

impl std::fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionResolver")
            .field("fetch", &"<dyn HttpFetch>")
            .field("cache", &self.cache)
            .finish()
    }
}

impl VersionResolver {
    /// Create a resolver over the given transport.
    #[must_use]
    pub fn new(fetch: Box<dyn HttpFetch>) -> Self {
        Self {
            fetch,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the latest version published at `source.url`.
    ///
    /// The result, fallback or not, is cached per source so probe and apply
    /// of the same step agree on the version within a run.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::NetworkUnavailable`] only when the lookup fails
    /// and no fallback version is configured.
    pub fn resolve_latest(&self, source: &VersionSource) -> Result<Resolution, StepError> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(source)
        {
            return Ok(hit.clone());
        }

        let resolution = match self.lookup(source) {
            Ok(version) => Resolution {
                version,
                warning: None,
            },
            Err(reason) => {
                let Some(fallback) = source.fallback.clone() else {
                    return Err(StepError::NetworkUnavailable(format!(
                        "{}: {reason}",
                        source.url
                    )));
                };
                Resolution {
                    warning: Some(format!(
                        "could not resolve latest version from {} ({reason}); using {fallback}",
                        source.url
                    )),
                    version: fallback,
                }
            }
        };

        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(source.clone(), resolution.clone());
        Ok(resolution)
    }

    /// Validate a pinned version string and return it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `version` is not a plausible
    /// version string.
    pub fn resolve_pinned(&self, version: &str) -> Result<String, ConfigError> {
        validate_version(version).map_err(|message| ConfigError::InvalidValue {
            field: "version".to_string(),
            message,
        })?;
        Ok(version.to_string())
    }

    fn lookup(&self, source: &VersionSource) -> Result<String, String> {
        let body = self.fetch.get(&source.url).map_err(|e| e.to_string())?;
        let raw = extract_version(&body).ok_or_else(|| "empty response".to_string())?;
        let version = source
            .strip_prefix
            .as_deref()
            .and_then(|p| raw.strip_prefix(p))
            .unwrap_or(&raw)
            .to_string();
        validate_version(&version)?;
        Ok(version)
    }
}

/// Pull a version token out of a response body.
///
/// JSON bodies are searched for `tag_name` then `version`; anything else
/// uses the first whitespace-delimited token of the first non-empty line.
fn extract_version(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        return ["tag_name", "version"]
            .iter()
            .find_map(|k| value.get(k).and_then(serde_json::Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }
    trimmed
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.split_whitespace().next())
        .map(str::to_string)
}

/// Accept versions such as `1.22.1`, `20.11.0`, `1:2.43.0-1ubuntu1`.
///
/// # Errors
///
/// Returns a message describing why `version` was rejected.
pub fn validate_version(version: &str) -> Result<(), String> {
    if !version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(format!("'{version}' does not start with a digit"));
    }
    if let Some(bad) = version
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '~' | ':' | '-')))
    {
        return Err(format!("'{version}' contains invalid character '{bad}'"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn go_source(fallback: Option<&str>) -> VersionSource {
        VersionSource {
            url: "https://go.dev/VERSION?m=text".into(),
            strip_prefix: Some("go".into()),
            fallback: fallback.map(String::from),
        }
    }

    #[test]
    fn plain_text_body_is_parsed_and_prefix_stripped() {
        let mut fetch = MockHttpFetch::new();
        fetch
            .expect_get()
            .returning(|_| Ok("go1.22.1\ntime 2024-03-05T22:14:46Z\n".into()));
        let resolver = VersionResolver::new(Box::new(fetch));
        let res = resolver.resolve_latest(&go_source(Some("1.21.0"))).unwrap();
        assert_eq!(res.version, "1.22.1");
        assert!(res.warning.is_none());
    }

    #[test]
    fn json_tag_name_is_parsed() {
        let mut fetch = MockHttpFetch::new();
        fetch
            .expect_get()
            .returning(|_| Ok(r#"{"tag_name": "v0.39.7", "name": "release"}"#.into()));
        let resolver = VersionResolver::new(Box::new(fetch));
        let source = VersionSource {
            url: "https://api.github.com/repos/nvm-sh/nvm/releases/latest".into(),
            strip_prefix: Some("v".into()),
            fallback: None,
        };
        assert_eq!(resolver.resolve_latest(&source).unwrap().version, "0.39.7");
    }

    #[test]
    fn timeout_falls_back_with_warning() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_get().returning(|_| Err(FetchError::Timeout));
        let resolver = VersionResolver::new(Box::new(fetch));
        let res = resolver.resolve_latest(&go_source(Some("1.21.0"))).unwrap();
        assert_eq!(res.version, "1.21.0");
        let warning = res.warning.expect("fallback should warn");
        assert!(warning.contains("timed out"), "{warning}");
    }

    #[test]
    fn empty_body_falls_back() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_get().returning(|_| Ok("   \n".into()));
        let resolver = VersionResolver::new(Box::new(fetch));
        let res = resolver.resolve_latest(&go_source(Some("1.21.0"))).unwrap();
        assert_eq!(res.version, "1.21.0");
        assert!(res.warning.unwrap().contains("empty response"));
    }

    #[test]
    fn garbage_body_falls_back() {
        let mut fetch = MockHttpFetch::new();
        fetch
            .expect_get()
            .returning(|_| Ok("<html>rate limited</html>".into()));
        let resolver = VersionResolver::new(Box::new(fetch));
        let res = resolver.resolve_latest(&go_source(Some("1.21.0"))).unwrap();
        assert_eq!(res.version, "1.21.0");
    }

    #[test]
    fn no_fallback_is_network_unavailable() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_get().returning(|_| Err(FetchError::Status(503)));
        let resolver = VersionResolver::new(Box::new(fetch));
        let err = resolver.resolve_latest(&go_source(None)).unwrap_err();
        assert!(matches!(err, StepError::NetworkUnavailable(_)));
    }

    #[test]
    fn lookups_are_memoised_per_run() {
        let mut fetch = MockHttpFetch::new();
        fetch
            .expect_get()
            .times(1)
            .returning(|_| Ok("go1.22.1".into()));
        let resolver = VersionResolver::new(Box::new(fetch));
        let a = resolver.resolve_latest(&go_source(None)).unwrap();
        let b = resolver.resolve_latest(&go_source(None)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sources_sharing_a_url_resolve_separately() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_get().times(2).returning(|_| Err(FetchError::Timeout));
        let resolver = VersionResolver::new(Box::new(fetch));
        let a = resolver.resolve_latest(&go_source(Some("1.21.0"))).unwrap();
        let b = resolver.resolve_latest(&go_source(Some("1.22.1"))).unwrap();
        assert_eq!(a.version, "1.21.0");
        assert_eq!(b.version, "1.22.1");
    }

    #[test]
    fn pinned_versions_are_validated() {
        let resolver = VersionResolver::new(Box::new(MockHttpFetch::new()));
        assert_eq!(resolver.resolve_pinned("1.22.1").unwrap(), "1.22.1");
        assert_eq!(
            resolver.resolve_pinned("1:2.43.0-1ubuntu1").unwrap(),
            "1:2.43.0-1ubuntu1"
        );
        assert!(resolver.resolve_pinned("latest").is_err());
        assert!(resolver.resolve_pinned("1.2; rm -rf /").is_err());
        assert!(resolver.resolve_pinned("").is_err());
    }
}
