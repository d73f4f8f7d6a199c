//! Debian package resource (`dpkg-query` / `apt-get`).
use anyhow::Result;

use super::{Resource, ResourceChange, ResourceState};
use crate::error::StepError;
use crate::exec::Executor;

/// Output format handed to `dpkg-query -W`.
const DPKG_FORMAT: &str = "-f=${Status} ${Version}";

/// An apt package, optionally pinned to an exact version.
#[derive(Debug)]
pub struct PackageResource<'a> {
    /// Package name.
    pub name: String,
    /// Exact version to install, `None` for whatever apt considers current.
    pub version: Option<String>,
    executor: &'a dyn Executor,
}

impl<'a> PackageResource<'a> {
    /// Create a new package resource.
    #[must_use]
    pub const fn new(name: String, version: Option<String>, executor: &'a dyn Executor) -> Self {
        Self {
            name,
            version,
            executor,
        }
    }

    /// Query the installed version, `None` when the package is not installed.
    ///
    /// # Errors
    ///
    /// Returns an error if `dpkg-query` cannot be spawned.
    pub fn installed_version(&self) -> Result<Option<String>> {
        let result = self
            .executor
            .run_unchecked("dpkg-query", &["-W", DPKG_FORMAT, &self.name])?;
        if !result.success {
            return Ok(None);
        }
        Ok(parse_dpkg_status(&result.stdout))
    }

    fn install_spec(&self) -> String {
        self.version
            .as_ref()
            .map_or_else(|| self.name.clone(), |v| format!("{}={v}", self.name))
    }
}

/// Parse `"<want> <error> <status> <version>"` as printed by `dpkg-query`.
///
/// Only a status of `installed` counts; half-configured or removed packages
/// with leftover config files are treated as absent.
fn parse_dpkg_status(stdout: &str) -> Option<String> {
    let mut parts = stdout.split_whitespace();
    let _want = parts.next()?;
    let _err = parts.next()?;
    let status = parts.next()?;
    if status != "installed" {
        return None;
    }
    parts.next().map(str::to_string)
}

impl Resource for PackageResource<'_> {
    fn description(&self) -> String {
        format!("apt package {}", self.install_spec())
    }

    fn current_state(&self) -> Result<ResourceState> {
        match (self.installed_version()?, &self.version) {
            (None, _) => Ok(ResourceState::Missing),
            (Some(_), None) => Ok(ResourceState::Correct),
            (Some(found), Some(want)) if &found == want => Ok(ResourceState::Correct),
            (Some(found), Some(_)) => Ok(ResourceState::Incorrect { current: found }),
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        let spec = self.install_spec();
        self.executor.run(
            "sudo",
            &[
                "DEBIAN_FRONTEND=noninteractive",
                "apt-get",
                "install",
                "-y",
                &spec,
            ],
        )?;

        let state = self.current_state()?;
        if state != ResourceState::Correct {
            let found = match state {
                ResourceState::Incorrect { current } => current,
                _ => "not installed".to_string(),
            };
            return Err(StepError::VerificationFailed {
                subject: format!("package {}", self.name),
                expected: self
                    .version
                    .clone()
                    .unwrap_or_else(|| "installed".to_string()),
                found,
            }
            .into());
        }
        Ok(ResourceChange::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::test_helpers::MockExecutor;

    #[test]
    fn parses_installed_status() {
        assert_eq!(
            parse_dpkg_status("install ok installed 1:2.43.0-1ubuntu7"),
            Some("1:2.43.0-1ubuntu7".to_string())
        );
    }

    #[test]
    fn config_files_only_is_not_installed() {
        assert_eq!(parse_dpkg_status("deinstall ok config-files 5.9-4"), None);
        assert_eq!(parse_dpkg_status(""), None);
    }

    #[test]
    fn description_includes_pin() {
        let executor = MockExecutor::default();
        let resource = PackageResource::new("zsh".into(), Some("5.9-4".into()), &executor);
        assert_eq!(resource.description(), "apt package zsh=5.9-4");
    }

    #[test]
    fn current_state_correct_when_installed() {
        let executor = MockExecutor::ok("install ok installed 2.43.0");
        let resource = PackageResource::new("git".into(), None, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
        assert_eq!(
            executor.calls(),
            vec!["dpkg-query -W -f=${Status} ${Version} git"]
        );
    }

    #[test]
    fn current_state_missing_when_query_fails() {
        let executor = MockExecutor::fail();
        let resource = PackageResource::new("git".into(), None, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
    }

    #[test]
    fn current_state_incorrect_on_version_mismatch() {
        let executor = MockExecutor::ok("install ok installed 5.8-1");
        let resource = PackageResource::new("zsh".into(), Some("5.9-4".into()), &executor);
        assert_eq!(
            resource.current_state().unwrap(),
            ResourceState::Incorrect {
                current: "5.8-1".into()
            }
        );
    }

    #[test]
    fn apply_installs_and_verifies() {
        let executor = MockExecutor::with_responses(vec![
            (true, String::new()),
            (true, "install ok installed 2.43.0".into()),
        ]);
        let resource = PackageResource::new("git".into(), None, &executor);
        assert_eq!(resource.apply().unwrap(), ResourceChange::Applied);
        let calls = executor.calls();
        assert_eq!(
            calls[0],
            "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y git"
        );
    }

    #[test]
    fn apply_reports_verification_failure() {
        let executor = MockExecutor::with_responses(vec![
            (true, String::new()),
            (true, "install ok installed 5.8-1".into()),
        ]);
        let resource = PackageResource::new("zsh".into(), Some("5.9-4".into()), &executor);
        let err = resource.apply().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::VerificationFailed { .. })
        ));
    }

    #[test]
    fn apply_propagates_install_failure() {
        let executor = MockExecutor::fail();
        let resource = PackageResource::new("git".into(), None, &executor);
        assert!(resource.apply().is_err());
    }
}
