//! Vendor install script resource (`curl` + `sh`), guarded by a `creates` path.
use anyhow::{Context as _, Result};
use std::path::PathBuf;

use super::helpers::download::{download, verify_sha256};
use super::{Resource, ResourceChange, ResourceState};
use crate::error::StepError;
use crate::exec::Executor;

/// A remote install script that is run once.
#[derive(Debug)]
pub struct ScriptResource<'a> {
    /// Script name, used in messages.
    pub name: String,
    /// Script URL.
    pub url: String,
    /// Path the script is known to create; its presence means "installed".
    pub creates: PathBuf,
    /// Arguments passed to the script.
    pub args: Vec<String>,
    /// Environment assignments (`KEY=value`) for the script.
    pub env: Vec<(String, String)>,
    /// Expected script digest, if pinned.
    pub sha256: Option<String>,
    executor: &'a dyn Executor,
}

impl<'a> ScriptResource<'a> {
    /// Create a script resource with no arguments or environment.
    #[must_use]
    pub const fn new(
        name: String,
        url: String,
        creates: PathBuf,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            name,
            url,
            creates,
            args: Vec::new(),
            env: Vec::new(),
            sha256: None,
            executor,
        }
    }

    /// Set script arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set environment assignments.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Require the script to match `sha256`.
    #[must_use]
    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }
}

impl Resource for ScriptResource<'_> {
    fn description(&self) -> String {
        format!("install script {} ({})", self.name, self.url)
    }

    fn current_state(&self) -> Result<ResourceState> {
        if self.creates.exists() {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Missing)
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.creates.exists() {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        let workdir = tempfile::tempdir().context("create script download dir")?;
        let script = workdir.path().join(format!("{}.sh", self.name));
        download(self.executor, &self.url, &script)?;
        if let Some(expected) = &self.sha256 {
            verify_sha256(&script, expected)?;
        }

        let script_str = script
            .to_str()
            .with_context(|| format!("non UTF-8 path: {}", script.display()))?;
        let assignments: Vec<String> = self.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut argv: Vec<&str> = assignments.iter().map(String::as_str).collect();
        argv.extend(["sh", script_str]);
        argv.extend(self.args.iter().map(String::as_str));
        self.executor.run_in(workdir.path(), "env", &argv)?;

        if !self.creates.exists() {
            return Err(StepError::VerificationFailed {
                subject: format!("script {}", self.name),
                expected: format!("{} to exist", self.creates.display()),
                found: "missing".to_string(),
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

    const OMZ: &str = "https://raw.githubusercontent.com/ohmyzsh/ohmyzsh/master/tools/install.sh";

    #[test]
    fn creates_path_decides_state() {
        let dir = tempfile::tempdir().unwrap();
        let executor = MockExecutor::default();
        let resource = ScriptResource::new(
            "oh-my-zsh".into(),
            OMZ.into(),
            dir.path().join(".oh-my-zsh"),
            &executor,
        );
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
        std::fs::create_dir(dir.path().join(".oh-my-zsh")).unwrap();
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
        assert_eq!(resource.apply().unwrap(), ResourceChange::AlreadyCorrect);
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn apply_downloads_and_runs_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let executor = MockExecutor::with_responses(vec![(true, String::new()); 2]).with_which(true);
        let resource = ScriptResource::new(
            "oh-my-zsh".into(),
            OMZ.into(),
            dir.path().join(".oh-my-zsh"),
            &executor,
        )
        .with_env(vec![("RUNZSH".into(), "no".into())])
        .with_args(vec!["--unattended".into()]);

        // The mock does not create the marker, so verification fails.
        let err = resource.apply().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::VerificationFailed { .. })
        ));
        let calls = executor.calls();
        assert!(calls[0].starts_with("curl "));
        assert!(calls[1].starts_with("env RUNZSH=no sh "));
        assert!(calls[1].ends_with("oh-my-zsh.sh --unattended"));
    }
}
