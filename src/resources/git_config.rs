//! Global git configuration entry resource.
use anyhow::Result;

use super::{Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// A `git config --global` entry that can be checked and applied.
#[derive(Debug)]
pub struct GitConfigResource<'a> {
    /// Config key (e.g., "user.email").
    pub key: String,
    /// Desired value.
    pub desired_value: String,
    executor: &'a dyn Executor,
}

impl<'a> GitConfigResource<'a> {
    /// Create a new git config resource.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        desired_value: impl Into<String>,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            key: key.into(),
            desired_value: desired_value.into(),
            executor,
        }
    }
}

/// Read a global git config value, `None` when unset.
///
/// # Errors
///
/// Returns an error if `git` cannot be spawned.
pub fn read_global(executor: &dyn Executor, key: &str) -> Result<Option<String>> {
    let result = executor.run_unchecked("git", &["config", "--global", "--get", key])?;
    let value = result.stdout.trim();
    if result.success && !value.is_empty() {
        Ok(Some(value.to_string()))
    } else {
        Ok(None)
    }
}

impl Resource for GitConfigResource<'_> {
    fn description(&self) -> String {
        format!("{} = {}", self.key, self.desired_value)
    }

    fn current_state(&self) -> Result<ResourceState> {
        match read_global(self.executor, &self.key)? {
            None => Ok(ResourceState::Missing),
            Some(current) if current == self.desired_value => Ok(ResourceState::Correct),
            Some(current) => Ok(ResourceState::Incorrect { current }),
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        self.executor.run(
            "git",
            &["config", "--global", &self.key, &self.desired_value],
        )?;
        Ok(ResourceChange::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::test_helpers::MockExecutor;

    #[test]
    fn description_format() {
        let executor = MockExecutor::default();
        let resource = GitConfigResource::new("user.email", "ada@example.com", &executor);
        assert_eq!(resource.description(), "user.email = ada@example.com");
    }

    #[test]
    fn current_state_correct_when_value_matches() {
        let executor = MockExecutor::ok("ada@example.com\n");
        let resource = GitConfigResource::new("user.email", "ada@example.com", &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
        assert_eq!(
            executor.calls(),
            vec!["git config --global --get user.email"]
        );
    }

    #[test]
    fn current_state_missing_when_command_fails() {
        let executor = MockExecutor::fail();
        let resource = GitConfigResource::new("user.email", "ada@example.com", &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
    }

    #[test]
    fn current_state_missing_when_output_empty() {
        let executor = MockExecutor::ok("");
        let resource = GitConfigResource::new("pull.rebase", "true", &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
    }

    #[test]
    fn current_state_incorrect_when_value_differs() {
        let executor = MockExecutor::ok("old@example.com\n");
        let resource = GitConfigResource::new("user.email", "ada@example.com", &executor);
        let state = resource.current_state().unwrap();
        assert!(
            matches!(state, ResourceState::Incorrect { ref current } if current == "old@example.com"),
            "expected Incorrect(old@example.com), got {state:?}"
        );
    }

    #[test]
    fn apply_sets_global_value() {
        let executor = MockExecutor::ok("");
        let resource = GitConfigResource::new("user.name", "Ada Lovelace", &executor);
        assert_eq!(resource.apply().unwrap(), ResourceChange::Applied);
        assert_eq!(
            executor.calls(),
            vec!["git config --global user.name Ada Lovelace"]
        );
    }
}
