//! Git/SSH identity: flags and environment, then the manifest, then a
//! one-time prompt.
use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::model::ModelDelta;

/// Model key for the identity name.
pub const NAME_KEY: &str = "identity.name";

/// Model key for the identity email.
pub const EMAIL_KEY: &str = "identity.email";

/// `[identity]` manifest section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Full name for commits.
    pub name: Option<String>,
    /// Email for commits and the SSH key comment.
    pub email: Option<String>,
}

/// Resolved identity fields; absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Full name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
}

/// Source of interactive answers.
pub trait Prompter {
    /// Ask `question` and return the trimmed answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be read.
    fn input(&self, question: &str) -> Result<String>;
}

/// [`Prompter`] reading from the terminal through `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&self, question: &str) -> Result<String> {
        let answer: String = dialoguer::Input::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()
            .with_context(|| format!("reading answer for '{question}'"))?;
        Ok(answer.trim().to_string())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Identity {
    /// Combine command-line values (which already include environment
    /// variables) with the manifest; the command line wins.
    #[must_use]
    pub fn resolve(cli_name: Option<&str>, cli_email: Option<&str>, manifest: &IdentityConfig) -> Self {
        Self {
            name: non_empty(cli_name).or_else(|| non_empty(manifest.name.as_deref())),
            email: non_empty(cli_email).or_else(|| non_empty(manifest.email.as_deref())),
        }
    }

    /// Names of the fields still missing.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.email.is_none() {
            missing.push("email");
        }
        missing
    }

    /// Ask once for each missing field.  Empty answers leave the field
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompter fails.
    pub fn prompt_missing(&mut self, prompter: &dyn Prompter) -> Result<()> {
        if self.name.is_none() {
            self.name = non_empty(Some(&prompter.input("Your full name (for git commits)")?));
        }
        if self.email.is_none() {
            self.email = non_empty(Some(&prompter.input("Your email (for git and SSH)")?));
        }
        Ok(())
    }

    /// Model facts for the known fields.
    #[must_use]
    pub fn to_delta(&self) -> ModelDelta {
        let mut delta = ModelDelta::new();
        if let Some(name) = &self.name {
            delta.push(NAME_KEY, name.clone());
        }
        if let Some(email) = &self.email {
            delta.push(EMAIL_KEY, email.clone());
        }
        delta
    }
}
