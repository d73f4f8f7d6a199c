//! SSH keypair resource.  An existing private key is never overwritten.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::helpers::fs::write_atomic_with_mode;
use super::ssh_config::create_private_dir;
use super::{Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// Paths and content of a provisioned keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRef {
    /// Private key path.
    pub private_key: PathBuf,
    /// Public key path (`<private>.pub`).
    pub public_key: PathBuf,
    /// Public key line, e.g. `ssh-ed25519 AAAA… ada@example.com`.
    pub public_key_text: String,
}

/// Public key path for a private key path.
#[must_use]
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut name = private_key.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

/// Read an existing keypair, `None` unless both halves are present.
///
/// # Errors
///
/// Returns an error if the public key exists but cannot be read.
pub fn read_key_ref(private_key: &Path) -> Result<Option<KeyRef>> {
    let public_key = public_key_path(private_key);
    if !private_key.is_file() || !public_key.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&public_key)
        .with_context(|| format!("read {}", public_key.display()))?;
    Ok(Some(KeyRef {
        private_key: private_key.to_path_buf(),
        public_key,
        public_key_text: text.trim().to_string(),
    }))
}

/// An SSH keypair generated with `ssh-keygen` when absent.
#[derive(Debug)]
pub struct KeypairResource<'a> {
    /// Private key path.
    pub path: PathBuf,
    /// Key comment, usually the identity email.
    pub comment: String,
    /// `ssh-keygen -t` value.
    pub key_type: String,
    /// Passphrase for a new key; empty for none.
    pub passphrase: String,
    executor: &'a dyn Executor,
}

impl<'a> KeypairResource<'a> {
    /// Create a keypair resource with an `ed25519` type and no passphrase.
    #[must_use]
    pub fn new(path: PathBuf, comment: String, executor: &'a dyn Executor) -> Self {
        Self {
            path,
            comment,
            key_type: "ed25519".to_string(),
            passphrase: String::new(),
            executor,
        }
    }

    /// Override the key type.
    #[must_use]
    pub fn with_key_type(mut self, key_type: impl Into<String>) -> Self {
        self.key_type = key_type.into();
        self
    }

    /// Override the passphrase.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    /// Ensure the keypair exists and return a reference to it.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails or the result cannot be read.
    pub fn ensure(&self) -> Result<KeyRef> {
        if self.needs_change()? {
            self.apply()?;
        }
        read_key_ref(&self.path)?
            .with_context(|| format!("keypair {} missing after generation", self.path.display()))
    }

    fn path_str(&self) -> Result<&str> {
        self.path
            .to_str()
            .with_context(|| format!("non UTF-8 key path: {}", self.path.display()))
    }
}

impl Resource for KeypairResource<'_> {
    fn description(&self) -> String {
        format!("{} keypair {}", self.key_type, self.path.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        let public = public_key_path(&self.path);
        match (self.path.is_file(), public.is_file()) {
            (true, true) => Ok(ResourceState::Correct),
            (true, false) => Ok(ResourceState::Incorrect {
                current: "public key missing".to_string(),
            }),
            (false, true) => Ok(ResourceState::Invalid {
                reason: format!(
                    "{} exists without its private key; refusing to overwrite",
                    public.display()
                ),
            }),
            (false, false) => Ok(ResourceState::Missing),
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        match self.current_state()? {
            ResourceState::Correct => Ok(ResourceChange::AlreadyCorrect),
            ResourceState::Invalid { reason } => anyhow::bail!(reason),
            ResourceState::Incorrect { .. } => {
                // Re-derive the public half; the private key is left alone.
                let out = self.executor.run(
                    "ssh-keygen",
                    &["-y", "-P", &self.passphrase, "-f", self.path_str()?],
                )?;
                let text = format!("{} {}\n", out.stdout.trim(), self.comment);
                write_atomic_with_mode(&public_key_path(&self.path), &text, Some(0o644))?;
                Ok(ResourceChange::Applied)
            }
            ResourceState::Missing => {
                if let Some(dir) = self.path.parent()
                    && !dir.exists()
                {
                    create_private_dir(dir)?;
                }
                self.executor.run(
                    "ssh-keygen",
                    &[
                        "-q",
                        "-t",
                        &self.key_type,
                        "-C",
                        &self.comment,
                        "-N",
                        &self.passphrase,
                        "-f",
                        self.path_str()?,
                    ],
                )?;
                Ok(ResourceChange::Applied)
            }
        }
    }
}
