//! SSH credentials: the keypair, `Host` stanzas, and registering the public
//! key with a remote account.
use anyhow::Result;
use std::path::PathBuf;

use super::{Applied, Context, Step, StepHeader, converge, resource_satisfied};
use crate::config::identity::EMAIL_KEY;
use crate::model::{EnvironmentModel, ModelDelta};
use crate::resources::Resource as _;
use crate::resources::keypair::{KeyRef, KeypairResource, public_key_path, read_key_ref};
use crate::resources::ssh_config::SshHostResource;

/// Model key for the private key path.
pub const KEY_PATH_KEY: &str = "ssh.key_path";

/// Model key for the public key line.
pub const PUBLIC_KEY_KEY: &str = "ssh.public_key";

/// Model key for the public key path.
pub const PUBLIC_KEY_PATH_KEY: &str = "ssh.public_key_path";

/// `ConnectTimeout` for the authentication check, in seconds.
const AUTH_TIMEOUT_SECS: u32 = 5;

/// Phrases hosting services print after a successful `ssh -T`.
const AUTH_MARKERS: &[&str] = &[
    "successfully authenticated",
    "welcome to gitlab",
    "authenticated via ssh key",
];

/// `ssh:keypair`: generate a keypair once and publish its paths.
#[derive(Debug, Clone)]
pub struct KeypairStep {
    header: StepHeader,
    path: PathBuf,
    key_type: String,
    passphrase: String,
}

impl KeypairStep {
    /// Create the keypair step.
    #[must_use]
    pub const fn new(header: StepHeader, path: PathBuf, key_type: String, passphrase: String) -> Self {
        Self {
            header,
            path,
            key_type,
            passphrase,
        }
    }

    fn resource<'a>(&self, ctx: &'a Context, model: &EnvironmentModel) -> KeypairResource<'a> {
        let comment = model.get(EMAIL_KEY).unwrap_or("provision").to_string();
        KeypairResource::new(self.path.clone(), comment, ctx.executor.as_ref())
            .with_key_type(self.key_type.as_str())
            .with_passphrase(self.passphrase.as_str())
    }

    fn facts(&self, key: Option<KeyRef>) -> ModelDelta {
        let mut delta = ModelDelta::new().with(KEY_PATH_KEY, self.path.display().to_string());
        if let Some(key) = key {
            delta.push(PUBLIC_KEY_PATH_KEY, key.public_key.display().to_string());
            delta.push(PUBLIC_KEY_KEY, key.public_key_text);
        }
        delta
    }

    /// `ssh-keygen` takes the passphrase as an argument, where other local
    /// users can read it from the process list while the command runs.
    fn passphrase_warning(&self) -> Option<String> {
        (!self.passphrase.is_empty()).then(|| {
            format!(
                "passphrase for {} is passed to ssh-keygen on its command line",
                self.path.display()
            )
        })
    }
}

impl Step for KeypairStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("ensure {} keypair {}", self.key_type, self.path.display())
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, model: &EnvironmentModel) -> Result<bool> {
        resource_satisfied(&self.resource(ctx, model))
    }

    fn observe(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<ModelDelta> {
        Ok(self.facts(read_key_ref(&self.path)?))
    }

    fn apply(&self, ctx: &Context, model: &EnvironmentModel) -> Result<Applied> {
        let resource = self.resource(ctx, model);
        let warnings = if resource.needs_change()? {
            self.passphrase_warning().into_iter().collect()
        } else {
            Vec::new()
        };
        let applied = converge(&resource)?;
        let key = resource.ensure()?;
        Ok(applied
            .with_delta(self.facts(Some(key)))
            .with_warnings(warnings))
    }
}

/// `ssh-host:<alias>`: one `Host` stanza in the SSH client config.
#[derive(Debug, Clone)]
pub struct SshHostStep {
    header: StepHeader,
    config: PathBuf,
    alias: String,
    options: Vec<(String, String)>,
}

impl SshHostStep {
    /// Create a host stanza step.
    #[must_use]
    pub const fn new(
        header: StepHeader,
        config: PathBuf,
        alias: String,
        options: Vec<(String, String)>,
    ) -> Self {
        Self {
            header,
            config,
            alias,
            options,
        }
    }

    fn resource(&self) -> SshHostResource {
        SshHostResource::new(self.config.clone(), self.alias.clone(), self.options.clone())
    }
}

impl Step for SshHostStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("configure ssh Host {} in {}", self.alias, self.config.display())
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        resource_satisfied(&self.resource())
    }

    fn apply(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        converge(&self.resource())
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!(
            "remove the 'Host {}' stanza from {}",
            self.alias,
            self.config.display()
        ))
    }
}

/// `ssh-register:<alias>`: the public key is known to the remote account.
///
/// Registration itself is manual; the probe only confirms it with a
/// non-interactive `ssh -T`.
#[derive(Debug, Clone)]
pub struct SshRegisterStep {
    header: StepHeader,
    alias: String,
    user: String,
    key_path: PathBuf,
    register_url: String,
}

impl SshRegisterStep {
    /// Create a registration step; `user` defaults to `git` upstream.
    #[must_use]
    pub const fn new(
        header: StepHeader,
        alias: String,
        user: String,
        key_path: PathBuf,
        register_url: String,
    ) -> Self {
        Self {
            header,
            alias,
            user,
            key_path,
            register_url,
        }
    }
}

/// Whether `ssh -T` output reports a successful key authentication.
fn is_authenticated(output: &str) -> bool {
    let lower = output.to_lowercase();
    AUTH_MARKERS.iter().any(|m| lower.contains(m))
}

impl Step for SshRegisterStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("register ssh key with {}", self.alias)
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        if !ctx.executor.which("ssh") || !self.key_path.is_file() {
            return Ok(false);
        }
        let timeout = format!("ConnectTimeout={AUTH_TIMEOUT_SECS}");
        let destination = format!("{}@{}", self.user, self.alias);
        let result = ctx.executor.run_unchecked(
            "ssh",
            &[
                "-T",
                "-o",
                "BatchMode=yes",
                "-o",
                &timeout,
                "-o",
                "StrictHostKeyChecking=accept-new",
                &destination,
            ],
        )?;
        // Hosts without shell access exit non-zero even when the key is accepted.
        Ok(is_authenticated(&format!("{}{}", result.stdout, result.stderr)))
    }

    fn apply(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        Ok(Applied::manual(format!(
            "add the public key {} at {}, then re-run",
            public_key_path(&self.key_path).display(),
            self.register_url
        )))
    }
}
