//! `[ssh]` keypair settings and `[[ssh_hosts]]` entries.
use serde::Deserialize;
use std::collections::BTreeMap;

fn default_key_path() -> String {
    "~/.ssh/id_ed25519".to_string()
}

fn default_key_type() -> String {
    "ed25519".to_string()
}

/// Keypair generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSettings {
    /// Private key path.
    pub key_path: String,
    /// `ssh-keygen -t` value.
    pub key_type: String,
    /// Passphrase for a new key.  Empty means none.
    ///
    /// `ssh-keygen` receives it as a command-line argument, so it is visible
    /// in the process list while the key is generated; the run warns when
    /// one is used.
    pub passphrase: String,
    /// Whether to generate a keypair at all.
    pub generate: bool,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            key_path: default_key_path(),
            key_type: default_key_type(),
            passphrase: String::new(),
            generate: true,
        }
    }
}

/// Step id of the keypair step.
pub const KEYPAIR_STEP: &str = "ssh:keypair";

/// A `Host` stanza to maintain in the SSH client config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshHost {
    /// `Host` alias.
    pub alias: String,
    /// `HostName`; defaults to the alias.
    #[serde(default)]
    pub hostname: Option<String>,
    /// `User`.
    #[serde(default)]
    pub user: Option<String>,
    /// `Port`.
    #[serde(default)]
    pub port: Option<u16>,
    /// `IdentityFile`; defaults to `ssh.key_path`.
    #[serde(default)]
    pub identity_file: Option<String>,
    /// Additional options, e.g. `{ IdentitiesOnly = "yes" }`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Page where the public key is registered.  Adds a manual
    /// registration step when set.
    #[serde(default)]
    pub register_url: Option<String>,
    /// Extra step ids this host waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl SshHost {
    /// Step id of the config stanza step.
    #[must_use]
    pub fn step_id(&self) -> String {
        format!("ssh-host:{}", self.alias)
    }

    /// Step id of the key registration step.
    #[must_use]
    pub fn register_step_id(&self) -> String {
        format!("ssh-register:{}", self.alias)
    }

    /// Ordered stanza options with `identity_file` already resolved.
    #[must_use]
    pub fn stanza_options(&self, identity_file: &str) -> Vec<(String, String)> {
        let mut out = vec![(
            "HostName".to_string(),
            self.hostname.clone().unwrap_or_else(|| self.alias.clone()),
        )];
        if let Some(user) = &self.user {
            out.push(("User".to_string(), user.clone()));
        }
        if let Some(port) = self.port {
            out.push(("Port".to_string(), port.to_string()));
        }
        out.push(("IdentityFile".to_string(), identity_file.to_string()));
        out.extend(self.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}
