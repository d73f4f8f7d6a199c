//! `Host` stanza upsert for `~/.ssh/config`.
//!
//! The file is parsed into a preamble plus a list of stanzas (each starting
//! at a `Host` or `Match` line).  Only the stanza whose header is exactly
//! `Host <alias>` is touched; comments, blank lines and every other stanza
//! survive unchanged.
use anyhow::Result;
use std::path::PathBuf;

use super::helpers::fs::{read_optional, write_atomic_with_mode};
use super::{Resource, ResourceChange, ResourceState};

const INDENT: &str = "    ";

/// One `Host`/`Match` stanza: its header line and the lines that follow.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Stanza {
    header: String,
    lines: Vec<String>,
}

impl Stanza {
    /// Whether this stanza is exactly `Host <alias>`.
    fn is_host(&self, alias: &str) -> bool {
        let (keyword, rest) = split_option(&self.header);
        keyword.eq_ignore_ascii_case("host")
            && rest.split_whitespace().collect::<Vec<_>>() == [alias]
    }

    fn position_of(&self, key: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| split_option(l).0.eq_ignore_ascii_case(key))
    }

    /// Set `key` to `value`, replacing the first occurrence in place or
    /// appending after the last non-blank line.
    fn set(&mut self, key: &str, value: &str) {
        let indent_of = |line: &str| -> String {
            line.chars().take_while(|c| c.is_whitespace()).collect()
        };
        if self.position_of(key).is_some() {
            let mut seen = false;
            // Later repeats would be ignored by ssh; drop them so the file
            // says what ssh does.
            self.lines.retain_mut(|line| {
                if !split_option(line).0.eq_ignore_ascii_case(key) {
                    return true;
                }
                if seen {
                    return false;
                }
                seen = true;
                *line = format!("{}{key} {value}", indent_of(line));
                true
            });
        } else {
            let last = self.lines.iter().rposition(|l| !l.trim().is_empty());
            let indent = last
                .and_then(|i| self.lines.get(i))
                .map_or_else(|| INDENT.to_string(), |l| indent_of(l));
            let at = last.map_or(0, |i| i + 1);
            self.lines.insert(at, format!("{indent}{key} {value}"));
        }
    }

    /// Options set in this stanza, first occurrence per key wins.
    fn options(&self) -> Vec<(String, String)> {
        let mut seen: Vec<(String, String)> = Vec::new();
        for line in &self.lines {
            let (key, value) = split_option(line);
            if key.is_empty() || key.starts_with('#') {
                continue;
            }
            if !seen.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                seen.push((key.to_string(), value.to_string()));
            }
        }
        seen
    }
}

/// Split an option line into `(keyword, value)`.  Both `Key value` and
/// `Key=value` are accepted.
fn split_option(line: &str) -> (&str, &str) {
    let line = line.trim();
    let end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let (key, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    (key, rest)
}

/// A parsed SSH client config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshConfig {
    preamble: Vec<String>,
    stanzas: Vec<Stanza>,
    trailing_newline: bool,
}

impl SshConfig {
    /// Parse config text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut config = Self {
            trailing_newline: text.is_empty() || text.ends_with('\n'),
            ..Self::default()
        };
        for line in text.lines() {
            let (keyword, _) = split_option(line);
            if keyword.eq_ignore_ascii_case("host") || keyword.eq_ignore_ascii_case("match") {
                config.stanzas.push(Stanza {
                    header: line.to_string(),
                    lines: Vec::new(),
                });
            } else if let Some(current) = config.stanzas.last_mut() {
                current.lines.push(line.to_string());
            } else {
                config.preamble.push(line.to_string());
            }
        }
        config
    }

    /// Number of stanzas whose header is exactly `Host <alias>`.
    #[must_use]
    pub fn host_count(&self, alias: &str) -> usize {
        self.stanzas.iter().filter(|s| s.is_host(alias)).count()
    }

    /// Options of the first `Host <alias>` stanza.
    #[must_use]
    pub fn host_options(&self, alias: &str) -> Option<Vec<(String, String)>> {
        self.stanzas
            .iter()
            .find(|s| s.is_host(alias))
            .map(Stanza::options)
    }

    /// Update or insert the `Host <alias>` stanza with `options`.
    ///
    /// Duplicate stanzas for the same alias are merged into the first one:
    /// options they carry that the first lacks are kept, then `options`
    /// override.
    pub fn upsert_host(&mut self, alias: &str, options: &[(String, String)]) {
        let matching: Vec<usize> = self
            .stanzas
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_host(alias))
            .map(|(i, _)| i)
            .collect();

        let Some((&first, duplicates)) = matching.split_first() else {
            if let Some(last) = self.stanzas.last_mut()
                && last.lines.last().is_some_and(|l| !l.trim().is_empty())
            {
                last.lines.push(String::new());
            } else if self.stanzas.is_empty()
                && self.preamble.last().is_some_and(|l| !l.trim().is_empty())
            {
                self.preamble.push(String::new());
            }
            let mut stanza = Stanza {
                header: format!("Host {alias}"),
                lines: Vec::new(),
            };
            for (key, value) in options {
                stanza.set(key, value);
            }
            self.stanzas.push(stanza);
            return;
        };
        let mut carried: Vec<(String, String)> = Vec::new();
        for &i in duplicates {
            carried.extend(self.stanzas.get(i).map(Stanza::options).unwrap_or_default());
        }
        for &i in duplicates.iter().rev() {
            self.stanzas.remove(i);
        }

        let Some(stanza) = self.stanzas.get_mut(first) else {
            return;
        };
        for (key, value) in carried {
            if stanza.position_of(&key).is_none() {
                stanza.set(&key, &value);
            }
        }
        for (key, value) in options {
            stanza.set(key, value);
        }
    }

    /// Render back to text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines: Vec<&str> = self.preamble.iter().map(String::as_str).collect();
        for stanza in &self.stanzas {
            lines.push(&stanza.header);
            lines.extend(stanza.lines.iter().map(String::as_str));
        }
        let mut out = lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// A `Host` stanza in an SSH client config file.
#[derive(Debug, Clone)]
pub struct SshHostResource {
    /// Config file path, usually `~/.ssh/config`.
    pub path: PathBuf,
    /// Host alias.
    pub alias: String,
    /// Desired options in order, e.g. `("HostName", "github.com")`.
    pub options: Vec<(String, String)>,
}

impl SshHostResource {
    /// Create a new host stanza resource.
    #[must_use]
    pub const fn new(path: PathBuf, alias: String, options: Vec<(String, String)>) -> Self {
        Self {
            path,
            alias,
            options,
        }
    }

    fn desired(&self, existing: &str) -> String {
        let mut config = SshConfig::parse(existing);
        config.upsert_host(&self.alias, &self.options);
        config.render()
    }
}

impl Resource for SshHostResource {
    fn description(&self) -> String {
        format!("ssh Host {} in {}", self.alias, self.path.display())
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(existing) = read_optional(&self.path)? else {
            return Ok(ResourceState::Missing);
        };
        let config = SshConfig::parse(&existing);
        match config.host_count(&self.alias) {
            0 => Ok(ResourceState::Missing),
            n if n > 1 => Ok(ResourceState::Incorrect {
                current: format!("{n} duplicate stanzas"),
            }),
            _ if self.desired(&existing) == existing => Ok(ResourceState::Correct),
            _ => Ok(ResourceState::Incorrect {
                current: "options differ".to_string(),
            }),
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        let existing = read_optional(&self.path)?.unwrap_or_default();
        let desired = self.desired(&existing);
        if desired == existing {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        if let Some(dir) = self.path.parent()
            && !dir.exists()
        {
            create_private_dir(dir)?;
        }
        write_atomic_with_mode(&self.path, &desired, Some(0o600))?;
        Ok(ResourceChange::Applied)
    }
}

/// Create `dir` (and ancestors) with mode `0700`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn create_private_dir(dir: &std::path::Path) -> Result<()> {
    use anyhow::Context as _;
    use std::os::unix::fs::DirBuilderExt as _;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .with_context(|| format!("create {}", dir.display()))
}
