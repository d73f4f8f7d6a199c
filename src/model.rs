//! Key-value environment model accumulated across a run.
//!
//! The model replaces the implicit shell state (exported variables, edited
//! `PATH`) of a provisioning script with explicit data.  Only the executor
//! mutates it; steps read it and return a [`ModelDelta`].
use std::collections::BTreeMap;

/// Ordered key-value state shared by all steps of one run.
///
/// Keys are dotted names such as `identity.email` or `toolchain.go.version`.
/// A [`BTreeMap`] keeps iteration order stable so that anything derived from
/// the model is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentModel {
    values: BTreeMap<String, String>,
}

impl EnvironmentModel {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert or overwrite a single key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Merge a delta produced by a step; later writes win.
    pub fn apply(&mut self, delta: ModelDelta) {
        for (key, value) in delta.entries {
            self.values.insert(key, value);
        }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the model holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Changes a step wants merged into the [`EnvironmentModel`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDelta {
    entries: Vec<(String, String)>,
}

impl ModelDelta {
    /// An empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Append an entry.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Whether the delta carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
