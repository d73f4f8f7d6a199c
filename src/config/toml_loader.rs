//! TOML manifest parsing.
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::ConfigError;

/// Load and deserialize a TOML file.
///
/// Unlike optional side files, the manifest is required: a missing file is
/// reported as [`ConfigError::NotFound`].
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, or not valid TOML
/// for `T`.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_config(&content, &path.display().to_string())
}

/// Deserialize TOML text; `file` is used in error messages only.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] if the text is not valid TOML for `T`.
pub fn parse_config<T: DeserializeOwned>(content: &str, file: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
        file: file.to_string(),
        message: e.message().to_string(),
    })
}
