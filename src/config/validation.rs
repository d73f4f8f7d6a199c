//! Manifest checks run at load time.
use std::path::Path;

use super::Manifest;
use crate::error::ConfigError;
use crate::resolver::validate_version;
use crate::template::placeholders;

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The manifest section (e.g., "links", "toolchains").
    pub source: String,
    /// The specific item that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}': {}", self.source, self.item, self.message)
    }
}

/// Trait for configuration validators.
///
/// `check` rejects values the engine cannot run with; `validate` reports
/// issues the run can survive:
/// - Non-existent source files
/// - Versions that cannot fall back offline
/// - Placeholders no step provides
pub trait ConfigValidator {
    /// Reject unusable values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    fn check(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Validate the configuration and return any warnings found.
    fn validate(&self, root: &Path) -> Vec<ValidationWarning>;

    /// Return a human-readable name for this validator (e.g., "links").
    fn name(&self) -> &'static str;
}

/// Validator for `[[links]]`.
#[derive(Debug)]
pub struct LinkValidator<'a> {
    links: &'a [super::symlinks::Link],
}

impl<'a> LinkValidator<'a> {
    /// Create a validator over `links`.
    #[must_use]
    pub const fn new(links: &'a [super::symlinks::Link]) -> Self {
        Self { links }
    }
}

impl ConfigValidator for LinkValidator<'_> {
    fn validate(&self, root: &Path) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for link in self.links {
            if link.source.starts_with('~') {
                continue;
            }
            let source_path = root.join(&link.source);
            if !source_path.exists() {
                warnings.push(ValidationWarning::new(
                    self.name(),
                    &link.target,
                    format!("source file does not exist: {}", source_path.display()),
                ));
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "links"
    }
}

/// Validator for `[[packages]]` pins.
#[derive(Debug)]
pub struct PackageValidator<'a> {
    packages: &'a [super::packages::Package],
}

impl<'a> PackageValidator<'a> {
    /// Create a validator over `packages`.
    #[must_use]
    pub const fn new(packages: &'a [super::packages::Package]) -> Self {
        Self { packages }
    }
}

impl ConfigValidator for PackageValidator<'_> {
    fn check(&self) -> Result<(), ConfigError> {
        for package in self.packages {
            if package.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "packages.name".to_string(),
                    message: "package name is empty".to_string(),
                });
            }
            if let Some(version) = &package.version {
                validate_version(version).map_err(|message| ConfigError::InvalidValue {
                    field: format!("packages.{}.version", package.name),
                    message,
                })?;
            }
        }
        Ok(())
    }

    fn validate(&self, _root: &Path) -> Vec<ValidationWarning> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "packages"
    }
}

/// Validator for `[[toolchains]]` version settings.
#[derive(Debug)]
pub struct ToolchainValidator<'a> {
    toolchains: &'a [super::toolchains::Toolchain],
}

impl<'a> ToolchainValidator<'a> {
    /// Create a validator over `toolchains`.
    #[must_use]
    pub const fn new(toolchains: &'a [super::toolchains::Toolchain]) -> Self {
        Self { toolchains }
    }
}

impl ConfigValidator for ToolchainValidator<'_> {
    fn check(&self) -> Result<(), ConfigError> {
        for toolchain in self.toolchains {
            let field = |f: &str| format!("toolchains.{}.{f}", toolchain.name);
            if toolchain.is_latest() {
                if toolchain.latest_url.is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: field("latest_url"),
                        message: "required when version is \"latest\"".to_string(),
                    });
                }
            } else {
                validate_version(&toolchain.version).map_err(|message| {
                    ConfigError::InvalidValue {
                        field: field("version"),
                        message,
                    }
                })?;
            }
            if let Some(fallback) = &toolchain.fallback {
                validate_version(fallback).map_err(|message| ConfigError::InvalidValue {
                    field: field("fallback"),
                    message,
                })?;
            }
        }
        Ok(())
    }

    fn validate(&self, _root: &Path) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for toolchain in self.toolchains {
            if toolchain.is_latest() && toolchain.fallback.is_none() {
                warnings.push(ValidationWarning::new(
                    self.name(),
                    &toolchain.name,
                    "no fallback version; the step fails when the latest lookup is unavailable",
                ));
            }
            if toolchain.is_latest() && toolchain.sha256.is_some() {
                warnings.push(ValidationWarning::new(
                    self.name(),
                    &toolchain.name,
                    "sha256 only matches one version; pin the version to use it",
                ));
            }
            if !toolchain.url.contains(super::toolchains::VERSION_PLACEHOLDER) {
                warnings.push(ValidationWarning::new(
                    self.name(),
                    &toolchain.name,
                    "url has no {version} placeholder",
                ));
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "toolchains"
    }
}

/// Validator for `[[templates]]`.
#[derive(Debug)]
pub struct TemplateValidator<'a> {
    templates: &'a [super::templates::TemplateFile],
}

impl<'a> TemplateValidator<'a> {
    /// Create a validator over `templates`.
    #[must_use]
    pub const fn new(templates: &'a [super::templates::TemplateFile]) -> Self {
        Self { templates }
    }
}

impl ConfigValidator for TemplateValidator<'_> {
    fn check(&self) -> Result<(), ConfigError> {
        for template in self.templates {
            if template.source.is_some() == template.body.is_some() {
                return Err(ConfigError::InvalidValue {
                    field: format!("templates.{}", template.name),
                    message: "exactly one of source or body must be set".to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate(&self, root: &Path) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for template in self.templates {
            if let Some(source) = &template.source {
                let path = root.join(source);
                if !path.is_file() {
                    warnings.push(ValidationWarning::new(
                        self.name(),
                        &template.name,
                        format!("template source does not exist: {}", path.display()),
                    ));
                }
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "templates"
    }
}

/// Validator for placeholders that no step or identity field provides.
#[derive(Debug)]
pub struct PlaceholderValidator<'a> {
    manifest: &'a Manifest,
}

impl<'a> PlaceholderValidator<'a> {
    /// Create a validator over the whole manifest.
    #[must_use]
    pub const fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }

    fn provided(&self, key: &str) -> bool {
        const FIXED: &[&str] = &[
            "home",
            "install_root",
            "identity.name",
            "identity.email",
            "ssh.key_path",
            "ssh.public_key",
            "ssh.public_key_path",
        ];
        if FIXED.contains(&key) {
            return true;
        }
        key.strip_prefix("toolchain.")
            .and_then(|rest| rest.split_once('.'))
            .is_some_and(|(name, field)| {
                matches!(field, "version" | "root" | "bin")
                    && self.manifest.toolchains.iter().any(|t| t.name == name)
            })
    }
}

impl ConfigValidator for PlaceholderValidator<'_> {
    fn validate(&self, _root: &Path) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let blocks = self
            .manifest
            .profile_blocks
            .iter()
            .map(|b| (b.step_id(), placeholders(&b.body)));
        let templates = self.manifest.templates.iter().map(|t| {
            let mut keys = t.body.as_deref().map(placeholders).unwrap_or_default();
            keys.extend(t.required_keys.iter().cloned());
            (t.step_id(), keys)
        });
        for (id, keys) in blocks.chain(templates) {
            for key in keys.iter().filter(|k| !self.provided(k)) {
                warnings.push(ValidationWarning::new(
                    self.name(),
                    &id,
                    format!("no step provides '{key}'; rendering will fail"),
                ));
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "placeholders"
    }
}

/// Check and validate the whole manifest.
///
/// # Errors
///
/// Returns the first invalid value; warnings are only collected when every
/// validator's check passes.
pub fn validate_all(manifest: &Manifest, root: &Path) -> Result<Vec<ValidationWarning>, ConfigError> {
    let validators: Vec<Box<dyn ConfigValidator + '_>> = vec![
        Box::new(PackageValidator::new(&manifest.packages)),
        Box::new(ToolchainValidator::new(&manifest.toolchains)),
        Box::new(TemplateValidator::new(&manifest.templates)),
        Box::new(LinkValidator::new(&manifest.links)),
        Box::new(PlaceholderValidator::new(manifest)),
    ];

    for validator in &validators {
        validator.check()?;
    }

    let mut all_warnings = Vec::new();
    if manifest.entry_count() == 0 {
        all_warnings.push(ValidationWarning::new(
            "manifest",
            "",
            "manifest declares no steps",
        ));
    }
    for validator in &validators {
        all_warnings.extend(validator.validate(root));
    }
    Ok(all_warnings)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn manifest(toml: &str) -> Manifest {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn link_validator_detects_missing_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let m = manifest("[[links]]\nsource = \"links/nonexistent\"\ntarget = \"~/.x\"\n");
        let warnings = LinkValidator::new(&m.links).validate(temp_dir.path());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("does not exist"));
    }

    #[test]
    fn link_validator_accepts_existing_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("vimrc"), "").unwrap();
        let m = manifest("[[links]]\nsource = \"vimrc\"\ntarget = \"~/.vimrc\"\n");
        assert!(LinkValidator::new(&m.links).validate(temp_dir.path()).is_empty());
    }

    #[test]
    fn invalid_package_pin_is_an_error() {
        let m = manifest("[[packages]]\nname = \"git\"\nversion = \"latest\"\n");
        let err = PackageValidator::new(&m.packages).check().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "packages.git.version"));
    }

    #[test]
    fn latest_without_url_is_an_error() {
        let m = manifest("[[toolchains]]\nname = \"go\"\nurl = \"u{version}\"\nbinary = \"bin/go\"\n");
        assert!(ToolchainValidator::new(&m.toolchains).check().is_err());
    }

    #[test]
    fn latest_without_fallback_warns() {
        let m = manifest(
            "[[toolchains]]\nname = \"go\"\nlatest_url = \"https://go.dev/VERSION?m=text\"\nurl = \"u{version}\"\nbinary = \"bin/go\"\n",
        );
        let validator = ToolchainValidator::new(&m.toolchains);
        assert!(validator.check().is_ok());
        let warnings = validator.validate(Path::new("."));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("no fallback"));
    }

    #[test]
    fn template_needs_exactly_one_body_source() {
        let both = manifest(
            "[[templates]]\nname = \"g\"\ndest = \"~/.gitconfig\"\nsource = \"t\"\nbody = \"b\"\n",
        );
        assert!(TemplateValidator::new(&both.templates).check().is_err());
        let neither = manifest("[[templates]]\nname = \"g\"\ndest = \"~/.gitconfig\"\n");
        assert!(TemplateValidator::new(&neither.templates).check().is_err());
    }

    #[test]
    fn unknown_placeholder_warns() {
        let m = manifest(
            r#"
            [[toolchains]]
            name = "go"
            version = "1.22.1"
            url = "u{version}"
            binary = "bin/go"

            [[profile_blocks]]
            id = "path"
            body = "export PATH={{ toolchain.go.bin }}:{{ toolchain.node.bin }}:$PATH"
            "#,
        );
        let warnings = PlaceholderValidator::new(&m).validate(Path::new("."));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("toolchain.node.bin"));
    }

    #[test]
    fn empty_manifest_warns() {
        let warnings = validate_all(&Manifest::default(), Path::new(".")).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].to_string(), "manifest '': manifest declares no steps");
    }
}
