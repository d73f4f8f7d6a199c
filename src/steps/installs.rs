//! Steps that install software: apt packages, archive toolchains, vendor
//! scripts and plugin clones.
use anyhow::Result;
use std::path::PathBuf;

use super::{Applied, Context, Step, StepHeader, converge, resource_satisfied};
use crate::config::scripts::Script;
use crate::config::toolchains::Toolchain;
use crate::model::{EnvironmentModel, ModelDelta};
use crate::resolver::{Resolution, VersionSource};
use crate::resources::git_repo::GitRepoResource;
use crate::resources::package::PackageResource;
use crate::resources::script::ScriptResource;
use crate::resources::toolchain::ToolchainResource;

/// `package:<name>`: an apt package, optionally pinned.
#[derive(Debug, Clone)]
pub struct PackageStep {
    header: StepHeader,
    name: String,
    version: Option<String>,
}

impl PackageStep {
    /// Create a package step.
    #[must_use]
    pub const fn new(header: StepHeader, name: String, version: Option<String>) -> Self {
        Self {
            header,
            name,
            version,
        }
    }
}

impl Step for PackageStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        match &self.version {
            Some(v) => format!("install package {}={v}", self.name),
            None => format!("install package {}", self.name),
        }
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        let resource =
            PackageResource::new(self.name.clone(), self.version.clone(), ctx.executor.as_ref());
        resource_satisfied(&resource)
    }

    fn apply(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        let resource =
            PackageResource::new(self.name.clone(), self.version.clone(), ctx.executor.as_ref());
        converge(&resource)
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!("sudo apt-get remove {}", self.name))
    }
}

/// `toolchain:<name>`: an archive unpacked under the install root.
#[derive(Debug, Clone)]
pub struct ToolchainStep {
    header: StepHeader,
    toolchain: Toolchain,
    dest: PathBuf,
}

impl ToolchainStep {
    /// Create a toolchain step installing into `dest`.
    #[must_use]
    pub const fn new(header: StepHeader, toolchain: Toolchain, dest: PathBuf) -> Self {
        Self {
            header,
            toolchain,
            dest,
        }
    }

    fn resolve(&self, ctx: &Context) -> Result<Resolution> {
        if !self.toolchain.is_latest() {
            return Ok(Resolution {
                version: ctx.resolver.resolve_pinned(&self.toolchain.version)?,
                warning: None,
            });
        }
        let source = VersionSource {
            url: self.toolchain.latest_url.clone().unwrap_or_default(),
            strip_prefix: self.toolchain.strip_prefix.clone(),
            fallback: self.toolchain.fallback.clone(),
        };
        Ok(ctx.resolver.resolve_latest(&source)?)
    }

    fn resource<'a>(&self, ctx: &'a Context, version: &str) -> ToolchainResource<'a> {
        ToolchainResource::new(
            self.toolchain.name.clone(),
            version.to_string(),
            self.toolchain.url_for(version),
            self.dest.clone(),
            PathBuf::from(&self.toolchain.binary),
            ctx.executor.as_ref(),
        )
        .with_sha256(self.toolchain.sha256.clone())
        .with_version_args(self.toolchain.version_args.clone())
        .with_strip_components(self.toolchain.strip_components)
    }

    fn facts(&self, resource: &ToolchainResource<'_>) -> ModelDelta {
        let prefix = format!("toolchain.{}", self.toolchain.name);
        let binary = resource.binary_path();
        let bin_dir = binary.parent().map_or_else(|| self.dest.clone(), std::path::Path::to_path_buf);
        ModelDelta::new()
            .with(format!("{prefix}.version"), resource.version.clone())
            .with(format!("{prefix}.root"), self.dest.display().to_string())
            .with(format!("{prefix}.bin"), bin_dir.display().to_string())
    }
}

impl Step for ToolchainStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!(
            "install {} {} into {}",
            self.toolchain.name,
            self.toolchain.version,
            self.dest.display()
        )
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        let resolution = self.resolve(ctx)?;
        resource_satisfied(&self.resource(ctx, &resolution.version))
    }

    fn observe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<ModelDelta> {
        let resolution = self.resolve(ctx)?;
        Ok(self.facts(&self.resource(ctx, &resolution.version)))
    }

    fn probe_warnings(&self, ctx: &Context) -> Vec<String> {
        self.resolve(ctx)
            .ok()
            .and_then(|resolution| resolution.warning)
            .into_iter()
            .collect()
    }

    fn apply(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        let resolution = self.resolve(ctx)?;
        let resource = self.resource(ctx, &resolution.version);
        let applied = converge(&resource)?;
        Ok(applied
            .with_delta(self.facts(&resource))
            .with_warnings(resolution.warning.into_iter().collect()))
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!("rm -rf {}", self.dest.display()))
    }
}

/// `script:<name>`: a vendor install script run once.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    header: StepHeader,
    script: Script,
    creates: PathBuf,
}

impl ScriptStep {
    /// Create a script step guarded by `creates`.
    #[must_use]
    pub const fn new(header: StepHeader, script: Script, creates: PathBuf) -> Self {
        Self {
            header,
            script,
            creates,
        }
    }

    fn resource<'a>(&self, ctx: &'a Context) -> ScriptResource<'a> {
        ScriptResource::new(
            self.script.name.clone(),
            self.script.url.clone(),
            self.creates.clone(),
            ctx.executor.as_ref(),
        )
        .with_args(self.script.args.clone())
        .with_env(
            self.script
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
        .with_sha256(self.script.sha256.clone())
    }
}

impl Step for ScriptStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("run {} install script", self.script.name)
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        resource_satisfied(&self.resource(ctx))
    }

    fn apply(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        converge(&self.resource(ctx))
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!("rm -rf {}", self.creates.display()))
    }
}

/// `plugin:<name>`: a shallow clone of a plugin or theme repository.
#[derive(Debug, Clone)]
pub struct PluginStep {
    header: StepHeader,
    url: String,
    dest: PathBuf,
    branch: Option<String>,
}

impl PluginStep {
    /// Create a plugin clone step.
    #[must_use]
    pub const fn new(header: StepHeader, url: String, dest: PathBuf, branch: Option<String>) -> Self {
        Self {
            header,
            url,
            dest,
            branch,
        }
    }

    fn resource<'a>(&self, ctx: &'a Context) -> GitRepoResource<'a> {
        GitRepoResource::new(
            self.url.clone(),
            self.dest.clone(),
            self.branch.clone(),
            ctx.executor.as_ref(),
        )
    }
}

impl Step for PluginStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("clone {} into {}", self.url, self.dest.display())
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        resource_satisfied(&self.resource(ctx))
    }

    fn apply(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        converge(&self.resource(ctx))
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!("rm -rf {}", self.dest.display()))
    }
}
