//! Builds the static step list from a loaded [`Config`].
//!
//! Steps are listed in a fixed section order (packages, toolchains,
//! scripts, plugins, links, credentials, git, templates, profile blocks);
//! the engine derives execution order from dependencies, with this order
//! breaking ties.  Implicit dependencies added here:
//!
//! - a `{{ toolchain.<name>.* }}` placeholder depends on `toolchain:<name>`
//! - a `{{ ssh.* }}` placeholder depends on `ssh:keypair`
//! - git-backed steps depend on `package:git` when it is declared
//! - SSH hosts depend on `ssh:keypair`, registrations on their host
use anyhow::{Context as _, Result};

use super::credentials::{KeypairStep, SshHostStep, SshRegisterStep};
use super::files::{ProfileStep, TemplateStep};
use super::git::{GitConfigStep, GitIdentityStep, IDENTITY_STEP};
use super::installs::{PackageStep, PluginStep, ScriptStep, ToolchainStep};
use super::links::LinkStep;
use super::{Step, StepHeader};
use crate::config::Config;
use crate::config::ssh::KEYPAIR_STEP;
use crate::template::Template;

/// Package whose step git-backed steps wait for.
const GIT_PACKAGE: &str = "git";

/// Ids a template's placeholders make it depend on.
fn placeholder_dependencies(template: &Template, config: &Config) -> Vec<String> {
    let manifest = &config.manifest;
    let mut deps = Vec::new();
    for key in template.required_keys() {
        if let Some((name, _)) = key
            .strip_prefix("toolchain.")
            .and_then(|rest| rest.split_once('.'))
            && let Some(toolchain) = manifest.toolchains.iter().find(|t| t.name == name)
        {
            deps.push(toolchain.step_id());
        } else if key.starts_with("ssh.") && manifest.ssh.generate {
            deps.push(KEYPAIR_STEP.to_string());
        }
    }
    deps
}

/// Build every step the manifest declares.
///
/// # Errors
///
/// Returns an error if a template source file cannot be read.
pub fn build(config: &Config) -> Result<Vec<Box<dyn Step>>> {
    let manifest = &config.manifest;
    let mut steps: Vec<Box<dyn Step>> = Vec::new();

    let git_dep: Vec<String> = manifest
        .packages
        .iter()
        .find(|p| p.name == GIT_PACKAGE)
        .map(|p| p.step_id())
        .into_iter()
        .collect();
    let with_git = |explicit: &[String]| {
        let mut deps = explicit.to_vec();
        deps.extend(git_dep.iter().cloned());
        deps
    };

    for package in &manifest.packages {
        steps.push(Box::new(PackageStep::new(
            StepHeader::new(package.step_id(), package.depends_on.clone()),
            package.name.clone(),
            package.version.clone(),
        )));
    }

    let install_root = config.install_root();
    for toolchain in &manifest.toolchains {
        steps.push(Box::new(ToolchainStep::new(
            StepHeader::new(toolchain.step_id(), toolchain.depends_on.clone()),
            toolchain.clone(),
            install_root.join(&toolchain.name),
        )));
    }

    for script in &manifest.scripts {
        steps.push(Box::new(ScriptStep::new(
            StepHeader::new(script.step_id(), script.depends_on.clone()),
            script.clone(),
            config.home_path(&script.creates),
        )));
    }

    for plugin in &manifest.plugins {
        steps.push(Box::new(PluginStep::new(
            StepHeader::new(plugin.step_id(), with_git(&plugin.depends_on)),
            plugin.url.clone(),
            config.home_path(&plugin.dest),
            plugin.branch.clone(),
        )));
    }

    for link in &manifest.links {
        steps.push(Box::new(LinkStep::new(
            StepHeader::new(link.step_id(), link.depends_on.clone()),
            config.root_path(&link.source),
            config.home_path(&link.target),
        )));
    }

    let ssh = &manifest.ssh;
    if ssh.generate {
        steps.push(Box::new(KeypairStep::new(
            StepHeader::new(KEYPAIR_STEP.to_string(), Vec::new()),
            config.home_path(&ssh.key_path),
            ssh.key_type.clone(),
            ssh.passphrase.clone(),
        )));
    }

    let ssh_config = config.home_path(&manifest.settings.ssh_config);
    for host in &manifest.ssh_hosts {
        let identity_file = host.identity_file.as_deref().unwrap_or(&ssh.key_path);
        let mut header = StepHeader::new(host.step_id(), host.depends_on.clone());
        if ssh.generate {
            header.add_dependency(KEYPAIR_STEP.to_string());
        }
        steps.push(Box::new(SshHostStep::new(
            header,
            ssh_config.clone(),
            host.alias.clone(),
            host.stanza_options(identity_file),
        )));

        if let Some(url) = &host.register_url {
            let mut header = StepHeader::new(host.register_step_id(), vec![host.step_id()]);
            if ssh.generate {
                header.add_dependency(KEYPAIR_STEP.to_string());
            }
            steps.push(Box::new(SshRegisterStep::new(
                header,
                host.alias.clone(),
                host.user.clone().unwrap_or_else(|| GIT_PACKAGE.to_string()),
                config.home_path(identity_file),
                url.clone(),
            )));
        }
    }

    let identity = &config.identity;
    let identity_declared = identity.name.is_some()
        || identity.email.is_some()
        || manifest.identity.name.is_some()
        || manifest.identity.email.is_some();
    if identity_declared || !manifest.git_config.is_empty() {
        steps.push(Box::new(GitIdentityStep::new(StepHeader::new(
            IDENTITY_STEP.to_string(),
            with_git(&[]),
        ))));
    }

    for setting in &manifest.git_config {
        steps.push(Box::new(GitConfigStep::new(
            StepHeader::new(setting.step_id(), with_git(&[])),
            setting.key.clone(),
            setting.value.clone(),
        )));
    }

    for entry in &manifest.templates {
        let body = match (&entry.body, &entry.source) {
            (Some(body), _) => body.clone(),
            (None, Some(source)) => {
                let path = config.root_path(source);
                std::fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))?
            }
            (None, None) => String::new(),
        };
        let template = Template::new(entry.name.as_str(), body, entry.required_keys.clone());
        let mut header = StepHeader::new(entry.step_id(), entry.depends_on.clone());
        for dep in placeholder_dependencies(&template, config) {
            header.add_dependency(dep);
        }
        steps.push(Box::new(TemplateStep::new(
            header,
            template,
            config.home_path(&entry.dest),
        )));
    }

    for block in &manifest.profile_blocks {
        let template = Template::new(block.step_id(), block.body.as_str(), Vec::new());
        let mut header = StepHeader::new(block.step_id(), block.depends_on.clone());
        for dep in placeholder_dependencies(&template, config) {
            header.add_dependency(dep);
        }
        let file = block
            .file
            .as_deref()
            .unwrap_or(&manifest.settings.shell_rc);
        steps.push(Box::new(ProfileStep::new(
            header,
            block.id.clone(),
            template,
            config.home_path(file),
        )));
    }

    Ok(steps)
}
