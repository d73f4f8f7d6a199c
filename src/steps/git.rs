//! Global git configuration: `[[git_config]]` entries and the commit identity.
use anyhow::Result;

use super::{Applied, Context, Step, StepHeader, converge, resource_satisfied};
use crate::config::identity::{EMAIL_KEY, NAME_KEY};
use crate::error::RenderError;
use crate::model::EnvironmentModel;
use crate::resources::git_config::GitConfigResource;
use crate::resources::{Resource, ResourceChange};

/// Step id of the identity step.
pub const IDENTITY_STEP: &str = "identity:git";

/// `git-config:<key>`: one global setting.
#[derive(Debug, Clone)]
pub struct GitConfigStep {
    header: StepHeader,
    key: String,
    value: String,
}

impl GitConfigStep {
    /// Create a git config step.
    #[must_use]
    pub const fn new(header: StepHeader, key: String, value: String) -> Self {
        Self { header, key, value }
    }
}

impl Step for GitConfigStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("git config --global {} {}", self.key, self.value)
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
        resource_satisfied(&GitConfigResource::new(
            self.key.as_str(),
            self.value.as_str(),
            ctx.executor.as_ref(),
        ))
    }

    fn apply(&self, ctx: &Context, _model: &EnvironmentModel) -> Result<Applied> {
        converge(&GitConfigResource::new(
            self.key.as_str(),
            self.value.as_str(),
            ctx.executor.as_ref(),
        ))
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!("git config --global --unset {}", self.key))
    }
}

/// `identity:git`: `user.name` and `user.email` from the identity facts.
#[derive(Debug, Clone)]
pub struct GitIdentityStep {
    header: StepHeader,
}

impl GitIdentityStep {
    /// Create the identity step.
    #[must_use]
    pub const fn new(header: StepHeader) -> Self {
        Self { header }
    }

    fn resources<'a>(
        ctx: &'a Context,
        model: &EnvironmentModel,
    ) -> Result<Vec<GitConfigResource<'a>>, RenderError> {
        [("user.name", NAME_KEY), ("user.email", EMAIL_KEY)]
            .into_iter()
            .map(|(git_key, model_key)| {
                model
                    .get(model_key)
                    .map(|value| GitConfigResource::new(git_key, value, ctx.executor.as_ref()))
                    .ok_or_else(|| RenderError::MissingKey {
                        template: IDENTITY_STEP.to_string(),
                        key: model_key.to_string(),
                    })
            })
            .collect()
    }
}

impl Step for GitIdentityStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        "set git user.name and user.email".to_string()
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, ctx: &Context, model: &EnvironmentModel) -> Result<bool> {
        let Ok(resources) = Self::resources(ctx, model) else {
            return Ok(false);
        };
        for resource in &resources {
            if !resource_satisfied(resource)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply(&self, ctx: &Context, model: &EnvironmentModel) -> Result<Applied> {
        let mut changed = Vec::new();
        for resource in Self::resources(ctx, model)? {
            if resource.needs_change()? && resource.apply()? == ResourceChange::Applied {
                changed.push(resource.description());
            }
        }
        Ok(Applied::changed(if changed.is_empty() {
            "git identity already set".to_string()
        } else {
            changed.join(", ")
        }))
    }
}
