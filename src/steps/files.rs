//! Rendered files: whole-file templates and marker-delimited profile blocks.
//!
//! Both probe by rendering and comparing exact content.  A missing model
//! key makes the probe report "not satisfied" and the apply fail with
//! [`RenderError::MissingKey`](crate::error::RenderError::MissingKey)
//! before anything is written.
use anyhow::Result;
use std::path::PathBuf;

use super::{Applied, Context, Step, StepHeader, converge, resource_satisfied};
use crate::model::EnvironmentModel;
use crate::resources::file::FileResource;
use crate::resources::file_block::FileBlockResource;
use crate::template::{Template, render};

/// `template:<name>`: a file fully owned by the provisioner.
#[derive(Debug, Clone)]
pub struct TemplateStep {
    header: StepHeader,
    template: Template,
    dest: PathBuf,
}

impl TemplateStep {
    /// Create a template step writing to `dest`.
    #[must_use]
    pub const fn new(header: StepHeader, template: Template, dest: PathBuf) -> Self {
        Self {
            header,
            template,
            dest,
        }
    }
}

impl Step for TemplateStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("render {} to {}", self.template.name(), self.dest.display())
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, _ctx: &Context, model: &EnvironmentModel) -> Result<bool> {
        let Ok(contents) = render(&self.template, model) else {
            return Ok(false);
        };
        resource_satisfied(&FileResource::new(self.dest.clone(), contents))
    }

    fn apply(&self, _ctx: &Context, model: &EnvironmentModel) -> Result<Applied> {
        let contents = render(&self.template, model)?;
        converge(&FileResource::new(self.dest.clone(), contents))
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!(
            "restore the newest {}.provision-bak.* backup",
            self.dest.display()
        ))
    }
}

/// `profile:<id>`: a block between `provision:<id>` markers in a shell rc.
#[derive(Debug, Clone)]
pub struct ProfileStep {
    header: StepHeader,
    block_id: String,
    template: Template,
    file: PathBuf,
}

impl ProfileStep {
    /// Create a profile block step.
    #[must_use]
    pub const fn new(header: StepHeader, block_id: String, template: Template, file: PathBuf) -> Self {
        Self {
            header,
            block_id,
            template,
            file,
        }
    }

    fn resource(&self, body: String) -> FileBlockResource {
        FileBlockResource::new(self.file.clone(), self.block_id.clone(), body)
    }
}

impl Step for ProfileStep {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn description(&self) -> String {
        format!("update {} block in {}", self.block_id, self.file.display())
    }

    fn depends_on(&self) -> &[String] {
        &self.header.depends_on
    }

    fn probe(&self, _ctx: &Context, model: &EnvironmentModel) -> Result<bool> {
        let Ok(body) = render(&self.template, model) else {
            return Ok(false);
        };
        resource_satisfied(&self.resource(body))
    }

    fn apply(&self, _ctx: &Context, model: &EnvironmentModel) -> Result<Applied> {
        let body = render(&self.template, model)?;
        converge(&self.resource(body))
    }

    fn rollback_hint(&self) -> Option<String> {
        Some(format!(
            "delete the provision:{} block from {}",
            self.block_id,
            self.file.display()
        ))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, RenderError};
    use crate::resources::test_helpers::MockExecutor;
    use crate::steps::test_helpers::context;
    use std::sync::Arc;

    fn gitconfig(dest: PathBuf) -> TemplateStep {
        TemplateStep::new(
            StepHeader::new("template:gitconfig".into(), Vec::new()),
            Template::new(
                "gitconfig",
                "[user]\n\tname = {{ identity.name }}\n\temail = {{ identity.email }}\n",
                Vec::new(),
            ),
            dest,
        )
    }

    #[test]
    fn missing_key_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(".gitconfig");
        std::fs::write(&dest, "original\n").unwrap();
        let (ctx, _) = context(Arc::new(MockExecutor::default()), dir.path());
        let mut model = EnvironmentModel::new();
        model.set("identity.name", "Ada");

        let step = gitconfig(dest.clone());
        assert!(!step.probe(&ctx, &model).unwrap());
        let err = step.apply(&ctx, &model).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::MissingKey { key, .. }) if key == "identity.email"
        ));
        assert_eq!(FailureKind::classify(&err), FailureKind::MissingKey);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "original\n");
    }

    #[test]
    fn rendered_template_probes_satisfied_after_apply() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(".gitconfig");
        let (ctx, _) = context(Arc::new(MockExecutor::default()), dir.path());
        let mut model = EnvironmentModel::new();
        model.set("identity.name", "Ada");
        model.set("identity.email", "ada@example.com");

        let step = gitconfig(dest.clone());
        step.apply(&ctx, &model).unwrap();
        assert!(step.probe(&ctx, &model).unwrap());
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "[user]\n\tname = Ada\n\temail = ada@example.com\n"
        );
    }

    #[test]
    fn profile_block_is_upserted_once() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".zshrc");
        std::fs::write(&rc, "export EDITOR=vim\n").unwrap();
        let (ctx, _) = context(Arc::new(MockExecutor::default()), dir.path());
        let mut model = EnvironmentModel::new();
        model.set("toolchain.go.bin", "/opt/go/bin");

        let step = ProfileStep::new(
            StepHeader::new("profile:path".into(), Vec::new()),
            "path".into(),
            Template::new("path", "export PATH=\"{{ toolchain.go.bin }}:$PATH\"", Vec::new()),
            rc.clone(),
        );
        step.apply(&ctx, &model).unwrap();
        step.apply(&ctx, &model).unwrap();
        assert!(step.probe(&ctx, &model).unwrap());
        let text = std::fs::read_to_string(&rc).unwrap();
        assert!(text.starts_with("export EDITOR=vim\n"));
        assert_eq!(text.matches("# >>> provision:path >>>").count(), 1);
        assert!(text.contains("export PATH=\"/opt/go/bin:$PATH\""));
    }
}
