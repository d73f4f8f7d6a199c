//! The run loop: probe each step in dependency order, apply what is not
//! already satisfied, and record one [`Outcome`] per attempted step.
//!
//! The runner owns the [`EnvironmentModel`] for the duration of a run.  Steps
//! only ever see it by shared reference and hand back a
//! [`ModelDelta`](crate::model::ModelDelta) that the runner merges.
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::graph::topological_order;
use crate::error::{ConfigError, FailureKind, GraphError, ProvisionError};
use crate::logging::STEP_SPAN;
use crate::model::EnvironmentModel;
use crate::outcome::{Outcome, Status};
use crate::steps::{Context, Step};

/// A cheaply-clonable flag raised by the Ctrl-C handler.
///
/// The runner checks it before starting each step; a step already in flight
/// is never cancelled.
#[derive(Debug, Clone)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create a flag in the "not interrupted" state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raised: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request that the run stop before the next step.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Returns `true` once [`Self::raise`] has been called.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the run; later steps get no outcome.
    #[default]
    Abort,
    /// Keep going; steps depending on a failure are recorded as blocked.
    Continue,
}

/// Everything a finished (or stopped) run produced.
#[derive(Debug)]
pub struct RunResult {
    /// One outcome per attempted step, in execution order.
    pub outcomes: Vec<Outcome>,
    /// The model after every merged delta.
    pub model: EnvironmentModel,
    /// The run stopped early because of an interrupt.
    pub interrupted: bool,
}

impl RunResult {
    /// Whether any step failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.status() == Status::Failed)
    }

    /// Number of outcomes with `status`.
    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|o| o.status() == status).count()
    }
}

/// Order the registry and narrow it to an `--only` selection.
///
/// The whole registry is ordered first, so cycles and unknown dependencies
/// are reported even when the offending step is not selected.  With an empty
/// `only` every step is returned.
///
/// # Errors
///
/// Returns a [`GraphError`] from ordering, or
/// [`ConfigError::UnknownSelection`] if `only` names a step that does not
/// exist.
pub fn plan<'a>(
    steps: &[&'a dyn Step],
    only: &[String],
) -> Result<Vec<&'a dyn Step>, ProvisionError> {
    let order = topological_order(steps)?;

    if let Some(unknown) = only
        .iter()
        .find(|id| !steps.iter().any(|s| s.id() == id.as_str()))
    {
        return Err(ConfigError::UnknownSelection(unknown.clone()).into());
    }

    Ok(order
        .into_iter()
        .filter_map(|i| steps.get(i).copied())
        .filter(|s| only.is_empty() || only.iter().any(|id| id == s.id()))
        .collect())
}

/// Sequential step runner.
#[derive(Debug)]
pub struct Runner<'a> {
    ctx: &'a Context,
    policy: ErrorPolicy,
    interrupt: Interrupt,
}

impl<'a> Runner<'a> {
    /// Create a runner over `ctx`.
    #[must_use]
    pub fn new(ctx: &'a Context, policy: ErrorPolicy) -> Self {
        Self {
            ctx,
            policy,
            interrupt: Interrupt::new(),
        }
    }

    /// Use `interrupt` as the stop flag.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Order `steps` by dependency and run them.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] before any step runs if the steps cannot be
    /// ordered.
    pub fn run(
        &self,
        steps: &[&dyn Step],
        model: EnvironmentModel,
    ) -> Result<RunResult, GraphError> {
        let order = topological_order(steps)?;
        let ordered: Vec<&dyn Step> = order
            .into_iter()
            .filter_map(|i| steps.get(i).copied())
            .collect();
        Ok(self.execute(&ordered, model))
    }

    /// Run already-ordered steps.
    ///
    /// Only dependencies that failed in this run block a step; a dependency
    /// absent from `ordered` counts as satisfied.
    pub fn execute(&self, ordered: &[&dyn Step], mut model: EnvironmentModel) -> RunResult {
        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut failed: HashSet<&str> = HashSet::new();
        let mut interrupted = false;

        for &step in ordered {
            if self.interrupt.is_raised() {
                self.ctx.log.warn("interrupted; stopping before the next step");
                interrupted = true;
                break;
            }

            let blockers: Vec<&str> = step
                .depends_on()
                .iter()
                .map(String::as_str)
                .filter(|dep| failed.contains(dep))
                .collect();
            if !blockers.is_empty() {
                let detail = format!("blocked by {}", blockers.join(", "));
                self.ctx.log.warn(&format!("{}: {detail}", step.id()));
                outcomes.push(
                    Outcome::new(step.id(), Status::Failed, detail)
                        .with_failure_kind(FailureKind::Blocked),
                );
                failed.insert(step.id());
                continue;
            }

            let outcome = self.attempt(step, &mut model);
            let status = outcome.status();
            outcomes.push(outcome);

            if status == Status::Failed {
                failed.insert(step.id());
                if self.policy == ErrorPolicy::Abort {
                    self.ctx
                        .log
                        .error(&format!("{}: aborting the run", step.id()));
                    break;
                }
            }
        }

        RunResult {
            outcomes,
            model,
            interrupted,
        }
    }

    /// Probe, then apply if needed, and time the whole attempt.
    fn attempt(&self, step: &dyn Step, model: &mut EnvironmentModel) -> Outcome {
        let _span = tracing::info_span!(STEP_SPAN, id = step.id()).entered();
        let log = &self.ctx.log;
        log.stage(&step.description());
        log.debug(&format!("step id: {}", step.id()));

        let started = Instant::now();
        let outcome = self.probe_and_apply(step, model);
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        outcome.with_duration_ms(elapsed)
    }

    fn probe_and_apply(&self, step: &dyn Step, model: &mut EnvironmentModel) -> Outcome {
        let log = &self.ctx.log;

        let satisfied = match step.probe(self.ctx, model) {
            Ok(satisfied) => satisfied,
            Err(e) => return self.failure(step, &e.context("probe failed")),
        };

        if satisfied {
            let mut warnings = step.probe_warnings(self.ctx);
            for warning in &warnings {
                log.warn(warning);
            }
            match step.observe(self.ctx, model) {
                Ok(delta) => model.apply(delta),
                Err(e) => {
                    let warning = format!("could not read current facts: {e:#}");
                    log.warn(&warning);
                    warnings.push(warning);
                }
            }
            log.info("already satisfied");
            return Outcome::new(step.id(), Status::Skipped, "already satisfied")
                .with_warnings(warnings);
        }

        if self.ctx.dry_run {
            log.dry_run(&format!("would apply {}", step.id()));
            let warnings = step.probe_warnings(self.ctx);
            for warning in &warnings {
                log.warn(warning);
            }
            return Outcome::new(step.id(), Status::DryRun, step.description())
                .with_warnings(warnings);
        }

        match step.apply(self.ctx, model) {
            Ok(applied) => {
                for warning in &applied.warnings {
                    log.warn(warning);
                }
                model.apply(applied.delta);
                let status = if applied.manual {
                    log.warn(&format!("manual action required: {}", applied.detail));
                    Status::RequiresManualStep
                } else {
                    log.info(&applied.detail);
                    Status::Applied
                };
                Outcome::new(step.id(), status, applied.detail).with_warnings(applied.warnings)
            }
            Err(e) => self.failure(step, &e),
        }
    }

    fn failure(&self, step: &dyn Step, err: &anyhow::Error) -> Outcome {
        let detail = format!("{err:#}");
        self.ctx.log.error(&format!("{}: {detail}", step.id()));
        Outcome::new(step.id(), Status::Failed, detail)
            .with_failure_kind(FailureKind::classify(err))
            .with_rollback_hint(step.rollback_hint())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use anyhow::Result;

    use super::*;
    use crate::error::{RenderError, StepError};
    use crate::model::ModelDelta;
    use crate::resources::test_helpers::MockExecutor;
    use crate::steps::Applied;
    use crate::steps::test_helpers::context;

    #[derive(Default)]
    struct FakeStep {
        id: String,
        deps: Vec<String>,
        satisfied: bool,
        fails: bool,
        manual: bool,
        needs: Option<&'static str>,
        provides: Option<(&'static str, &'static str)>,
        applies: AtomicUsize,
    }

    impl FakeStep {
        fn new(id: &str, deps: &[&str]) -> Self {
            Self {
                id: id.to_string(),
                deps: deps.iter().map(|d| (*d).to_string()).collect(),
                ..Self::default()
            }
        }

        fn satisfied(mut self) -> Self {
            self.satisfied = true;
            self
        }

        fn failing(mut self) -> Self {
            self.fails = true;
            self
        }

        fn manual(mut self) -> Self {
            self.manual = true;
            self
        }

        fn needs(mut self, key: &'static str) -> Self {
            self.needs = Some(key);
            self
        }

        fn provides(mut self, key: &'static str, value: &'static str) -> Self {
            self.provides = Some((key, value));
            self
        }

        fn delta(&self) -> ModelDelta {
            let mut delta = ModelDelta::new();
            if let Some((k, v)) = self.provides {
                delta.push(k, v);
            }
            delta
        }
    }

    impl Step for FakeStep {
        fn id(&self) -> &str {
            &self.id
        }
        fn description(&self) -> String {
            format!("fake {}", self.id)
        }
        fn depends_on(&self) -> &[String] {
            &self.deps
        }
        fn probe(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<bool> {
            Ok(self.satisfied)
        }
        fn observe(&self, _ctx: &Context, _model: &EnvironmentModel) -> Result<ModelDelta> {
            Ok(self.delta())
        }
        fn apply(&self, _ctx: &Context, model: &EnvironmentModel) -> Result<Applied> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            if let Some(key) = self.needs
                && !model.contains(key)
            {
                return Err(RenderError::MissingKey {
                    template: self.id.clone(),
                    key: key.to_string(),
                }
                .into());
            }
            if self.fails {
                return Err(StepError::PermissionDenied("/usr/local".into()).into());
            }
            if self.manual {
                return Ok(Applied::manual("register the key"));
            }
            Ok(Applied::changed(format!("applied {}", self.id)).with_delta(self.delta()))
        }
        fn rollback_hint(&self) -> Option<String> {
            Some(format!("undo {}", self.id))
        }
    }

    fn statuses(result: &RunResult) -> Vec<String> {
        result
            .outcomes
            .iter()
            .map(|o| format!("{} {}", o.step_id(), o.status()))
            .collect()
    }

    fn refs(steps: &[FakeStep]) -> Vec<&dyn Step> {
        steps.iter().map(|s| s as &dyn Step).collect()
    }

    fn ctx() -> Context {
        context(Arc::new(MockExecutor::ok("")), Path::new("/home/dev")).0
    }

    #[test]
    fn applies_unsatisfied_and_skips_satisfied() {
        let steps = vec![
            FakeStep::new("template:a", &["toolchain:go"]).needs("toolchain.go.version"),
            FakeStep::new("toolchain:go", &[]).provides("toolchain.go.version", "1.22.1"),
            FakeStep::new("package:git", &[]).satisfied(),
        ];
        let ctx = ctx();
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        insta::assert_snapshot!(statuses(&result).join("\n"), @r"
        toolchain:go applied
        template:a applied
        package:git skipped
        ");
        assert_eq!(result.model.get("toolchain.go.version"), Some("1.22.1"));
        assert_eq!(steps[2].applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn skipped_steps_still_publish_facts() {
        let steps = vec![
            FakeStep::new("toolchain:go", &[])
                .satisfied()
                .provides("toolchain.go.version", "1.22.1"),
            FakeStep::new("template:a", &["toolchain:go"]).needs("toolchain.go.version"),
        ];
        let ctx = ctx();
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        assert_eq!(result.count(Status::Applied), 1);
        assert!(!result.has_failures());
    }

    #[test]
    fn abort_stops_after_first_failure() {
        let steps = vec![
            FakeStep::new("package:a", &[]).failing(),
            FakeStep::new("package:b", &[]),
        ];
        let ctx = ctx();
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        assert_eq!(statuses(&result), vec!["package:a failed"]);
        let failed = &result.outcomes[0];
        assert_eq!(failed.failure_kind(), Some(FailureKind::PermissionDenied));
        assert_eq!(failed.rollback_hint(), Some("undo package:a"));
        assert_eq!(steps[1].applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn continue_blocks_dependents_transitively() {
        let steps = vec![
            FakeStep::new("package:a", &[]).failing(),
            FakeStep::new("toolchain:b", &["package:a"]),
            FakeStep::new("profile:c", &["toolchain:b"]),
            FakeStep::new("package:d", &[]),
        ];
        let ctx = ctx();
        let result = Runner::new(&ctx, ErrorPolicy::Continue)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        insta::assert_snapshot!(statuses(&result).join("\n"), @r"
        package:a failed
        toolchain:b failed
        profile:c failed
        package:d applied
        ");
        assert_eq!(result.outcomes[1].detail(), "blocked by package:a");
        assert_eq!(
            result.outcomes[2].failure_kind(),
            Some(FailureKind::Blocked)
        );
        assert_eq!(steps[1].applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_key_is_classified() {
        let steps = vec![FakeStep::new("template:a", &[]).needs("identity.email")];
        let ctx = ctx();
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        assert_eq!(
            result.outcomes[0].failure_kind(),
            Some(FailureKind::MissingKey)
        );
    }

    #[test]
    fn manual_steps_are_not_failures() {
        let steps = vec![FakeStep::new("ssh-register:github.com", &[]).manual()];
        let ctx = ctx();
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        assert_eq!(result.count(Status::RequiresManualStep), 1);
        assert!(!result.has_failures());
    }

    #[test]
    fn dry_run_probes_without_applying() {
        let steps = vec![
            FakeStep::new("package:a", &[]),
            FakeStep::new("package:b", &[]).satisfied(),
        ];
        let mut ctx = ctx();
        ctx.dry_run = true;
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        assert_eq!(statuses(&result), vec!["package:a dry-run", "package:b skipped"]);
        assert_eq!(steps[0].applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn interrupt_stops_before_next_step() {
        let steps = vec![FakeStep::new("package:a", &[])];
        let ctx = ctx();
        let interrupt = Interrupt::new();
        interrupt.raise();
        let result = Runner::new(&ctx, ErrorPolicy::Abort)
            .with_interrupt(interrupt)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap();
        assert!(result.interrupted);
        assert!(result.outcomes.is_empty());
    }

    #[test]
    fn cycle_fails_before_any_step() {
        let steps = vec![
            FakeStep::new("a", &["b"]),
            FakeStep::new("b", &["a"]),
            FakeStep::new("c", &[]),
        ];
        let ctx = ctx();
        let err = Runner::new(&ctx, ErrorPolicy::Abort)
            .run(&refs(&steps), EnvironmentModel::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected(_)));
        assert!(steps.iter().all(|s| s.applies.load(Ordering::SeqCst) == 0));
    }

    #[test]
    fn plan_selects_in_dependency_order() {
        let steps = vec![
            FakeStep::new("profile:path", &["toolchain:go"]),
            FakeStep::new("toolchain:go", &["package:curl"]),
            FakeStep::new("package:curl", &[]),
        ];
        let all = refs(&steps);
        let only = vec!["profile:path".to_string(), "toolchain:go".to_string()];
        let planned: Vec<&str> = plan(&all, &only).unwrap().iter().map(|s| s.id()).collect();
        assert_eq!(planned, vec!["toolchain:go", "profile:path"]);

        let everything: Vec<&str> = plan(&all, &[]).unwrap().iter().map(|s| s.id()).collect();
        assert_eq!(everything, vec!["package:curl", "toolchain:go", "profile:path"]);
    }

    #[test]
    fn plan_rejects_unknown_selection() {
        let steps = vec![FakeStep::new("package:git", &[])];
        let err = plan(&refs(&steps), &["package:gti".to_string()])
            .err()
            .expect("unknown selection is rejected");
        assert!(matches!(
            err,
            ProvisionError::Config(ConfigError::UnknownSelection(ref id)) if id == "package:gti"
        ));
    }

    #[test]
    fn selected_step_runs_without_its_dependencies() {
        let steps = vec![
            FakeStep::new("package:curl", &[]).failing(),
            FakeStep::new("toolchain:go", &["package:curl"]),
        ];
        let all = refs(&steps);
        let selected = plan(&all, &["toolchain:go".to_string()]).unwrap();
        let ctx = ctx();
        let result =
            Runner::new(&ctx, ErrorPolicy::Abort).execute(&selected, EnvironmentModel::new());
        assert_eq!(statuses(&result), vec!["toolchain:go applied"]);
    }
}
