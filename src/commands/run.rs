//! Command: provision the workstation.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::{CommandSetup, Exit};
use crate::cli::{GlobalOpts, RunOpts};
use crate::config::Config;
use crate::config::identity::{Prompter, TerminalPrompter};
use crate::engine::{ErrorPolicy, Interrupt, Runner, plan};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger, terminal_columns};
use crate::model::EnvironmentModel;
use crate::report;
use crate::resolver::{UreqFetch, VersionResolver};
use crate::steps::{Context, Step, registry};

/// Model keys seeded before the first step.
pub const HOME_KEY: &str = "home";
/// See [`HOME_KEY`].
pub const INSTALL_ROOT_KEY: &str = "install_root";

/// The model every run starts from: home, install root and identity.
#[must_use]
pub fn initial_model(config: &Config) -> EnvironmentModel {
    let mut model = EnvironmentModel::new();
    model.set(HOME_KEY, config.home.display().to_string());
    model.set(INSTALL_ROOT_KEY, config.install_root().display().to_string());
    model.apply(config.identity.to_delta());
    model
}

/// Run the provisioning command.
///
/// # Errors
///
/// Returns an error if configuration loading, registry building or step
/// ordering fails.  Step failures are reported through the returned
/// [`Exit`].
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<Exit> {
    log.info(&format!("provision {}", super::version::version()));

    let prompter: Option<&dyn Prompter> = if global.non_interactive || opts.json {
        None
    } else {
        Some(&TerminalPrompter)
    };
    let setup = CommandSetup::init(global, log.as_ref(), prompter)?;
    let config = setup.config;

    let timeout = Duration::from_secs(config.manifest.settings.version_timeout_secs);
    let ctx = Context {
        executor: Arc::new(SystemExecutor) as Arc<dyn Executor>,
        log: Arc::clone(log) as Arc<dyn Log>,
        resolver: Arc::new(VersionResolver::new(Box::new(UreqFetch::new(timeout)))),
        home: config.home.clone(),
        dry_run: opts.dry_run,
    };

    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.raise()) {
        log.warn(&format!("cannot install Ctrl-C handler: {e}"));
    }

    let exit = execute(&config, opts, &ctx, interrupt)?;
    if let Some(path) = log.log_path() {
        log.info(&format!("log file: {}", path.display()));
    }
    Ok(exit)
}

/// Build, order and run the steps, then report.
///
/// Split from [`run`] so it can be driven with a test context.
///
/// # Errors
///
/// Returns an error if the registry cannot be built, the steps cannot be
/// ordered, or `--only` names an unknown step.
pub fn execute(config: &Config, opts: &RunOpts, ctx: &Context, interrupt: Interrupt) -> Result<Exit> {
    log_plan_header(ctx.log.as_ref(), opts);

    let steps = registry::build(config)?;
    let all: Vec<&dyn Step> = steps.iter().map(AsRef::as_ref).collect();
    let ordered = plan(&all, &opts.only)?;
    ctx.log
        .debug(&format!("{} of {} steps selected", ordered.len(), all.len()));

    let policy = if opts.continue_on_error {
        ErrorPolicy::Continue
    } else {
        ErrorPolicy::Abort
    };
    let result = Runner::new(ctx, policy)
        .with_interrupt(interrupt)
        .execute(&ordered, initial_model(config));

    let mut summary = report::summarize(&result.outcomes);
    summary.interrupted = result.interrupted;
    report::log_report(&summary, ctx.log.as_ref(), terminal_columns());
    if opts.json {
        report::print_json(&summary)?;
    }
    if result.has_failures() && policy == ErrorPolicy::Continue && !result.interrupted {
        ctx.log.warn(&format!(
            "{} step(s) failed; exiting 0 because of --continue-on-error",
            summary.counts.failed
        ));
    }

    Ok(if result.interrupted {
        Exit::Interrupted
    } else if result.has_failures() && policy == ErrorPolicy::Abort {
        Exit::StepsFailed
    } else {
        Exit::Success
    })
}

fn log_plan_header(log: &dyn Log, opts: &RunOpts) {
    if opts.dry_run {
        log.dry_run("probing only; nothing will be changed");
    }
    if !opts.only.is_empty() {
        log.info(&format!("only: {}", opts.only.join(", ")));
    }
}
