//! Command: list steps in execution order.
use std::io::Write as _;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::engine::plan;
use crate::logging::Log;
use crate::steps::{Step, registry};

/// Lines of the listing: id, description and dependencies.
#[must_use]
pub fn render(ordered: &[&dyn Step]) -> Vec<String> {
    let width = ordered.iter().map(|s| s.id().len()).max().unwrap_or(0);
    ordered
        .iter()
        .map(|step| {
            let line = format!("{:<width$}  {}", step.id(), step.description());
            if step.depends_on().is_empty() {
                line
            } else {
                format!("{line} (after {})", step.depends_on().join(", "))
            }
        })
        .collect()
}

/// Print every step id in execution order.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or the steps cannot be
/// ordered.
pub fn run(global: &GlobalOpts, log: &dyn Log) -> Result<()> {
    let setup = CommandSetup::init(global, log, None)?;
    let steps = registry::build(&setup.config)?;
    let all: Vec<&dyn Step> = steps.iter().map(AsRef::as_ref).collect();
    let ordered = plan(&all, &[])?;

    let mut out = std::io::stdout().lock();
    for line in render(&ordered) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
