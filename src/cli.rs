//! Command-line arguments for the `provision` binary.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the workstation provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "provision",
    about = "Idempotent, declarative workstation provisioning",
    version
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Manifest path, relative to the root unless absolute
    #[arg(long, global = true, env = "PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the workspace root directory
    #[arg(long, global = true, env = "PROVISION_ROOT")]
    pub root: Option<PathBuf>,

    /// Never prompt; missing identity fields fail the steps that need them
    #[arg(long, global = true, env = "PROVISION_NONINTERACTIVE")]
    pub non_interactive: bool,

    /// Git user.name
    #[arg(long, global = true, env = "PROVISION_GIT_NAME")]
    pub name: Option<String>,

    /// Git user.email
    #[arg(long, global = true, env = "PROVISION_GIT_EMAIL")]
    pub email: Option<String>,

    /// Fallback version for every toolchain when the latest lookup fails
    #[arg(long, global = true, env = "PROVISION_DEFAULT_VERSION", hide = true)]
    pub default_version: Option<String>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision the workstation
    Run(RunOpts),
    /// List steps in execution order
    List,
    /// Generate shell completions
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

/// Options for the `run` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunOpts {
    /// Keep going after a step fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Run only specific step ids
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Probe every step without applying
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Options for the `completions` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompletionsOpts {
    /// Target shell
    pub shell: clap_complete::Shell,
}
