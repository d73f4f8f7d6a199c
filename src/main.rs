//! `provision` binary: parses arguments, installs logging and maps the
//! command result to an exit code.
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use workstation_provision::cli::{Cli, Command};
use workstation_provision::commands::{self, Exit};
use workstation_provision::logging::{self, ConsoleOutput, Logger};

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    let (name, json) = match &args.command {
        Command::Run(opts) => ("run", opts.json),
        Command::List => ("list", false),
        Command::Completions(_) => ("completions", false),
        Command::Version => ("version", false),
    };
    let output = if json {
        ConsoleOutput::Stderr
    } else {
        ConsoleOutput::Split
    };
    logging::init_subscriber(args.verbose, name, output);
    let log = Arc::new(Logger::new(name));

    let result = match &args.command {
        Command::Run(opts) => commands::run::run(&args.global, opts, &log),
        Command::List => commands::list::run(&args.global, log.as_ref()).map(|()| Exit::Success),
        Command::Completions(opts) => {
            commands::completions::run(opts);
            Ok(Exit::Success)
        }
        Command::Version => commands::version::run().map(|()| Exit::Success),
    };

    match result {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(e) => {
            log.error(&format!("{e:#}"));
            ExitCode::from(commands::error_exit_code(&e))
        }
    }
}
