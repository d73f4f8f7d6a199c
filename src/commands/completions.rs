//! Command: generate shell completions.
use clap::CommandFactory as _;

use crate::cli::{Cli, CompletionsOpts};

/// Write the completion script for the requested shell to stdout.
pub fn run(opts: &CompletionsOpts) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(opts.shell, &mut cmd, name, &mut std::io::stdout().lock());
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_names_subcommands() {
        let mut cmd = Cli::command();
        let mut buf = Vec::new();
        clap_complete::generate(clap_complete::Shell::Bash, &mut cmd, "provision", &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("provision"));
        assert!(script.contains("completions"));
    }
}
