//! Command: generate shell completions.
use clap::CommandFactory as _;

use crate::cli::{Cli, CompletionsOpts};

/// Write completions for the requested shell to stdout.
pub fn run(opts: &CompletionsOpts) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(opts.shell, &mut command, name, &mut std::io::stdout());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bash_completions_mention_subcommands() {
        let mut out = Vec::new();
        clap_complete::generate(
            clap_complete::Shell::Bash,
            &mut Cli::command(),
            "confbundler",
            &mut out,
        );
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("compile"));
        assert!(script.contains("plan"));
    }
}
