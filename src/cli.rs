use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI entry point for the configuration bundler.
#[derive(Parser, Debug)]
#[command(
    name = "confbundler",
    about = "Compile declarative filesystem manifests into deployable archives",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Settings file (defaults to ./confbundler.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Treat overrides that change a value as conflicts
    #[arg(long, global = true)]
    pub strict: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile manifests into a tar archive
    Compile(CompileOpts),
    /// Show the resolved sequence without producing an archive
    Plan(PlanOpts),
    /// Generate shell completions
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

/// Options for the `compile` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompileOpts {
    /// Manifest files, concatenated in the order given
    #[arg(required = true)]
    pub manifests: Vec<PathBuf>,

    /// Output archive path, or `-` for stdout
    #[arg(short, long)]
    pub output: PathBuf,

    /// Overwrite the output file if it exists
    #[arg(short, long)]
    pub force: bool,

    /// Modification time for entries that do not declare one
    #[arg(long)]
    pub mtime: Option<u64>,
}

/// Options for the `plan` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct PlanOpts {
    /// Manifest files, concatenated in the order given
    #[arg(required = true)]
    pub manifests: Vec<PathBuf>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Options for the `completions` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompletionsOpts {
    /// Target shell
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_compile() {
        let cli = Cli::parse_from([
            "confbundler",
            "compile",
            "base.toml",
            "ssh.toml",
            "-o",
            "out.tar",
        ]);
        let Command::Compile(opts) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(
            opts.manifests,
            vec![PathBuf::from("base.toml"), PathBuf::from("ssh.toml")]
        );
        assert_eq!(opts.output, PathBuf::from("out.tar"));
        assert!(!opts.force);
        assert_eq!(opts.mtime, None);
    }

    #[test]
    fn parse_compile_to_stdout_with_force() {
        let cli = Cli::parse_from(["confbundler", "compile", "m.toml", "-o", "-", "--force"]);
        let Command::Compile(opts) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(opts.output, PathBuf::from("-"));
        assert!(opts.force);
    }

    #[test]
    fn compile_requires_a_manifest() {
        assert!(Cli::try_parse_from(["confbundler", "compile", "-o", "out.tar"]).is_err());
    }

    #[test]
    fn compile_requires_an_output() {
        assert!(Cli::try_parse_from(["confbundler", "compile", "m.toml"]).is_err());
    }

    #[test]
    fn parse_plan_json() {
        let cli = Cli::parse_from(["confbundler", "plan", "m.toml", "--json"]);
        assert!(matches!(cli.command, Command::Plan(PlanOpts { json: true, .. })));
    }

    #[test]
    fn parse_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "confbundler",
            "plan",
            "m.toml",
            "--strict",
            "-v",
            "--config",
            "bundler.toml",
        ]);
        assert!(cli.global.strict);
        assert!(cli.verbose);
        assert_eq!(cli.global.config, Some(PathBuf::from("bundler.toml")));
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["confbundler", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Command::Completions(CompletionsOpts {
                shell: clap_complete::Shell::Bash
            })
        ));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["confbundler", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }
}
