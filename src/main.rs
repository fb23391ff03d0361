use anyhow::Result;
use clap::Parser;

use confbundler::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init_subscriber(args.verbose);
    let log = logging::Logger::new();

    let result = match &args.command {
        cli::Command::Compile(opts) => commands::compile::run(&args.global, opts, &log),
        cli::Command::Plan(opts) => commands::plan::run(&args.global, opts, &log),
        cli::Command::Completions(opts) => {
            commands::completions::run(opts);
            Ok(())
        }
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    };
    if let Err(e) = &result {
        log.error(&format!("{e:#}"));
    }
    result
}
