//! Plan command implementation.
use anyhow::{Context as _, Result};
use std::io::Write as _;

use crate::backend::{PlanBackend, PlanFormat};
use crate::cli::{GlobalOpts, PlanOpts};
use crate::logging::Logger;

/// Run the plan command, printing the resolved sequence to stdout.
///
/// # Errors
///
/// Returns an error if loading or resolving the manifests fails.
pub fn run(global: &GlobalOpts, opts: &PlanOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, &opts.manifests, log)?;

    log.stage("Resolving");
    let artifact = setup
        .compiler
        .compile_to_vec(&PlanBackend::new(format(opts)))
        .context("planning failed")?;
    super::report_warnings(&artifact.warnings, log);

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&artifact.bytes)
        .and_then(|()| stdout.flush())
        .context("writing plan to stdout")?;
    log.finish("plan complete");
    Ok(())
}

const fn format(opts: &PlanOpts) -> PlanFormat {
    if opts.json {
        PlanFormat::Json
    } else {
        PlanFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_json_format() {
        let mut opts = PlanOpts {
            manifests: Vec::new(),
            json: false,
        };
        assert_eq!(format(&opts), PlanFormat::Text);
        opts.json = true;
        assert_eq!(format(&opts), PlanFormat::Json);
    }
}
