use clap::Parser;
use jobchain::{executors::transport::RetryPolicy, logging, BatchSystem};
use jobchain_pipeline::{load_pipeline, DryRunSubmitter, Expander, PipelineError, ShellSubmitter};
use std::{path::PathBuf, process::ExitCode};
use tracing::error;

/// Submit the jobs of a pipeline file to a queuing system
#[derive(Parser, Debug)]
#[command(name = "jobpipe", version, about)]
struct Cli {
    /// YAML list of parameters, job and loop steps
    pipeline: PathBuf,

    /// Do not fail when a submission prints no job id
    #[arg(long)]
    ignore_jobid_errors: bool,

    /// lsf, slurm or detect to read $BATCH_SYSTEM
    #[arg(long, default_value = "detect")]
    system: String,

    /// Print the commands instead of running them
    #[arg(long)]
    dry_run: bool,
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let steps = load_pipeline(&cli.pipeline)?;
    let system = BatchSystem::resolve(&cli.system)?;
    let assert_ids = !cli.ignore_jobid_errors;

    let context = if cli.dry_run {
        Expander::new(DryRunSubmitter::default(), system, assert_ids).run(&steps)?
    } else {
        let submitter = ShellSubmitter::new(system, RetryPolicy::default());
        Expander::new(submitter, system, assert_ids).run(&steps)?
    };

    for name in context.registry.names() {
        let ids = context.registry.get(name).unwrap_or_default();
        tracing::debug!("{name}: {ids:?}");
    }

    Ok(())
}

fn main() -> ExitCode {
    logging::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", logging::report(&e));

            ExitCode::FAILURE
        }
    }
}
