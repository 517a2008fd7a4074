use clap::{Parser, Subcommand};
use jobchain::{config::DEFAULT_LOG_DIR, logging};
use jobchain_analysis::{check::unfinished_logs, send, AnalysisError};
use std::{path::PathBuf, process::ExitCode};
use tracing::error;

/// Inspect the job logs of jobchain runs
#[derive(Parser, Debug)]
#[command(name = "joblogs", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the logs of chains that did not finish
    Check {
        #[arg(long, default_value = DEFAULT_LOG_DIR)]
        log_dir: PathBuf,
    },
    /// Run a command for every job id found in the logs, e.g. `bkill`
    Send {
        /// Command receiving the job id as last argument
        #[arg(long)]
        cmd: String,

        #[arg(long, default_value = DEFAULT_LOG_DIR)]
        log_dir: PathBuf,

        /// Glob or substring the log file name must match
        #[arg(long)]
        log_filter: Option<String>,
    },
}

fn run(cli: Cli) -> Result<(), AnalysisError> {
    match cli.command {
        Commands::Check { log_dir } => {
            for path in unfinished_logs(&log_dir)? {
                println!("{}", path.display());
            }
        }
        Commands::Send {
            cmd,
            log_dir,
            log_filter,
        } => {
            let ids = send::collect_job_ids(&log_dir, log_filter.as_deref())?;
            send::send_to_jobs(&cmd, &ids)?;
        }
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
