use super::{util, RunError};
use crate::{
    config::{resolve_executable, Workspace},
    executable::{Executables, Stage},
    sync::JobLog,
    tasks::{self, Index},
};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Arguments of one rank of an MPI pool
#[derive(Debug, Clone)]
pub struct MpiWorkerArgs {
    pub job_name: String,
    pub executable: PathBuf,
    /// Only the first index is used, the pool works on a single task
    pub tasks: String,
    pub log_dir: Option<PathBuf>,
    pub function_args: Vec<String>,
}

/// Entry point of every rank of an MPI pool.
///
/// `main` runs over a single task and exactly one element is taken from it, the executable
/// distributes the work over the ranks itself. Only the master writes to the job log.
#[instrument(skip_all, fields(job = %args.job_name))]
pub fn run_mpi_worker(args: &MpiWorkerArgs) -> Result<Index, RunError> {
    let is_master = util::mpi_rank() == 0;

    let executable_path = resolve_executable(&args.executable)?;
    let executable = Executables::load(&executable_path)?;
    let job_log = match &args.log_dir {
        Some(log_dir) if is_master => Some(JobLog::new(
            Workspace::current(log_dir)?.job_log(&args.job_name),
        )),
        _ => None,
    };
    let task = tasks::parse_indices(&args.tasks)?
        .first()
        .copied()
        .unwrap_or(0);

    util::cd_local_scratch(is_master)?;

    let log = |line: &str| {
        if let Some(job_log) = &job_log {
            if let Err(error) = job_log.write(line) {
                warn!(error = ?error, "Failed to write to job log");
            }
        }
    };

    if is_master {
        info!("##### Running main function in MPI environment #####");
        log("Running main");
    }

    let index = executable.take_one(&Stage::Main, vec![task], &args.function_args)?;

    if is_master {
        info!("Finished running main on task {index}");
        log("Finished running main");
    }

    Ok(index)
}
