use super::{run_function, util, RunError, TaskEnv};
use crate::{
    config::{resolve_executable, Workspace},
    executable::Executables,
    executors::BatchSystem,
    scheduler::plan::Function,
    sync::{JobLog, Ledger},
    tasks::{self, describe, Index},
};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Arguments of one task of a job array
#[derive(Debug, Clone)]
pub struct WorkerArgs {
    pub job_name: String,
    pub function: Function,
    pub executable: PathBuf,
    /// Task specification, usually the index file written at submission
    pub tasks: String,
    pub n_cores: usize,
    pub system: BatchSystem,
    pub log_dir: PathBuf,
    pub function_args: Vec<String>,
}

/// Entry point of a job array task: run the function over the partition of this task
#[instrument(skip_all, fields(job = %args.job_name, function = %args.function))]
pub fn run_worker(args: &WorkerArgs) -> Result<Vec<Index>, RunError> {
    let rank = util::array_rank(args.system)?;
    let executable_path = resolve_executable(&args.executable)?;
    let executable = Executables::load(&executable_path)?;

    run_worker_with(args, &executable, rank)
}

/// Same as `run_worker` with an already loaded executable and an explicit rank
pub fn run_worker_with(
    args: &WorkerArgs,
    executable: &Executables,
    rank: usize,
) -> Result<Vec<Index>, RunError> {
    // paths are fixed before a possible move into local scratch
    let workspace = Workspace::current(&args.log_dir)?;
    let indices = tasks::parse_indices(&args.tasks)?;
    let rerun_file = tasks::rerun_path(&std::env::current_dir()?.join(Path::new(&args.tasks)));

    util::cd_local_scratch(true)?;

    let partition = tasks::partition(&indices, args.n_cores, rank).to_vec();
    info!(
        "Task {rank} of {} running on {} indices: {}",
        args.n_cores,
        partition.len(),
        describe(&partition)
    );

    let env = TaskEnv {
        executable,
        args: &args.function_args,
        ledger: Ledger::new(workspace.ledger(&args.job_name)),
        job_log: Some(JobLog::new(workspace.job_log(&args.job_name))),
        rerun_file,
        wait_for_ledger: true,
    };

    run_function(&env, &args.function, partition)
}
