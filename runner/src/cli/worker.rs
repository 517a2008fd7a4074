use super::CliError;
use crate::{
    config::{parse_n_cores, DEFAULT_LOG_DIR},
    distributed::{
        array::{run_worker, WorkerArgs},
        mpi::{run_mpi_worker, MpiWorkerArgs},
    },
    executors::BatchSystem,
    scheduler::plan::Function,
};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct WorkerCommand {
    #[arg(long)]
    pub job_name: String,

    #[arg(long, default_value = "main")]
    pub function: Function,

    #[arg(long)]
    pub executable: PathBuf,

    /// Index file or task specification shared by all tasks of the array
    #[arg(long)]
    pub tasks: String,

    /// Size of the job array
    #[arg(long, default_value_t = 1, value_parser = parse_n_cores)]
    pub n_cores: usize,

    /// Decides which environment variable holds the task number
    #[arg(long, default_value = "detect")]
    pub system: String,

    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    #[arg(last = true)]
    pub function_args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MpiWorkerCommand {
    #[arg(long, default_value = "job")]
    pub job_name: String,

    #[arg(long)]
    pub executable: PathBuf,

    /// The first index is the single task of the pool
    #[arg(long, default_value = "0")]
    pub tasks: String,

    /// Job log of the master rank, nothing is logged without it
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    #[arg(last = true)]
    pub function_args: Vec<String>,
}

pub fn run(command: WorkerCommand) -> Result<(), CliError> {
    let args = WorkerArgs {
        system: BatchSystem::resolve(&command.system)?,
        job_name: command.job_name,
        function: command.function,
        executable: command.executable,
        tasks: command.tasks,
        n_cores: command.n_cores,
        log_dir: command.log_dir,
        function_args: command.function_args,
    };

    let finished = run_worker(&args)?;
    info!("Task done, {} indices processed", finished.len());

    Ok(())
}

pub fn run_mpi(command: MpiWorkerCommand) -> Result<(), CliError> {
    run_mpi_worker(&MpiWorkerArgs {
        job_name: command.job_name,
        executable: command.executable,
        tasks: command.tasks,
        log_dir: command.log_dir,
        function_args: command.function_args,
    })?;

    Ok(())
}
