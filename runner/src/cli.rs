//! Command line of the `jobchain` binary.

pub mod submit;
pub mod worker;

#[cfg(test)]
mod cli_test;

use crate::{
    config::ConfigErrors, distributed::RunError, executable::ExecutableError,
    executors::ExecutorError, scheduler::SchedulerError, tasks::TaskSpecError,
};
use clap::{Parser, Subcommand};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("Failed to load executable")]
    Executable(#[from] ExecutableError),
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Tasks(#[from] TaskSpecError),
    #[error("I/O failed")]
    Io(#[from] std::io::Error),
}

/// Run the stages of an executable over a set of indices, locally or as chained cluster jobs
#[derive(Parser, Debug)]
#[command(name = "jobchain", version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run or submit the chain of an executable
    Submit(submit::SubmitArgs),
    /// Run one task of a job array, started by the queuing system
    Worker(worker::WorkerCommand),
    /// Run one rank of an MPI pool, started by mpirun or srun
    MpiWorker(worker::MpiWorkerCommand),
}

impl Commands {
    pub fn run(self) -> Result<(), CliError> {
        match self {
            Self::Submit(args) => submit::run(args),
            Self::Worker(args) => worker::run(args),
            Self::MpiWorker(args) => worker::run_mpi(args),
        }
    }
}
