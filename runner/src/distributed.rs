//! Execution of functions over sets of indices, shared by local runs and the worker entry points
//! that run inside jobs of a queuing system.

pub mod array;
pub mod mpi;
pub mod util;

#[cfg(test)]
mod distributed_test;
#[cfg(test)]
mod util_test;

use crate::{
    config::ConfigErrors,
    executable::{ExecutableError, Executables, Stage},
    scheduler::plan::Function,
    sync::{JobLog, Ledger, LedgerError},
    tasks::{self, describe, Index, TaskSpecError},
};
use std::{io, path::PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Executable failed")]
    Executable(#[from] ExecutableError),
    #[error("Failed to update ledger")]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Tasks(#[from] TaskSpecError),
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("Environment variable {0} is not set, unable to determine the rank of this task")]
    MissingRank(&'static str),
    #[error("Environment variable {variable} holds '{value}' which is not a valid rank")]
    MalformedRank { variable: &'static str, value: String },
    #[error("'{command}' failed with {status}")]
    Failed { command: String, status: String },
    #[error("Failed to build worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("I/O failed")]
    Io(#[from] io::Error),
}

/// Everything a function needs besides its indices
#[derive(Debug, Clone)]
pub struct TaskEnv<'a> {
    pub executable: &'a Executables,
    pub args: &'a [String],
    pub ledger: Ledger,
    pub job_log: Option<JobLog>,
    /// Where `missing` stores the indices that need to run again
    pub rerun_file: PathBuf,
    /// Block until the ledger exists before diffing against it, workers of a queuing system
    /// might start before the first index was recorded
    pub wait_for_ledger: bool,
}

impl TaskEnv<'_> {
    /// Append a line to the job log, failures are only reported
    pub fn log(&self, line: &str) {
        if let Some(job_log) = &self.job_log {
            if let Err(error) = job_log.write(line) {
                warn!(error = ?error, path = ?job_log.path(), "Failed to write to job log");
            }
        }
    }

    fn missing_from_ledger(&self, indices: &[Index]) -> Result<Vec<Index>, RunError> {
        let check = self.executable.has(&Stage::CheckMissing).then_some(
            |indices: &[Index]| {
                self.executable
                    .drain(&Stage::CheckMissing, indices.to_vec(), self.args)
            },
        );

        Ok(if self.wait_for_ledger {
            self.ledger.missing_indices(indices, check)?
        } else {
            self.ledger.missing_indices_now(indices, check)?
        })
    }
}

/// Run a function over `indices` and return what it emitted
#[instrument(skip_all, fields(function = %function, indices = %describe(&indices)))]
pub fn run_function(
    env: &TaskEnv,
    function: &Function,
    indices: Vec<Index>,
) -> Result<Vec<Index>, RunError> {
    info!("Running {function}");
    env.log(&format!("Running {function}"));

    let result = match function {
        Function::Main => run_main(env, indices)?,
        Function::Missing => run_missing(env, indices)?,
        Function::RerunMissing => {
            let missing = env.missing_from_ledger(&indices)?;
            info!("Rerunning {} missing indices", missing.len());

            run_main(env, missing)?
        }
        other => env.executable.drain(&other.stage(), indices, env.args)?,
    };

    info!("Finished running {function}");
    env.log(&format!("Finished running {function}"));

    Ok(result)
}

/// Drive `main` to completion, every finished index is recorded in the ledger right away
pub fn run_main(env: &TaskEnv, indices: Vec<Index>) -> Result<Vec<Index>, RunError> {
    let mut finished = Vec::with_capacity(indices.len());

    for index in env.executable.call(&Stage::Main, indices, env.args)? {
        let index = index?;
        env.ledger.record_done(index)?;
        info!("##### Finished Task {index} #####");

        finished.push(index);
    }

    Ok(finished)
}

fn run_missing(env: &TaskEnv, indices: Vec<Index>) -> Result<Vec<Index>, RunError> {
    let missing = if env.executable.has(&Stage::Missing) {
        env.executable.drain(&Stage::Missing, indices, env.args)?
    } else {
        info!("Executable has no missing stage, using ledger {}", env.ledger.path().display());
        env.missing_from_ledger(&indices)?
    };

    tasks::write_indices(&env.rerun_file, &missing)?;

    if missing.is_empty() {
        info!("All indices finished");
        env.log("All indices finished");
    } else {
        info!("{} indices need to be rerun: {}", missing.len(), describe(&missing));
    }

    Ok(missing)
}
