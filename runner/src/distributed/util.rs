use super::RunError;
use crate::{
    config::{LOCAL_SCRATCH_VAR, SUBMIT_DIR_VAR},
    executors::BatchSystem,
};
use std::{env, path::Path};
use tracing::{error, info};

/// Variables MPI launchers use to publish the rank of a process
const MPI_RANK_VARS: [&str; 3] = ["OMPI_COMM_WORLD_RANK", "PMI_RANK", "PMIX_RANK"];

/// Convert the value of a rank variable into a 0 based rank
pub fn parse_rank(variable: &'static str, value: &str, one_based: bool) -> Result<usize, RunError> {
    let malformed = || RunError::MalformedRank {
        variable,
        value: value.to_string(),
    };
    let rank = value.trim().parse::<usize>().map_err(|_| malformed())?;

    if one_based {
        rank.checked_sub(1).ok_or_else(malformed)
    } else {
        Ok(rank)
    }
}

/// Rank of the current job array task, LSF counts from 1 and Slurm from 0
pub fn array_rank(system: BatchSystem) -> Result<usize, RunError> {
    let variable = system.rank_variable();

    match env::var(variable) {
        Ok(value) => parse_rank(variable, &value, system == BatchSystem::Lsf),
        Err(_) => Err(RunError::MissingRank(variable)),
    }
}

/// Rank within the MPI communicator, 0 outside of an MPI launcher
pub fn mpi_rank() -> usize {
    MPI_RANK_VARS
        .iter()
        .find_map(|variable| env::var(variable).ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Move into node local scratch if `$JOBCHAIN_LOCAL_SCRATCH` points to a directory.
///
/// The original working directory is exported as `$SUBMIT_DIR`.
pub fn cd_local_scratch(verbose: bool) -> Result<(), RunError> {
    let Some(scratch) = env::var_os(LOCAL_SCRATCH_VAR) else {
        return Ok(());
    };
    let scratch = Path::new(&scratch);

    if scratch.is_dir() {
        let submit_dir = env::current_dir()?;
        env::set_var(SUBMIT_DIR_VAR, &submit_dir);
        env::set_current_dir(scratch)?;

        if verbose {
            info!(
                "Changed into local scratch {}, submission directory was {}",
                scratch.display(),
                submit_dir.display()
            );
        }
    } else if verbose {
        error!(
            "${LOCAL_SCRATCH_VAR} is set to non-existing directory {}, skipping",
            scratch.display()
        );
    }

    Ok(())
}
