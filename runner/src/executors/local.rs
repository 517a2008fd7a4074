use super::{
    transport::{stream_output, LineAction},
    Mode, UnitContext,
};
use crate::{
    distributed::{run_function, run_main, RunError, TaskEnv},
    scheduler::plan::{Function, SubmissionUnit},
    sync::{JobLog, Ledger},
    tasks::{self, partition, Index},
};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{path::PathBuf, process::Command, thread};
use tracing::{info, instrument, warn};

/// How `main` is run in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    /// Partitioned over a local thread pool
    Pool,
    /// Through a local `mpirun`
    Mpi,
}

/// Executor running every unit on the local machine, in order
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    strategy: Strategy,
    n_cores: usize,
    worker: PathBuf,
}

impl LocalExecutor {
    pub fn new(mode: Mode, n_cores: usize, worker: PathBuf) -> Self {
        let strategy = match mode {
            Mode::RunTasks => Strategy::Pool,
            Mode::RunMpi => Strategy::Mpi,
            _ => Strategy::Sequential,
        };

        Self {
            strategy,
            n_cores: n_cores.max(1),
            worker,
        }
    }

    /// Run a unit over its full index set
    #[instrument(skip_all, fields(unit = %unit.name), level = "info")]
    pub fn execute(
        &self,
        context: &UnitContext,
        unit: &SubmissionUnit,
    ) -> Result<Vec<Index>, RunError> {
        let indices = tasks::read_indices(&unit.indices)?;
        let env = TaskEnv {
            executable: context.executable,
            args: context.function_args,
            ledger: Ledger::new(context.workspace.ledger(context.job_name)),
            job_log: Some(JobLog::new(context.workspace.job_log(context.job_name))),
            rerun_file: tasks::rerun_path(&unit.indices),
            // earlier units already ran to completion
            wait_for_ledger: false,
        };

        match (self.strategy, &unit.function) {
            (Strategy::Pool, Function::Main) => self.run_pool(&env, &indices),
            (Strategy::Mpi, Function::Main) => {
                env.log("Running main");
                self.run_mpi(context, unit)?;
                env.log("Finished running main");

                Ok(Vec::new())
            }
            (_, function) => run_function(&env, function, indices),
        }
    }

    /// Partition `main` over a fixed size pool, each worker returns what it finished
    fn run_pool(&self, env: &TaskEnv, indices: &[Index]) -> Result<Vec<Index>, RunError> {
        let n_cores = self.n_cores;

        match thread::available_parallelism() {
            Ok(available) if available.get() < n_cores => warn!(
                "Requested {n_cores} cores but only {available} are available, expect oversubscription"
            ),
            _ => {}
        }

        info!("Running main on a pool of {n_cores} workers");
        env.log("Running main");

        let pool = ThreadPoolBuilder::new().num_threads(n_cores).build()?;
        let finished = pool.install(|| {
            (0..n_cores)
                .into_par_iter()
                .map(|rank| run_main(env, partition(indices, n_cores, rank).to_vec()))
                .collect::<Result<Vec<_>, _>>()
        })?;

        info!("Finished running main");
        env.log("Finished running main");

        Ok(finished.concat())
    }

    /// Start an MPI pool of workers through `mpirun` and forward its output
    fn run_mpi(
        &self,
        context: &UnitContext,
        unit: &SubmissionUnit,
    ) -> Result<(), RunError> {
        let mut command = Command::new("mpirun");
        command
            .arg("-np")
            .arg(self.n_cores.to_string())
            .arg(&self.worker)
            .arg("mpi-worker")
            .arg("--job-name")
            .arg(context.job_name)
            .arg("--executable")
            .arg(context.executable_path)
            .arg("--tasks")
            .arg(&unit.indices);
        if !context.function_args.is_empty() {
            command.arg("--").args(context.function_args);
        }

        info!("Running main through mpirun with {} ranks", self.n_cores);
        let description = format!("{command:?}");
        let output = stream_output(command, |line| {
            if !line.trim().is_empty() {
                info!("{}", line.trim());
            }
            LineAction::Continue
        })?;

        let Some(output) = output else {
            return Err(RunError::Failed {
                command: description,
                status: "aborted".to_string(),
            });
        };
        for line in output.stdout.lines().filter(|line| !line.trim().is_empty()) {
            info!("{}", line.trim());
        }

        if !output.status.success() {
            return Err(RunError::Failed {
                command: description,
                status: output.status.to_string(),
            });
        }

        Ok(())
    }
}
