pub mod dependency;
pub mod local;
pub mod lsf;
pub mod slurm;
pub mod submission;
pub mod transport;

#[cfg(test)]
mod dependency_test;
#[cfg(test)]
mod submission_test;

use crate::{
    config::{ConfigErrors, Resources, Workspace},
    distributed::RunError,
    executable::{ExecutableError, Executables},
    scheduler::plan::{Function, SubmissionUnit},
    tasks::TaskSpecError,
};
use clap::ValueEnum;
use dependency::Dependency;
use std::{env, fmt, path::PathBuf, str::FromStr};
use submission::{build_submission, source_command, worker_command, SubmissionRequest};
use thiserror::Error;
use tracing::{debug, info};
use transport::{SubmitError, Transport};

pub const BATCH_SYSTEM_VAR: &str = "BATCH_SYSTEM";

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Batch system '{0}' is not supported, use lsf or slurm")]
    UnsupportedSystem(String),
    #[error("Batch system could not be detected, set {BATCH_SYSTEM_VAR} or pass --system")]
    UndetectableSystem,
    #[error("Failed to submit job")]
    Submit(#[from] SubmitError),
    #[error("Failed to run function locally")]
    Run(#[from] RunError),
    #[error("Executable failed")]
    Executable(#[from] ExecutableError),
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Tasks(#[from] TaskSpecError),
}

/// Queuing systems jobs can be submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchSystem {
    Lsf,
    Slurm,
}

impl FromStr for BatchSystem {
    type Err = ExecutorError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "lsf" | "bsub" => Ok(Self::Lsf),
            "slurm" | "sbatch" => Ok(Self::Slurm),
            other => Err(ExecutorError::UnsupportedSystem(other.to_string())),
        }
    }
}

impl fmt::Display for BatchSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lsf => "lsf",
            Self::Slurm => "slurm",
        })
    }
}

impl BatchSystem {
    /// Read the system from `$BATCH_SYSTEM`
    pub fn detect() -> Result<Self, ExecutorError> {
        match env::var(BATCH_SYSTEM_VAR) {
            Ok(name) => {
                let system = name.parse()?;
                debug!("Detected batch system {system} from {BATCH_SYSTEM_VAR}");

                Ok(system)
            }
            Err(_) => Err(ExecutorError::UndetectableSystem),
        }
    }

    /// Parse a system name, `detect` falls back to the environment
    pub fn resolve(name: &str) -> Result<Self, ExecutorError> {
        if name.trim().eq_ignore_ascii_case("detect") {
            Self::detect()
        } else {
            name.parse()
        }
    }

    /// Environment variable a job array task reads its ordinal from
    pub fn rank_variable(self) -> &'static str {
        match self {
            Self::Lsf => "LSB_JOBINDEX",
            Self::Slurm => "SLURM_ARRAY_TASK_ID",
        }
    }

    /// Lines on stderr of the submission command signalling a full queue
    pub fn pending_limit_markers(self) -> &'static [&'static str] {
        match self {
            Self::Lsf => &["Pending job threshold reached."],
            Self::Slurm => &["QOSMaxSubmitJobPerUserLimit", "AssocMaxSubmitJobLimit"],
        }
    }

    /// Extract the job id from the output of a successful submission.
    ///
    /// LSF answers with `Job <123> is submitted to queue <normal>.`, Slurm with
    /// `Submitted batch job 123`. Only the last non empty line is considered.
    pub fn parse_job_id(self, stdout: &str) -> Option<JobId> {
        let line = stdout.lines().rev().find(|line| !line.trim().is_empty())?;

        match self {
            Self::Lsf => line
                .split('<')
                .skip(1)
                .filter_map(|part| part.split_once('>'))
                .find_map(|(id, _)| id.trim().parse().ok())
                .map(JobId),
            Self::Slurm => line
                .split_whitespace()
                .nth(3)
                .and_then(|id| id.parse().ok())
                .map(JobId),
        }
    }
}

/// Identifier handed out by a queuing system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the units of a chain are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Every unit in order, in this process
    Run,
    /// Every unit as a job array
    Jobarray,
    /// Main as a single MPI allocation, everything else as job arrays
    Mpi,
    /// Main through a local mpirun
    RunMpi,
    /// Main over a local pool of workers
    RunTasks,
}

impl Mode {
    pub fn is_local(self) -> bool {
        matches!(self, Self::Run | Self::RunMpi | Self::RunTasks)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Everything a unit needs besides its own description, shared by all units of one chain
#[derive(Debug, Clone)]
pub struct UnitContext<'a> {
    pub job_name: &'a str,
    pub workspace: &'a Workspace,
    pub executable: &'a Executables,
    pub executable_path: &'a std::path::Path,
    pub function_args: &'a [String],
    pub resources: &'a Resources,
}

/// Submits units to a queuing system
pub struct BatchExecutor<'a> {
    system: BatchSystem,
    mpi: bool,
    transport: &'a dyn Transport,
    worker: PathBuf,
    source: Option<String>,
    max_simultaneous: Option<u32>,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        system: BatchSystem,
        mode: Mode,
        transport: &'a dyn Transport,
        worker: PathBuf,
        source_file: &std::path::Path,
        max_simultaneous: Option<u32>,
    ) -> Self {
        Self {
            system,
            mpi: mode == Mode::Mpi,
            transport,
            worker,
            source: source_command(source_file),
            max_simultaneous,
        }
    }

    pub fn system(&self) -> BatchSystem {
        self.system
    }

    pub fn submit(
        &self,
        context: &UnitContext,
        unit: &SubmissionUnit,
        dependency: &Dependency,
    ) -> Result<JobId, ExecutorError> {
        let workspace = context.workspace;
        let mpi = self.mpi && unit.function == Function::Main;
        let resources = context.resources.bucket_for(&unit.function);
        let (stdout, stderr) = workspace.unit_logs(context.job_name, &unit.name);
        let script = workspace.slurm_script(context.job_name, &unit.name);
        let worker = worker_command(
            &self.worker,
            context.job_name,
            context.executable_path,
            &workspace.log_dir,
            self.system,
            unit,
            mpi,
            context.function_args,
        );

        workspace.clear_unit_logs(context.job_name, &unit.name)?;

        let submission = build_submission(
            self.system,
            &SubmissionRequest {
                name: format!("{}_{}", context.job_name, unit.name),
                n_tasks: unit.n_cores,
                mpi,
                resources: &resources,
                extra: &context.resources.extra,
                dependency,
                max_simultaneous: self.max_simultaneous,
                stdout: &stdout,
                stderr: &stderr,
                script: &script,
                source: self.source.as_deref(),
                worker: &worker,
            },
        );
        debug!(command = %submission.command, "Submitting {}", unit.name);

        Ok(self.transport.submit(&submission, self.system)?)
    }
}

/// All supported ways to execute a unit
pub enum Executors<'a> {
    Local(local::LocalExecutor),
    Batch(BatchExecutor<'a>),
}

impl<'a> Executors<'a> {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Execute or submit one unit, a submission yields the id assigned by the queue
    pub fn execute(
        &self,
        context: &UnitContext,
        unit: &SubmissionUnit,
        dependency: &Dependency,
    ) -> Result<Option<JobId>, ExecutorError> {
        match self {
            Self::Local(executor) => {
                info!("Running {} ({})", unit.function, unit.name);
                executor.execute(context, unit)?;

                Ok(None)
            }
            Self::Batch(executor) => executor.submit(context, unit, dependency).map(Some),
        }
    }
}
