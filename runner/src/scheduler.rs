//! Turns the capabilities of an executable into a chain of units and runs or submits them in
//! order, threading the ids of submitted units into the dependencies of their successors.

pub mod plan;
pub mod registry;


use crate::{
    config::{ConfigErrors, Resources, Workspace},
    executable::{ExecutableError, Executables},
    executors::{
        dependency::{Dependency, Predicate},
        ExecutorError, Executors, UnitContext,
    },
    sync::JobLog,
    tasks::TaskSpecError,
};
use plan::SubmissionUnit;
use registry::JobRegistry;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Could not find dependency {dependency} of unit {unit}, submitted so far: {known:?}")]
    UnresolvedDependency {
        unit: String,
        dependency: String,
        known: Vec<String>,
    },
    #[error("Unknown merge dependency mode '{0}', use after or along")]
    UnknownMergeMode(String),
    #[error("Function '{0}' is not implemented by the executable")]
    UnknownFunction(String),
    #[error("Failed to execute unit {unit}")]
    Executor {
        unit: String,
        #[source]
        source: ExecutorError,
    },
    #[error("Executable failed")]
    Executable(#[from] ExecutableError),
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Tasks(#[from] TaskSpecError),
}

/// Settings shared by every unit of a chain
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub job_name: String,
    pub workspace: Workspace,
    pub executable_path: PathBuf,
    pub function_args: Vec<String>,
    pub resources: Resources,
    /// Dependency of the whole chain on jobs outside of it
    pub dependency: Dependency,
}

/// Dependency of a unit: the external dependency of the chain and the start condition on its
/// predecessor, which must have been submitted already
pub fn resolve_dependency(
    external: &Dependency,
    unit: &SubmissionUnit,
    registry: &JobRegistry,
) -> Result<Dependency, SchedulerError> {
    let predecessor = match unit.predecessor.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(external.clone()),
    };

    match registry.get(predecessor) {
        Some(ids) => Ok(external.clone().and(Dependency::all(
            unit.start.unwrap_or(Predicate::AllEnded),
            ids.iter().copied(),
        ))),
        None => Err(SchedulerError::UnresolvedDependency {
            unit: unit.name.clone(),
            dependency: predecessor.to_string(),
            known: registry.names().map(str::to_string).collect(),
        }),
    }
}

pub struct JobChain<'a> {
    context: &'a ChainContext,
    executable: &'a Executables,
    executor: Executors<'a>,
}

impl<'a> JobChain<'a> {
    pub fn new(
        context: &'a ChainContext,
        executable: &'a Executables,
        executor: Executors<'a>,
    ) -> Self {
        Self {
            context,
            executable,
            executor,
        }
    }

    /// Every unit has to be backed by a stage of the executable
    pub fn validate(&self, units: &[SubmissionUnit]) -> Result<(), SchedulerError> {
        for unit in units {
            if unit.function.requires_stage() && !self.executable.has(&unit.function.stage()) {
                return Err(SchedulerError::UnknownFunction(unit.function.to_string()));
            }
        }

        Ok(())
    }

    /// Run or submit all units in order and return the ids of everything submitted
    #[instrument(skip_all, fields(job = %self.context.job_name), level = "info")]
    pub fn execute(&self, units: &[SubmissionUnit]) -> Result<JobRegistry, SchedulerError> {
        self.validate(units)?;

        let context = self.context;
        let unit_context = UnitContext {
            job_name: &context.job_name,
            workspace: &context.workspace,
            executable: self.executable,
            executable_path: &context.executable_path,
            function_args: &context.function_args,
            resources: &context.resources,
        };
        let job_log = JobLog::new(context.workspace.job_log(&context.job_name));
        let mut registry = JobRegistry::new();

        for unit in units {
            let dependency = if self.executor.is_batch() {
                info!(
                    "Submitting {} job to {} core(s)",
                    unit.function, unit.n_cores
                );
                resolve_dependency(&context.dependency, unit, &registry)?
            } else {
                Dependency::Empty
            };

            let id = self
                .executor
                .execute(&unit_context, unit, &dependency)
                .map_err(|source| SchedulerError::Executor {
                    unit: unit.name.clone(),
                    source,
                })?;

            if let Some(id) = id {
                registry.register(&unit.name, [id]);

                if let Err(error) =
                    job_log.write(format!("Job id {} ({}): {id}", unit.function, unit.name))
                {
                    warn!(error = ?error, "Failed to write to job log");
                }
                println!(
                    "Submitted job {} for function {} as jobid {id}",
                    unit.name, unit.function
                );
            }
        }

        Ok(registry)
    }
}
