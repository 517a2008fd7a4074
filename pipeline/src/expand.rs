use crate::{
    config::{dependencies, is_comment, JobStep, LoopStep, Step},
    submit::Submitter,
    template::{format_loop_command, substitute_parameters},
    PipelineError,
};
use jobchain::{
    executors::submission::shell_quote, BatchSystem, Dependency, JobId, JobRegistry, Predicate,
};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// State threaded through the steps of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    /// Active `$[key]` substitutions
    pub parameters: BTreeMap<String, String>,
    pub registry: JobRegistry,
}

/// Turns pipeline steps into submissions
pub struct Expander<S> {
    submitter: S,
    system: BatchSystem,
    assert_ids: bool,
}

impl<S: Submitter> Expander<S> {
    pub fn new(submitter: S, system: BatchSystem, assert_ids: bool) -> Self {
        Self {
            submitter,
            system,
            assert_ids,
        }
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn run(&self, steps: &[Step]) -> Result<PipelineContext, PipelineError> {
        let mut context = PipelineContext::default();

        info!("Starting submission");
        for step in steps {
            self.expand_step(&mut context, step)?;
        }
        info!("Submission finished");

        Ok(context)
    }

    pub fn expand_step(
        &self,
        context: &mut PipelineContext,
        step: &Step,
    ) -> Result<(), PipelineError> {
        match step {
            Step::Parameters(parameters) => {
                context.parameters = parameters.mapping();
                info!(parameters = ?context.parameters, "Set global parameters");
            }
            Step::Loop(step) if is_comment(&step.name) => info!("Skipping loop {}", step.name),
            Step::Job(step) if is_comment(&step.name) => info!("Skipping job {}", step.name),
            Step::Loop(step) => self.expand_loop(context, step)?,
            Step::Job(step) => {
                let ids = self.submit_job(context, step, None)?;
                context.registry.register(&step.name, ids);
            }
        }

        Ok(())
    }

    #[instrument(skip_all, fields(name = %step.name))]
    fn expand_loop(
        &self,
        context: &mut PipelineContext,
        step: &LoopStep,
    ) -> Result<(), PipelineError> {
        let (start, stop) = step.range;
        let mut loop_ids = Vec::new();

        for index in start..stop {
            for item in step.items.iter().filter(|item| !is_comment(&item.name)) {
                let ids = self.submit_job(context, item, Some((step, index)))?;
                context
                    .registry
                    .register(&iteration_name(&item.name, index), ids.iter().copied());
                loop_ids.extend(ids);
            }
        }

        context.registry.register(&step.name, loop_ids);

        Ok(())
    }

    fn submit_job(
        &self,
        context: &PipelineContext,
        job: &JobStep,
        iteration: Option<(&LoopStep, i64)>,
    ) -> Result<Vec<JobId>, PipelineError> {
        let mut names = dependencies(&job.dep);
        let (name, base) = match iteration {
            Some((step, index)) => {
                // only items of the same loop refer to the current iteration
                for dependency in names.iter_mut() {
                    if step.items.iter().any(|item| item.name == *dependency) {
                        *dependency = iteration_name(dependency, index);
                    }
                }
                names.extend(dependencies(&step.dep));

                (
                    iteration_name(&job.name, index),
                    format_loop_command(&job.cmd, index)?,
                )
            }
            None => (job.name.clone(), job.cmd.clone()),
        };

        info!("Submitting job {name}");
        let dependency = resolve_dependencies(&names, &context.registry);
        let command = build_command(
            &base,
            &name,
            &dependency,
            self.system,
            &context.parameters,
        )?;

        let ids = self.submitter.submit(&command)?;
        if ids.is_empty() {
            if job.assert_ids.unwrap_or(self.assert_ids) {
                return Err(PipelineError::MissingJobId { command });
            }
            warn!("Did not get any job id for {name}");
        }

        Ok(ids)
    }
}

pub fn iteration_name(name: &str, index: i64) -> String {
    format!("{name}__{index}")
}

/// Jobs named by `entries` that must have ended, unknown names are ignored
pub fn resolve_dependencies(entries: &[String], registry: &JobRegistry) -> Dependency {
    let mut ids = Vec::new();

    for entry in entries {
        if let Ok(id) = entry.parse::<u64>() {
            ids.push(JobId(id));
        } else if let Some(known) = registry.get(entry) {
            ids.extend_from_slice(known);
        } else {
            info!("Did not find a job named {entry}, ignoring dependencies on it");
        }
    }

    Dependency::all(Predicate::AllEnded, ids)
}

/// Add the job name and dependency flags and substitute global parameters.
///
/// The flags go in front of a `--` separator so they are not forwarded to the executable.
pub fn build_command(
    base: &str,
    name: &str,
    dependency: &Dependency,
    system: BatchSystem,
    parameters: &BTreeMap<String, String>,
) -> Result<String, PipelineError> {
    let mut flags = format!(" --job-name={}", shell_quote(name));
    if let Some(rendered) = dependency.render(system) {
        flags.push_str(&format!(" --dependency={}", shell_quote(&rendered)));
    }

    let command = match base.find(" -- ") {
        Some(at) => format!("{}{flags}{}", &base[..at], &base[at..]),
        None => match base.strip_suffix(" --") {
            Some(head) => format!("{head}{flags} --"),
            None => format!("{base}{flags}"),
        },
    };

    substitute_parameters(&command, parameters)
}
