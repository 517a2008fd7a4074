use super::submission::{
    format_amount, shell_join, JobScript, Submission, SubmissionRequest, SubmitCommand,
};
use crate::executors::BatchSystem;
use std::{fmt::Write, path::Path};

/// Wall time in whole minutes as accepted by `--time`
pub fn wall_minutes(hours: f64) -> u64 {
    (hours.max(0.0) * 60.0 - 1e-6).ceil().max(0.0) as u64
}

/// Log file of every array task: `job_main0.o` -> `job_main0.o_%a`
fn per_task(path: &Path, array: bool) -> String {
    if array {
        format!("{}_%a", path.display())
    } else {
        path.display().to_string()
    }
}

/// Job script with `#SBATCH` directives, submitted through `sbatch`
pub fn build(request: &SubmissionRequest) -> Submission {
    let resources = request.resources;
    let array = !request.mpi;
    let mut directives = vec![
        format!("--job-name={}", request.name),
        format!("--output={}", per_task(request.stdout, array)),
        format!("--error={}", per_task(request.stderr, array)),
    ];

    if array {
        let last = request.n_tasks.saturating_sub(1);
        directives.push(match request.max_simultaneous {
            Some(limit) => format!("--array=0-{last}%{limit}"),
            None => format!("--array=0-{last}"),
        });
        directives.push("--ntasks=1".to_string());
    } else {
        directives.push(format!("--ntasks={}", request.n_tasks));
    }

    directives.extend([
        format!("--cpus-per-task={}", resources.nproc),
        format!("--mem-per-cpu={}", format_amount(resources.memory)),
        format!("--time={}", wall_minutes(resources.time)),
        format!("--tmp={}", format_amount(resources.scratch)),
    ]);
    if resources.ngpu > 0 {
        directives.push(format!("--gpus={}", resources.ngpu));
    }
    for (key, value) in request.extra {
        directives.push(format!("--{key}={value}"));
    }

    let mut content = String::from("#!/bin/bash\n");
    for directive in directives {
        // writing into a String can not fail
        let _ = writeln!(content, "#SBATCH {directive}");
    }
    content.push('\n');
    if let Some(source) = request.source {
        content.push_str(source);
        content.push('\n');
    }

    let worker = shell_join(request.worker.iter().map(String::as_str));
    if request.mpi {
        content.push_str("srun ");
    }
    content.push_str(&worker);
    content.push('\n');

    let mut command = SubmitCommand::new("sbatch");
    command.args(request.dependency.flag(BatchSystem::Slurm));
    command.arg(request.script.to_string_lossy().into_owned());

    Submission {
        command,
        script: Some(JobScript {
            path: request.script.to_path_buf(),
            content,
        }),
    }
}
