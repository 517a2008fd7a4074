use super::submission::{
    format_amount, hours_and_minutes, shell_join, Submission, SubmissionRequest, SubmitCommand,
};
use crate::executors::BatchSystem;

/// Wall time in the `H:MM` form of `bsub -W`
pub fn wall_time(hours: f64) -> String {
    let (hours, minutes) = hours_and_minutes(hours);

    format!("{hours}:{minutes:02}")
}

/// A single `bsub` call, the job runs its worker through the shell of the execution host
pub fn build(request: &SubmissionRequest) -> Submission {
    let resources = request.resources;
    let mut command = SubmitCommand::new("bsub");

    let name = if request.mpi {
        request.name.clone()
    } else {
        // LSF array indices are 1 based, the worker converts them back
        match request.max_simultaneous {
            Some(limit) => format!("{}[1-{}]%{limit}", request.name, request.n_tasks),
            None => format!("{}[1-{}]", request.name, request.n_tasks),
        }
    };

    if !request.mpi {
        command.arg("-r");
    }
    command.args([
        "-o".to_string(),
        request.stdout.to_string_lossy().into_owned(),
        "-e".to_string(),
        request.stderr.to_string_lossy().into_owned(),
        "-J".to_string(),
        name,
    ]);

    let nproc = if request.mpi {
        request.n_tasks as u32
    } else {
        resources.nproc
    };
    command.args([
        "-n".to_string(),
        nproc.to_string(),
        "-W".to_string(),
        wall_time(resources.time),
        "-R".to_string(),
        format!("rusage[mem={}]", format_amount(resources.memory)),
        "-R".to_string(),
        format!("rusage[scratch={}]", format_amount(resources.scratch)),
        // MPI ranks are packed onto hosts by the per job core count
        "-R".to_string(),
        format!("span[ptile={}]", resources.nproc),
    ]);
    if resources.ngpu > 0 {
        command.args([
            "-R".to_string(),
            format!("rusage[ngpus_excl_p={}]", resources.ngpu),
        ]);
    }
    for (key, value) in request.extra {
        command.args([format!("-{key}"), value.clone()]);
    }

    command.args(request.dependency.flag(BatchSystem::Lsf));

    let worker = shell_join(request.worker.iter().map(String::as_str));
    let worker = if request.mpi {
        format!("mpirun {worker}")
    } else {
        worker
    };
    command.arg(match request.source {
        Some(source) => format!("{source}; {worker}"),
        None => worker,
    });

    Submission {
        command,
        script: None,
    }
}
