use super::{
    dependency::{Dependency, Predicate},
    lsf::wall_time,
    slurm::wall_minutes,
    submission::{
        build_submission, format_amount, shell_quote, source_command, worker_command,
        SubmissionRequest,
    },
    BatchSystem, JobId,
};
use crate::{
    config::ResourceBucket,
    scheduler::plan::{Function, SubmissionUnit},
};
use std::path::{Path, PathBuf};

fn unit(function: Function, n_cores: usize) -> SubmissionUnit {
    SubmissionUnit {
        name: format!("{function}0"),
        function,
        n_cores,
        predecessor: None,
        start: None,
        indices: PathBuf::from("/work/jobchain_indices/indices__job.yaml"),
    }
}

fn request<'a>(
    resources: &'a ResourceBucket,
    extra: &'a [(String, String)],
    dependency: &'a Dependency,
    worker: &'a [String],
    mpi: bool,
) -> SubmissionRequest<'a> {
    SubmissionRequest {
        name: "job_main0".to_string(),
        n_tasks: 10,
        mpi,
        resources,
        extra,
        dependency,
        max_simultaneous: None,
        stdout: Path::new("/logs/job_main0.o"),
        stderr: Path::new("/logs/job_main0.e"),
        script: Path::new("/logs/job_main0.slurm"),
        source: Some("source /env/activate"),
        worker,
    }
}

#[test]
fn wall_time_rounds_minutes_up() {
    assert_eq!(wall_time(4.0), "4:00");
    assert_eq!(wall_time(0.5), "0:30");
    assert_eq!(wall_time(1.01), "1:01");
    assert_eq!(wall_time(0.1), "0:06");
    assert_eq!(wall_time(2.999), "3:00");
    assert_eq!(wall_time(24.25), "24:15");
}

#[test]
fn wall_minutes_for_slurm() {
    assert_eq!(wall_minutes(4.0), 240);
    assert_eq!(wall_minutes(0.01), 1);
    assert_eq!(wall_minutes(0.1), 6);
}

#[test]
fn amounts_drop_trailing_zero() {
    assert_eq!(format_amount(1000.0), "1000");
    assert_eq!(format_amount(1.5), "1.5");
}

#[test]
fn quoting() {
    assert_eq!(shell_quote("plain/path-1.yaml"), "plain/path-1.yaml");
    assert_eq!(shell_quote("two words"), "'two words'");
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
    assert_eq!(shell_quote(""), "''");
}

#[test]
fn missing_source_file_is_skipped() {
    assert_eq!(source_command(Path::new("/does/not/exist/activate")), None);

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("activate");
    std::fs::write(&file, "").unwrap();

    let command = source_command(&file).unwrap();
    assert!(command.starts_with("source /"));
    assert!(command.ends_with("activate"));
}

#[test]
fn worker_invocation() {
    let command = worker_command(
        Path::new("/bin/jobchain"),
        "job",
        Path::new("/work/exe"),
        Path::new("/work/logs"),
        BatchSystem::Lsf,
        &unit(Function::Missing, 1),
        false,
        &["--seed".to_string(), "3".to_string()],
    );

    assert_eq!(
        command,
        [
            "/bin/jobchain",
            "worker",
            "--job-name",
            "job",
            "--function",
            "missing",
            "--executable",
            "/work/exe",
            "--tasks",
            "/work/jobchain_indices/indices__job.yaml",
            "--n-cores",
            "1",
            "--system",
            "lsf",
            "--log-dir",
            "/work/logs",
            "--",
            "--seed",
            "3",
        ]
    );
}

#[test]
fn lsf_job_array() {
    let resources = ResourceBucket {
        nproc: 2,
        ngpu: 1,
        ..Default::default()
    };
    let extra = [("q".to_string(), "long".to_string())];
    let dependency = Dependency::on(Predicate::AllEnded, JobId(17));
    let worker = ["/bin/jobchain".to_string(), "worker".to_string()];
    let mut request = request(&resources, &extra, &dependency, &worker, false);
    request.max_simultaneous = Some(5);

    let submission = build_submission(BatchSystem::Lsf, &request);

    assert!(submission.script.is_none());
    assert_eq!(submission.command.program, "bsub");
    assert_eq!(
        submission.command.args,
        [
            "-r",
            "-o",
            "/logs/job_main0.o",
            "-e",
            "/logs/job_main0.e",
            "-J",
            "job_main0[1-10]%5",
            "-n",
            "2",
            "-W",
            "4:00",
            "-R",
            "rusage[mem=1000]",
            "-R",
            "rusage[scratch=2000]",
            "-R",
            "span[ptile=2]",
            "-R",
            "rusage[ngpus_excl_p=1]",
            "-q",
            "long",
            "-w",
            "numended(17,*)",
            "source /env/activate; /bin/jobchain worker",
        ]
    );
}

#[test]
fn lsf_mpi_allocation() {
    let resources = ResourceBucket {
        nproc: 4,
        ..ResourceBucket::default()
    };
    let worker = ["/bin/jobchain".to_string(), "mpi-worker".to_string()];
    let mut request = request(&resources, &[], &Dependency::Empty, &worker, true);
    request.source = None;

    let submission = build_submission(BatchSystem::Lsf, &request);
    let args = &submission.command.args;

    assert!(!args.contains(&"-r".to_string()));
    assert!(args.contains(&"span[ptile=4]".to_string()));
    assert!(!args.contains(&"-w".to_string()));
    assert_eq!(args[4..8], ["-J", "job_main0", "-n", "10"]);
    assert_eq!(
        args.last().unwrap(),
        "mpirun /bin/jobchain mpi-worker"
    );
}

#[test]
fn slurm_job_array_script() {
    let resources = ResourceBucket {
        memory: 4000.0,
        time: 1.5,
        ..Default::default()
    };
    let extra = [("partition".to_string(), "gpu".to_string())];
    let dependency = Dependency::all(Predicate::AllEnded, [JobId(3), JobId(4)]);
    let worker = ["/bin/jobchain".to_string(), "worker".to_string()];
    let mut request = request(&resources, &extra, &dependency, &worker, false);
    request.max_simultaneous = Some(2);

    let submission = build_submission(BatchSystem::Slurm, &request);

    assert_eq!(submission.command.to_string(), "sbatch --dependency=afterany:3,afterany:4 /logs/job_main0.slurm");

    let script = submission.script.unwrap();
    assert_eq!(script.path, Path::new("/logs/job_main0.slurm"));
    assert_eq!(
        script.content,
        "#!/bin/bash\n\
         #SBATCH --job-name=job_main0\n\
         #SBATCH --output=/logs/job_main0.o_%a\n\
         #SBATCH --error=/logs/job_main0.e_%a\n\
         #SBATCH --array=0-9%2\n\
         #SBATCH --ntasks=1\n\
         #SBATCH --cpus-per-task=1\n\
         #SBATCH --mem-per-cpu=4000\n\
         #SBATCH --time=90\n\
         #SBATCH --tmp=2000\n\
         #SBATCH --partition=gpu\n\
         \n\
         source /env/activate\n\
         /bin/jobchain worker\n"
    );
}

#[test]
fn slurm_mpi_script_uses_srun() {
    let resources = ResourceBucket::default();
    let worker = ["/bin/jobchain".to_string(), "mpi-worker".to_string()];
    let request = request(&resources, &[], &Dependency::Empty, &worker, true);

    let submission = build_submission(BatchSystem::Slurm, &request);
    let script = submission.script.unwrap();

    assert_eq!(submission.command.args, ["/logs/job_main0.slurm"]);
    assert!(script.content.contains("#SBATCH --ntasks=10\n"));
    assert!(script.content.contains("#SBATCH --output=/logs/job_main0.o\n"));
    assert!(!script.content.contains("--array"));
    assert!(script.content.ends_with("srun /bin/jobchain mpi-worker\n"));
}
