use super::{lsf, slurm, BatchSystem};
use crate::{config::ResourceBucket, executors::dependency::Dependency, scheduler::plan::SubmissionUnit};
use std::{
    env, fmt, fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::info;

/// Program and arguments of a submission, executed without an intermediate shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SubmitCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for SubmitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_join(
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)),
        ))
    }
}

/// Job script written to disk before the submission command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    pub path: PathBuf,
    pub content: String,
}

impl JobScript {
    pub fn write(&self) -> io::Result<()> {
        fs::write(&self.path, &self.content)?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o755))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub command: SubmitCommand,
    pub script: Option<JobScript>,
}

/// Everything needed to build the submission of one unit
#[derive(Debug, Clone)]
pub struct SubmissionRequest<'a> {
    /// Queue visible name, `<job>_<unit>`
    pub name: String,
    /// Size of the job array, or number of MPI ranks
    pub n_tasks: usize,
    pub mpi: bool,
    pub resources: &'a ResourceBucket,
    pub extra: &'a [(String, String)],
    pub dependency: &'a Dependency,
    pub max_simultaneous: Option<u32>,
    pub stdout: &'a Path,
    pub stderr: &'a Path,
    /// Where a job script is written if the system needs one
    pub script: &'a Path,
    /// Shell command preparing the environment of the job
    pub source: Option<&'a str>,
    pub worker: &'a [String],
}

pub fn build_submission(system: BatchSystem, request: &SubmissionRequest) -> Submission {
    match system {
        BatchSystem::Lsf => lsf::build(request),
        BatchSystem::Slurm => slurm::build(request),
    }
}

/// Command line of the worker entry point a job runs
#[allow(clippy::too_many_arguments)]
pub fn worker_command(
    worker: &Path,
    job_name: &str,
    executable: &Path,
    log_dir: &Path,
    system: BatchSystem,
    unit: &SubmissionUnit,
    mpi: bool,
    function_args: &[String],
) -> Vec<String> {
    let path = |path: &Path| path.to_string_lossy().into_owned();
    let mut command = vec![path(worker)];

    if mpi {
        command.extend([
            "mpi-worker".to_string(),
            "--job-name".to_string(),
            job_name.to_string(),
            "--executable".to_string(),
            path(executable),
            "--tasks".to_string(),
            path(&unit.indices),
            "--log-dir".to_string(),
            path(log_dir),
        ]);
    } else {
        command.extend([
            "worker".to_string(),
            "--job-name".to_string(),
            job_name.to_string(),
            "--function".to_string(),
            unit.function.to_string(),
            "--executable".to_string(),
            path(executable),
            "--tasks".to_string(),
            path(&unit.indices),
            "--n-cores".to_string(),
            unit.n_cores.to_string(),
            "--system".to_string(),
            system.to_string(),
            "--log-dir".to_string(),
            path(log_dir),
        ]);
    }

    if !function_args.is_empty() {
        command.push("--".to_string());
        command.extend(function_args.iter().cloned());
    }

    command
}

/// `source <file>` if the file exists, `~` is expanded
pub fn source_command(source_file: &Path) -> Option<String> {
    let expanded = match (source_file.strip_prefix("~"), env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => source_file.to_path_buf(),
    };

    match expanded.canonicalize() {
        Ok(path) if path.is_file() => Some(format!(
            "source {}",
            shell_quote(&path.to_string_lossy())
        )),
        _ => {
            info!(
                "Source file {} not found, skipping",
                source_file.display()
            );
            None
        }
    }
}

/// Quote a word for a POSIX shell, plain words are left as they are
pub fn shell_quote(word: &str) -> String {
    if word.is_empty() {
        return "''".to_string();
    }
    if word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@%=,+".contains(c))
    {
        return word.to_string();
    }

    format!("'{}'", word.replace('\'', r"'\''"))
}

pub fn shell_join<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words
        .into_iter()
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a resource amount without a trailing `.0`
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Split decimal hours into whole hours and minutes, minutes are rounded up and a full hour of
/// minutes is carried over
pub fn hours_and_minutes(hours: f64) -> (u64, u64) {
    let hours = hours.max(0.0);
    let whole = hours.floor();
    // float noise like 0.1 * 60 = 6.000000000000001 must not add a minute
    let minutes = ((hours - whole) * 60.0 - 1e-6).ceil().max(0.0) as u64;

    if minutes >= 60 {
        (whole as u64 + 1, 0)
    } else {
        (whole as u64, minutes)
    }
}
