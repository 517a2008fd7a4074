use super::{submission::Submission, BatchSystem, JobId};
use parking_lot::Mutex;
use std::{
    io::{self, BufRead, BufReader, Read},
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const TIMEOUT_MESSAGE: &str =
    "Maximum number of pending jobs reached, will sleep for 30 minutes and retry";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Submission '{command}' failed with {status}: {stderr}")]
    SubmissionFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Pending job limit still reached after {0} attempts")]
    PendingLimit(u32),
    #[error("Could not find a job id in the output of '{command}': {stdout}")]
    MissingJobId { command: String, stdout: String },
    #[error("Failed to run submission command")]
    Io(#[from] io::Error),
    #[error("Failed to write job script {path:?}")]
    Script {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How often and how long to wait when the queue refuses new jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the queue accepts the job
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::from_secs(30 * 60),
        }
    }
}

impl RetryPolicy {
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    Continue,
    /// Kill the command, its output is discarded
    Abort,
}

/// Run a command while inspecting its stderr line by line, `None` if it was aborted
pub fn stream_output(
    mut command: Command,
    mut on_stderr: impl FnMut(&str) -> LineAction,
) -> io::Result<Option<CapturedOutput>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|scope| {
        let reader = scope.spawn(move || {
            let mut buffer = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buffer)?;
            }
            Ok::<_, io::Error>(String::from_utf8_lossy(&buffer).into_owned())
        });

        let mut captured = String::new();
        let mut aborted = false;
        if let Some(stderr) = stderr {
            let mut stderr = BufReader::new(stderr);
            let mut raw = Vec::new();
            // localized messages are not necessarily valid UTF-8
            while stderr.read_until(b'\n', &mut raw)? > 0 {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                raw.clear();
                captured.push_str(&line);
                captured.push('\n');

                if on_stderr(&line) == LineAction::Abort {
                    debug!(pid = child.id(), "Aborting command");
                    if let Err(error) = child.kill() {
                        debug!(error = ?error, "Command exited before it could be killed");
                    }
                    aborted = true;
                    break;
                }
            }
        }

        let status = child.wait()?;
        let stdout = match reader.join() {
            Ok(result) => result?,
            Err(_) => {
                warn!("Reader thread for stdout panicked");
                String::new()
            }
        };

        Ok((!aborted).then_some(CapturedOutput {
            status,
            stdout,
            stderr: captured,
        }))
    })
}

/// Run a submission until the queue stops signalling its pending job limit
pub fn run_with_backpressure(
    build: impl Fn() -> Command,
    markers: &[&str],
    policy: &RetryPolicy,
) -> Result<CapturedOutput, SubmitError> {
    let mut attempts = 0;

    loop {
        attempts += 1;

        let output = stream_output(build(), |line| {
            if markers.iter().any(|marker| line.contains(marker)) {
                LineAction::Abort
            } else {
                LineAction::Continue
            }
        })?;

        match output {
            Some(output) => return Ok(output),
            None if policy.allows_retry(attempts) => {
                warn!("{TIMEOUT_MESSAGE}");
                thread::sleep(policy.backoff);
            }
            None => return Err(SubmitError::PendingLimit(attempts)),
        }
    }
}

/// Hands a submission to a queuing system and returns the assigned id
pub trait Transport {
    fn submit(&self, submission: &Submission, system: BatchSystem) -> Result<JobId, SubmitError>;
}

/// Runs the submission commands of the queuing system
#[derive(Debug, Clone, Default)]
pub struct ProcessTransport {
    pub policy: RetryPolicy,
}

impl ProcessTransport {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl Transport for ProcessTransport {
    fn submit(&self, submission: &Submission, system: BatchSystem) -> Result<JobId, SubmitError> {
        if let Some(script) = &submission.script {
            script.write().map_err(|source| SubmitError::Script {
                path: script.path.clone(),
                source,
            })?;
            debug!("Wrote job script {}", script.path.display());
        }

        let output = run_with_backpressure(
            || submission.command.to_command(),
            system.pending_limit_markers(),
            &self.policy,
        )?;

        if !output.status.success() {
            return Err(SubmitError::SubmissionFailed {
                command: submission.command.to_string(),
                status: output.status.to_string(),
                stderr: output.stderr,
            });
        }

        for line in output.stdout.lines().filter(|line| !line.trim().is_empty()) {
            debug!("{line}");
        }

        system
            .parse_job_id(&output.stdout)
            .ok_or_else(|| SubmitError::MissingJobId {
                command: submission.command.to_string(),
                stdout: output.stdout,
            })
    }
}

/// Records submissions instead of running them and hands out consecutive ids.
///
/// Used for dry runs and to test chains without a queuing system.
#[derive(Debug)]
pub struct RecordingTransport {
    first_id: u64,
    submissions: Mutex<Vec<(Submission, JobId)>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RecordingTransport {
    pub fn new(first_id: u64) -> Self {
        Self {
            first_id,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<(Submission, JobId)> {
        self.submissions.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn submit(&self, submission: &Submission, _: BatchSystem) -> Result<JobId, SubmitError> {
        let mut submissions = self.submissions.lock();
        let id = JobId(self.first_id + submissions.len() as u64);

        info!("{}", submission.command);
        if let Some(script) = &submission.script {
            debug!(path = ?script.path, "Job script:\n{}", script.content);
        }
        submissions.push((submission.clone(), id));

        Ok(id)
    }
}
