use crate::PipelineError;
use jobchain::executors::{
    transport::{run_with_backpressure, RetryPolicy, SubmitError},
    BatchSystem, JobId,
};
use parking_lot::Mutex;
use std::process::Command;
use tracing::{debug, info};

/// Runs the command of one pipeline job and reports the job ids it printed
pub trait Submitter {
    fn submit(&self, command: &str) -> Result<Vec<JobId>, PipelineError>;
}

impl<S: Submitter + ?Sized> Submitter for &S {
    fn submit(&self, command: &str) -> Result<Vec<JobId>, PipelineError> {
        (**self).submit(command)
    }
}

/// Every integer token of the last non empty stdout line
pub fn parse_job_ids(stdout: &str) -> Vec<JobId> {
    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .filter_map(|token| token.parse().ok())
                .map(JobId)
                .collect()
        })
        .unwrap_or_default()
}

/// Runs commands through `sh -c`, retrying while the queue reports its pending job limit
#[derive(Debug, Clone)]
pub struct ShellSubmitter {
    system: BatchSystem,
    policy: RetryPolicy,
}

impl ShellSubmitter {
    pub fn new(system: BatchSystem, policy: RetryPolicy) -> Self {
        Self { system, policy }
    }
}

impl Submitter for ShellSubmitter {
    fn submit(&self, command: &str) -> Result<Vec<JobId>, PipelineError> {
        info!("Running {command}");

        let output = run_with_backpressure(
            || {
                let mut shell = Command::new("sh");
                shell.arg("-c").arg(command);
                shell
            },
            self.system.pending_limit_markers(),
            &self.policy,
        )?;

        for line in output.stderr.lines() {
            debug!("{line}");
        }
        for line in output.stdout.lines().filter(|line| !line.trim().is_empty()) {
            info!("{}", line.trim());
        }

        if !output.status.success() {
            return Err(SubmitError::SubmissionFailed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: output.stderr,
            }
            .into());
        }

        Ok(parse_job_ids(&output.stdout))
    }
}

/// Prints commands instead of running them and hands out consecutive ids
#[derive(Debug)]
pub struct DryRunSubmitter {
    next_id: Mutex<u64>,
    commands: Mutex<Vec<String>>,
}

impl Default for DryRunSubmitter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DryRunSubmitter {
    pub fn new(first_id: u64) -> Self {
        Self {
            next_id: Mutex::new(first_id),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl Submitter for DryRunSubmitter {
    fn submit(&self, command: &str) -> Result<Vec<JobId>, PipelineError> {
        let mut next_id = self.next_id.lock();
        let id = JobId(*next_id);
        *next_id += 1;

        println!("{command}");
        self.commands.lock().push(command.to_string());

        Ok(vec![id])
    }
}
