use crate::{log_files, read_log, AnalysisError};
use jobchain::JobId;
use std::{
    path::Path,
    process::{Command, ExitStatus},
};
use tracing::{info, warn};

/// Ids at the end of the `Job id` lines of a job log
pub fn job_ids(log: &str) -> Vec<JobId> {
    log.lines()
        .filter(|line| line.contains("Job id"))
        .filter_map(|line| {
            let line = line.trim_end();
            let digits = line.len() - line.trim_end_matches(|c: char| c.is_ascii_digit()).len();

            line[line.len() - digits..].parse().ok().map(JobId)
        })
        .collect()
}

/// Ids of every job in the matching logs of `log_dir`
pub fn collect_job_ids(log_dir: &Path, filter: Option<&str>) -> Result<Vec<JobId>, AnalysisError> {
    let mut ids = Vec::new();

    for path in log_files(log_dir, filter)? {
        ids.extend(job_ids(&read_log(&path)?));
    }

    Ok(ids)
}

/// Run `<command> <id>` through the shell for every id
pub fn send_to_jobs(command: &str, ids: &[JobId]) -> Result<Vec<ExitStatus>, AnalysisError> {
    ids.iter()
        .map(|id| {
            let full = format!("{command} {id}");
            info!("Sending cmd {command} to job {id}");

            let status = Command::new("sh")
                .arg("-c")
                .arg(&full)
                .status()
                .map_err(|source| AnalysisError::Command {
                    command: full.clone(),
                    source,
                })?;
            if !status.success() {
                warn!("'{full}' exited with {status}");
            }

            Ok(status)
        })
        .collect()
}
