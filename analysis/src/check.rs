use crate::{log_files, read_log, AnalysisError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Whether the chain behind a job log did not run to completion
pub fn is_unfinished(log: &str) -> bool {
    let main = log.contains("Job id main");
    let rerun_missing = log.contains("Job id rerun_missing");
    let merge = log.contains("Job id merge");
    let watchdog = log.contains("Job id watchdog");

    // MPI main jobs never run missing, finishing main is enough
    if main && !(rerun_missing || merge || watchdog) && log.contains("Finished running main") {
        return false;
    }

    let mut expected = Vec::new();
    if main || rerun_missing {
        expected.push("All indices finished");
    }
    if merge {
        expected.push("Finished running merge");
    }
    if watchdog {
        expected.push("Finished running watchdog");
    }

    expected.into_iter().any(|line| !log.contains(line))
}

/// Logs in `log_dir` whose chain is unfinished
pub fn unfinished_logs(log_dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    let mut unfinished = Vec::new();

    for path in log_files(log_dir, None)? {
        if is_unfinished(&read_log(&path)?) {
            unfinished.push(path);
        }
    }

    if unfinished.is_empty() {
        info!("No unfinished jobs found");
    } else {
        info!(
            "Logs containing unfinished jobs:\n{}",
            unfinished
                .iter()
                .filter_map(|path| path.file_name())
                .map(|name| name.to_string_lossy())
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    Ok(unfinished)
}
