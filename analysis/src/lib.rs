//! Inspection of the job logs written by `jobchain`.

pub mod check;
pub mod send;


use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid log filter")]
    Glob(#[from] globset::Error),
    #[error("Failed to list log directory")]
    Walk(#[from] ignore::Error),
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to run '{command}'")]
    Command {
        command: String,
        #[source]
        source: io::Error,
    },
}

fn glob(pattern: &str) -> Result<GlobMatcher, AnalysisError> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Glob of a `--log-filter`, a plain word matches every name containing it
pub fn filter_glob(filter: &str) -> Result<GlobMatcher, AnalysisError> {
    if filter.contains(['*', '?', '[', '{']) {
        glob(filter)
    } else {
        glob(&format!("*{filter}*"))
    }
}

/// Job logs directly inside `log_dir`, sorted by name. Hidden files are skipped.
pub fn log_files(log_dir: &Path, filter: Option<&str>) -> Result<Vec<PathBuf>, AnalysisError> {
    let logs = glob("*.log")?;
    let filter = filter.map(filter_glob).transpose()?;

    let mut files = Vec::new();
    for entry in WalkBuilder::new(log_dir)
        .standard_filters(false)
        .hidden(true)
        .max_depth(Some(1))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
    {
        let entry = entry?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        let name = entry.file_name();
        if logs.is_match(name) && filter.as_ref().map_or(true, |filter| filter.is_match(name)) {
            files.push(entry.into_path());
        }
    }
    debug!("Found {} job logs in {}", files.len(), log_dir.display());

    Ok(files)
}

pub fn read_log(path: &Path) -> Result<String, AnalysisError> {
    std::fs::read_to_string(path).map_err(|source| AnalysisError::Read {
        path: path.to_path_buf(),
        source,
    })
}
