pub mod partition;

#[cfg(test)]
mod partition_test;
#[cfg(test)]
mod tasks_test;

pub use partition::{partition, partitions};

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A single task index, i.e., one unit of work of a user executable
pub type Index = i64;

#[derive(Error, Debug)]
pub enum TaskSpecError {
    #[error("Tasks argument '{0}' is not in the correct format")]
    MalformedTaskSpec(String),
    #[error("Failed to access index file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize indices")]
    Yaml(#[from] serde_yaml::Error),
}

/// Parse a task specification into an ordered list of indices.
///
/// Accepted forms: a path to an index file, a single integer (`"3"`), a comma separated list
/// (`"1,4,2"`) or a half open range (`"1 > 4"`, stop is excluded).
pub fn parse_indices(spec: &str) -> Result<Vec<Index>, TaskSpecError> {
    let trimmed = spec.trim();

    if !trimmed.is_empty() && Path::new(trimmed).is_file() {
        read_indices(Path::new(trimmed))
    } else {
        parse_task_string(spec)
    }
}

/// Parse the textual forms of a task specification, never touching the file system
pub fn parse_task_string(spec: &str) -> Result<Vec<Index>, TaskSpecError> {
    let malformed = || TaskSpecError::MalformedTaskSpec(spec.to_string());
    let parse = |value: &str| value.trim().parse::<Index>().map_err(|_| malformed());

    if let Some((start, stop)) = spec.split_once('>') {
        Ok((parse(start)?..parse(stop)?).collect())
    } else if spec.contains(',') {
        spec.split(',').map(parse).collect()
    } else {
        parse(spec).map(|index| vec![index])
    }
}

/// Read an index file written by `write_indices`.
///
/// Files that are not a YAML list of integers fall back to interpreting their first line as a
/// task string, the original parse failure is logged.
pub fn read_indices(path: &Path) -> Result<Vec<Index>, TaskSpecError> {
    let content = fs::read_to_string(path).map_err(|source| TaskSpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        debug!(path = ?path, "Index file is empty");
        return Ok(Vec::new());
    }

    match serde_yaml::from_str::<Vec<Index>>(&content) {
        Ok(indices) => {
            info!("Read {} with {} indices", path.display(), indices.len());

            Ok(indices)
        }
        Err(error) => {
            warn!(
                path = ?path,
                error = %error,
                "Index file is not a YAML list, falling back to parsing its first line as a task string"
            );

            parse_task_string(content.lines().next().unwrap_or_default())
        }
    }
}

pub fn write_indices(path: &Path, indices: &[Index]) -> Result<(), TaskSpecError> {
    let content = serde_yaml::to_string(indices)?;

    fs::write(path, content).map_err(|source| TaskSpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {} with {} indices", path.display(), indices.len());

    Ok(())
}

/// Path of the rerun variant of an index file: `indices__job.yaml` -> `indices__job_rerun.yaml`
pub fn rerun_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(extension) => format!("{stem}_rerun.{}", extension.to_string_lossy()),
        None => format!("{stem}_rerun"),
    };

    path.with_file_name(file_name)
}

/// Short description of a set of indices for log lines
pub fn describe(indices: &[Index]) -> String {
    let consecutive = indices
        .windows(2)
        .all(|pair| pair[0].checked_add(1) == Some(pair[1]));

    match (indices.first(), indices.last()) {
        (Some(first), Some(&last)) if consecutive => format!("{first} > {}", i128::from(last) + 1),
        _ => format!("{indices:?}"),
    }
}
