//! Expands a pipeline file into `jobchain submit` calls and threads the job ids of earlier
//! steps into the dependencies of later ones.

pub mod config;
pub mod expand;
pub mod submit;
pub mod template;


use jobchain::executors::{transport::SubmitError, ExecutorError};
use std::{fs, io, path::Path, path::PathBuf};
use thiserror::Error;

pub use config::{DepList, JobStep, LoopStep, ParameterStep, Step};
pub use expand::{Expander, PipelineContext};
pub use submit::{DryRunSubmitter, ShellSubmitter, Submitter};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Parameter '{0}' is not defined by any parameters step")]
    UndefinedParameter(String),
    #[error("Malformed command template '{template}': {reason}")]
    MalformedTemplate { template: String, reason: String },
    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("Did not get any job id from '{command}'")]
    MissingJobId { command: String },
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("Failed to parse pipeline")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to read pipeline {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read the steps of a pipeline file
pub fn load_pipeline(path: &Path) -> Result<Vec<Step>, PipelineError> {
    let content = fs::read_to_string(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_pipeline(&content)
}

pub fn parse_pipeline(content: &str) -> Result<Vec<Step>, PipelineError> {
    Ok(serde_yaml::from_str(content)?)
}
