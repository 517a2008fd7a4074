use crate::scheduler::plan::Function;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env,
    fs::{self, File},
    io,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_LOG_DIR: &str = "jobchain_logs";
pub const DEFAULT_INDICES_DIR: &str = "jobchain_indices";
pub const SUBMIT_DIR_VAR: &str = "SUBMIT_DIR";
pub const LOCAL_SCRATCH_VAR: &str = "JOBCHAIN_LOCAL_SCRATCH";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// Locate the user executable, relative paths fall back to `$SUBMIT_DIR` when a worker already
/// moved into local scratch
pub fn resolve_executable(path: &Path) -> Result<PathBuf, ConfigErrors> {
    let candidate = if path.is_file() || path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::var_os(SUBMIT_DIR_VAR) {
            Some(submit_dir) => {
                debug!("Executable not found in cwd, looking in {SUBMIT_DIR_VAR}");
                PathBuf::from(submit_dir).join(path)
            }
            None => path.to_path_buf(),
        }
    };

    if !check_executable(&candidate)? {
        return Err(ConfigErrors::NotExecutable(candidate));
    }

    Ok(candidate.canonicalize()?)
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File {0:?} not found")]
    FileNotFound(PathBuf),
    #[error("{0:?} is not executable")]
    NotExecutable(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] io::Error),
    #[error("Resource argument '{0}' is not of the form key=value")]
    MalformedResource(String),
    #[error("Number of cores '{0}' is not a positive integer")]
    InvalidCores(String),
}

/// Cluster resources of one group of functions
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ResourceBucket {
    /// Memory per core in MB
    pub memory: f64,
    /// Wall time in hours
    pub time: f64,
    /// Local scratch per core in MB
    pub scratch: f64,
    pub nproc: u32,
    pub ngpu: u32,
}

impl Default for ResourceBucket {
    fn default() -> Self {
        Self {
            memory: 1000.0,
            time: 4.0,
            scratch: 2000.0,
            nproc: 1,
            ngpu: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resources {
    pub main: ResourceBucket,
    pub preprocess: ResourceBucket,
    pub merge: ResourceBucket,
    /// Hours per index of a main task, replaces `main.time` once the task count is known
    pub main_time_per_index: Option<f64>,
    /// Passthrough flags for the batch system, kept in the order they were given
    pub extra: Vec<(String, String)>,
}

/// Flat, partial resource description as returned by the `resources` stage of an executable or
/// given on the command line
#[derive(Deserialize, Serialize, Args, Clone, Debug, Default, PartialEq)]
pub struct ResourceOverrides {
    /// Memory per core of main jobs in MB
    #[arg(long)]
    pub main_memory: Option<f64>,
    /// Wall time of main jobs in hours
    #[arg(long)]
    pub main_time: Option<f64>,
    /// Wall time per index of main jobs in hours, replaces --main-time
    #[arg(long)]
    pub main_time_per_index: Option<f64>,
    /// Local scratch per core of main jobs in MB
    #[arg(long)]
    pub main_scratch: Option<f64>,
    /// Cores per task of main jobs
    #[arg(long)]
    pub main_nproc: Option<u32>,
    #[arg(long)]
    pub main_ngpu: Option<u32>,
    #[arg(long)]
    pub preprocess_memory: Option<f64>,
    #[arg(long)]
    pub preprocess_time: Option<f64>,
    #[arg(long)]
    pub preprocess_scratch: Option<f64>,
    #[arg(long)]
    pub preprocess_nproc: Option<u32>,
    #[arg(long)]
    pub preprocess_ngpu: Option<u32>,
    #[arg(long)]
    pub merge_memory: Option<f64>,
    #[arg(long)]
    pub merge_time: Option<f64>,
    #[arg(long)]
    pub merge_scratch: Option<f64>,
    #[arg(long)]
    pub merge_nproc: Option<u32>,
    #[arg(long)]
    pub merge_ngpu: Option<u32>,

    #[serde(flatten)]
    #[arg(skip)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

fn apply_bucket(
    bucket: &mut ResourceBucket,
    memory: Option<f64>,
    time: Option<f64>,
    scratch: Option<f64>,
    nproc: Option<u32>,
    ngpu: Option<u32>,
) {
    if let Some(memory) = memory {
        bucket.memory = memory;
    }
    if let Some(time) = time {
        bucket.time = time;
    }
    if let Some(scratch) = scratch {
        bucket.scratch = scratch;
    }
    if let Some(nproc) = nproc {
        bucket.nproc = nproc;
    }
    if let Some(ngpu) = ngpu {
        bucket.ngpu = ngpu;
    }
}

impl Resources {
    /// Layer a partial description on top, set values win
    pub fn apply(&mut self, overrides: &ResourceOverrides) {
        for key in overrides.other.keys() {
            warn!("Ignoring unknown resource '{key}'");
        }

        let o = overrides;
        apply_bucket(
            &mut self.main,
            o.main_memory,
            o.main_time,
            o.main_scratch,
            o.main_nproc,
            o.main_ngpu,
        );
        apply_bucket(
            &mut self.preprocess,
            o.preprocess_memory,
            o.preprocess_time,
            o.preprocess_scratch,
            o.preprocess_nproc,
            o.preprocess_ngpu,
        );
        apply_bucket(
            &mut self.merge,
            o.merge_memory,
            o.merge_time,
            o.merge_scratch,
            o.merge_nproc,
            o.merge_ngpu,
        );

        // an explicit wall time of a later layer replaces a per index estimate of an earlier one
        if o.main_time.is_some() {
            self.main_time_per_index = None;
        }
        if o.main_time_per_index.is_some() {
            self.main_time_per_index = o.main_time_per_index;
        }
    }

    /// Turn a per index wall time into an absolute one: `time_per_index * ceil(n / n_cores)`
    pub fn resolve_time_per_index(&mut self, n_indices: usize, n_cores: usize) {
        if let Some(time_per_index) = self.main_time_per_index.take() {
            let per_core = n_indices.div_ceil(n_cores.max(1));
            self.main.time = time_per_index * per_core as f64;
            debug!(
                time = self.main.time,
                "Resolved main wall time from time per index"
            );
        }
    }

    /// Select the resources a function is submitted with
    pub fn bucket_for(&self, function: &Function) -> ResourceBucket {
        match function {
            Function::Main | Function::RerunMissing => self.main.clone(),
            Function::Preprocess => self.preprocess.clone(),
            Function::Merge => self.merge.clone(),
            Function::Missing => ResourceBucket {
                nproc: 1,
                ..self.merge.clone()
            },
            Function::Watchdog | Function::Custom(_) => self.main.clone(),
        }
    }
}

/// Parse `key=value` for passthrough resources
pub fn parse_key_value(argument: &str) -> Result<(String, String), ConfigErrors> {
    match argument.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigErrors::MalformedResource(argument.to_string())),
    }
}

/// Parse a strictly positive core count
pub fn parse_n_cores(argument: &str) -> Result<usize, ConfigErrors> {
    match argument.trim().parse::<usize>() {
        Ok(n_cores) if n_cores > 0 => Ok(n_cores),
        _ => Err(ConfigErrors::InvalidCores(argument.to_string())),
    }
}

/// Directory layout shared between the submitting process and its workers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    pub submit_dir: PathBuf,
    pub log_dir: PathBuf,
    pub indices_dir: PathBuf,
}

impl Workspace {
    pub fn new(submit_dir: PathBuf, log_dir: &Path) -> Self {
        Self {
            log_dir: submit_dir.join(log_dir),
            indices_dir: submit_dir.join(DEFAULT_INDICES_DIR),
            submit_dir,
        }
    }

    /// Layout rooted in the current working directory
    pub fn current(log_dir: &Path) -> Result<Self, ConfigErrors> {
        Ok(Self::new(env::current_dir()?, log_dir))
    }

    pub fn create(&self) -> Result<(), ConfigErrors> {
        fs::create_dir_all(&self.log_dir)?;
        fs::create_dir_all(&self.indices_dir)?;

        Ok(())
    }

    pub fn job_log(&self, job_name: &str) -> PathBuf {
        self.log_dir.join(format!("{job_name}.log"))
    }

    pub fn ledger(&self, job_name: &str) -> PathBuf {
        self.log_dir.join(format!("{job_name}_done.dat"))
    }

    pub fn indices_file(&self, job_name: &str) -> PathBuf {
        self.indices_dir.join(format!("indices__{job_name}.yaml"))
    }

    /// stdout and stderr files of a submission unit
    pub fn unit_logs(&self, job_name: &str, unit: &str) -> (PathBuf, PathBuf) {
        (
            self.log_dir.join(format!("{job_name}_{unit}.o")),
            self.log_dir.join(format!("{job_name}_{unit}.e")),
        )
    }

    pub fn slurm_script(&self, job_name: &str, unit: &str) -> PathBuf {
        self.log_dir.join(format!("{job_name}_{unit}.slurm"))
    }

    /// Remove the log files a previous submission of the unit left behind, including the per
    /// array task variants (`<job>_<unit>.o_3`)
    pub fn clear_unit_logs(&self, job_name: &str, unit: &str) -> Result<(), ConfigErrors> {
        let (stdout, stderr) = self.unit_logs(job_name, unit);
        let prefixes = [stdout, stderr]
            .iter()
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();

        let entries = match fs::read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();

            let stale = prefixes.iter().any(|prefix| match name.strip_prefix(prefix.as_str()) {
                Some("") => true,
                Some(suffix) => suffix
                    .strip_prefix('_')
                    .is_some_and(|task| !task.is_empty() && task.chars().all(|c| c.is_ascii_digit())),
                None => false,
            });

            if stale {
                debug!("Removing old log file {name}");
                fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }
}
