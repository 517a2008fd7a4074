pub mod native;
pub mod process;


pub use native::NativeExecutable;
pub use process::ProcessExecutable;

use crate::{config::ResourceOverrides, tasks::Index};
use std::{collections::BTreeSet, convert::Infallible, fmt, io, path::Path, str::FromStr};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExecutableError {
    #[error("Failed to spawn executable {path:?}")]
    Spawn {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Executable does not implement stage '{0}'")]
    MissingStage(Stage),
    #[error("Stage '{stage}' failed with {status}: {stderr}")]
    Failed {
        stage: Stage,
        status: String,
        stderr: String,
    },
    #[error("Stage '{0}' timed out")]
    Timeout(Stage),
    #[error("Stage '{0}' did not produce any index, expected exactly one")]
    EmptyStream(Stage),
    #[error("Failed to communicate with executable")]
    Io(#[from] io::Error),
    #[error("Failed to parse executable output")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Native(String),
}

/// Named stages a user executable may implement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Setup,
    Resources,
    Preprocess,
    Main,
    Merge,
    Missing,
    CheckMissing,
    Watchdog,
    Custom(String),
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Setup => "setup",
            Self::Resources => "resources",
            Self::Preprocess => "preprocess",
            Self::Main => "main",
            Self::Merge => "merge",
            Self::Missing => "missing",
            Self::CheckMissing => "check_missing",
            Self::Watchdog => "watchdog",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for Stage {
    fn from(name: &str) -> Self {
        match name {
            "setup" => Self::Setup,
            "resources" => Self::Resources,
            "preprocess" => Self::Preprocess,
            "main" => Self::Main,
            "merge" => Self::Merge,
            "missing" => Self::Missing,
            "check_missing" => Self::CheckMissing,
            "watchdog" => Self::Watchdog,
            custom => Self::Custom(custom.to_string()),
        }
    }
}

impl FromStr for Stage {
    type Err = Infallible;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(name))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of stages an executable implements, resolved once when it is loaded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Stage>);

impl Capabilities {
    pub fn has(&self, stage: &Stage) -> bool {
        self.0.contains(stage)
    }

    pub fn insert(&mut self, stage: Stage) {
        self.0.insert(stage);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.0.iter()
    }
}

impl FromIterator<Stage> for Capabilities {
    fn from_iter<T: IntoIterator<Item = Stage>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.0.iter().map(Stage::as_str).collect::<Vec<_>>();

        write!(f, "[{}]", names.join(", "))
    }
}

/// Lazy, finite and non restartable sequence of indices emitted by a stage
pub type IndexStream = Box<dyn Iterator<Item = Result<Index, ExecutableError>> + Send>;

/// All supported kinds of user executables
#[derive(Debug, Clone)]
pub enum Executables {
    Process(ProcessExecutable),
    Native(NativeExecutable),
}

impl Executables {
    /// Load an executable from disk and query its capabilities
    pub fn load(path: &Path) -> Result<Self, ExecutableError> {
        let executable = ProcessExecutable::load(path)?;
        info!(
            "Imported {} implementing {}",
            path.display(),
            executable.capabilities()
        );

        Ok(Self::Process(executable))
    }

    pub fn capabilities(&self) -> &Capabilities {
        match self {
            Self::Process(executable) => executable.capabilities(),
            Self::Native(executable) => executable.capabilities(),
        }
    }

    pub fn has(&self, stage: &Stage) -> bool {
        self.capabilities().has(stage)
    }

    /// Run the `setup` stage if the executable implements it
    pub fn setup(&self, args: &[String]) -> Result<(), ExecutableError> {
        if !self.has(&Stage::Setup) {
            return Ok(());
        }

        info!("Running setup from executable");
        match self {
            Self::Process(executable) => executable.setup(args),
            Self::Native(executable) => executable.setup(args),
        }
    }

    /// Resources requested by the `resources` stage, `None` if it is not implemented
    pub fn resources(&self, args: &[String]) -> Result<Option<ResourceOverrides>, ExecutableError> {
        if !self.has(&Stage::Resources) {
            return Ok(None);
        }

        info!("Getting cluster resources from executable");
        match self {
            Self::Process(executable) => executable.resources(args).map(Some),
            Self::Native(executable) => Ok(executable.resources()),
        }
    }

    /// Start a stage over `indices`, the returned stream has to be consumed to drive it
    pub fn call(
        &self,
        stage: &Stage,
        indices: Vec<Index>,
        args: &[String],
    ) -> Result<IndexStream, ExecutableError> {
        if !self.has(stage) {
            return Err(ExecutableError::MissingStage(stage.clone()));
        }

        match self {
            Self::Process(executable) => executable.call(stage, indices, args),
            Self::Native(executable) => executable.call(stage, indices, args),
        }
    }

    /// Run a stage to completion and collect everything it emitted
    pub fn drain(
        &self,
        stage: &Stage,
        indices: Vec<Index>,
        args: &[String],
    ) -> Result<Vec<Index>, ExecutableError> {
        self.call(stage, indices, args)?.collect()
    }

    /// Run a stage until it emitted its first index, used for single task pools
    pub fn take_one(
        &self,
        stage: &Stage,
        indices: Vec<Index>,
        args: &[String],
    ) -> Result<Index, ExecutableError> {
        match self.call(stage, indices, args)?.next() {
            Some(result) => result,
            None => Err(ExecutableError::EmptyStream(stage.clone())),
        }
    }
}

impl From<NativeExecutable> for Executables {
    fn from(executable: NativeExecutable) -> Self {
        Self::Native(executable)
    }
}
