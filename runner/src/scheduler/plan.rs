use super::SchedulerError;
use crate::{
    executable::{Capabilities, Stage},
    executors::dependency::Predicate,
};
use itertools::Itertools;
use std::{convert::Infallible, fmt, path::PathBuf, str::FromStr};

/// What a unit runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Function {
    Main,
    Preprocess,
    Merge,
    Missing,
    RerunMissing,
    Watchdog,
    Custom(String),
}

impl Function {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Main => "main",
            Self::Preprocess => "preprocess",
            Self::Merge => "merge",
            Self::Missing => "missing",
            Self::RerunMissing => "rerun_missing",
            Self::Watchdog => "watchdog",
            Self::Custom(name) => name,
        }
    }

    /// Stage of the executable that does the work
    pub fn stage(&self) -> Stage {
        match self {
            Self::Main | Self::RerunMissing => Stage::Main,
            Self::Preprocess => Stage::Preprocess,
            Self::Merge => Stage::Merge,
            Self::Missing => Stage::Missing,
            Self::Watchdog => Stage::Watchdog,
            Self::Custom(name) => Stage::from(name.as_str()),
        }
    }

    /// Whether the executable has to implement `stage()` for the function to run,
    /// `missing` can always fall back to the ledger
    pub fn requires_stage(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

impl From<&str> for Function {
    fn from(name: &str) -> Self {
        match name.trim() {
            "main" => Self::Main,
            "preprocess" => Self::Preprocess,
            "merge" => Self::Merge,
            "missing" => Self::Missing,
            "rerun_missing" => Self::RerunMissing,
            "watchdog" => Self::Watchdog,
            custom => Self::Custom(custom.to_string()),
        }
    }
}

impl FromStr for Function {
    type Err = Infallible;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(name))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which functions a chain consists of
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionSelector {
    /// preprocess (if implemented), main, reruns and merge
    All,
    /// main, reruns and merge
    MainMerge,
    /// Independent units, one per function
    List(Vec<Function>),
}

impl FromStr for FunctionSelector {
    type Err = Infallible;

    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        Ok(match selector.trim() {
            "all" => Self::All,
            "main+merge" => Self::MainMerge,
            list => Self::List(
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(Function::from)
                    .unique()
                    .collect(),
            ),
        })
    }
}

/// Start condition of `merge0` in a full chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeDependencyMode {
    /// Once the last main or rerun unit ended
    #[default]
    After,
    /// As soon as `main0` ended or runs, for merges that poll for results
    Along,
}

impl FromStr for MergeDependencyMode {
    type Err = SchedulerError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.trim() {
            "after" => Ok(Self::After),
            "along" => Ok(Self::Along),
            other => Err(SchedulerError::UnknownMergeMode(other.to_string())),
        }
    }
}

impl fmt::Display for MergeDependencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::After => "after",
            Self::Along => "along",
        })
    }
}

/// One named step of a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionUnit {
    pub name: String,
    pub function: Function,
    pub n_cores: usize,
    /// Unit that has to be submitted before this one
    pub predecessor: Option<String>,
    /// Condition on the predecessor, `None` if the unit does not wait
    pub start: Option<Predicate>,
    /// Index file the unit works on
    pub indices: PathBuf,
}

/// Parameters the shape of a chain depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    pub selector: FunctionSelector,
    pub n_cores: usize,
    pub n_rerun: usize,
    pub merge_mode: MergeDependencyMode,
    pub indices: PathBuf,
    /// Index file `missing` writes and rerun units read
    pub rerun_indices: PathBuf,
}

impl FlowConfig {
    /// Cores of a rerun: a tenth of the requested cores, rounded up
    pub fn rerun_cores(&self) -> usize {
        self.n_cores.div_ceil(10).max(1)
    }
}

/// Expand a selector into the ordered units of a chain
pub fn plan(capabilities: &Capabilities, config: &FlowConfig) -> Vec<SubmissionUnit> {
    let unit = |name: String,
                function: Function,
                n_cores: usize,
                predecessor: Option<String>,
                start: Option<Predicate>,
                indices: &PathBuf| SubmissionUnit {
        name,
        function,
        n_cores,
        predecessor,
        start,
        indices: indices.clone(),
    };

    let functions = match &config.selector {
        FunctionSelector::List(functions) => {
            return functions
                .iter()
                .map(|function| {
                    let n_cores = match function {
                        Function::Missing | Function::Merge | Function::Preprocess => 1,
                        _ => config.n_cores,
                    };

                    unit(
                        function.to_string(),
                        function.clone(),
                        n_cores,
                        None,
                        None,
                        &config.indices,
                    )
                })
                .collect();
        }
        selector => selector,
    };

    let mut units = Vec::with_capacity(3 + 2 * config.n_rerun);

    let main_predecessor =
        if *functions == FunctionSelector::All && capabilities.has(&Stage::Preprocess) {
            units.push(unit(
                "preprocess0".to_string(),
                Function::Preprocess,
                1,
                None,
                None,
                &config.indices,
            ));
            Some("preprocess0".to_string())
        } else {
            None
        };

    let main_start = main_predecessor.as_ref().map(|_| Predicate::AllEnded);
    units.push(unit(
        "main0".to_string(),
        Function::Main,
        config.n_cores,
        main_predecessor,
        main_start,
        &config.indices,
    ));

    for rerun in 1..=config.n_rerun {
        units.push(unit(
            format!("missing{rerun}"),
            Function::Missing,
            1,
            Some(format!("main{}", rerun - 1)),
            Some(Predicate::AllEnded),
            &config.indices,
        ));
        units.push(unit(
            format!("main{rerun}"),
            Function::Main,
            config.rerun_cores(),
            Some(format!("missing{rerun}")),
            Some(Predicate::AllEnded),
            &config.rerun_indices,
        ));
    }

    let (merge_predecessor, merge_start) = match config.merge_mode {
        MergeDependencyMode::After => (format!("main{}", config.n_rerun), Predicate::AllEnded),
        MergeDependencyMode::Along => ("main0".to_string(), Predicate::EndedOrRunning),
    };
    units.push(unit(
        "merge0".to_string(),
        Function::Merge,
        1,
        Some(merge_predecessor),
        Some(merge_start),
        &config.indices,
    ));

    units
}
