pub mod cli;
pub mod config;
pub mod distributed;
pub mod executable;
pub mod executors;
pub mod logging;
pub mod scheduler;
pub mod sync;
pub mod tasks;

#[cfg(test)]
mod config_test;

pub use executable::{Capabilities, Executables, ExecutableError, NativeExecutable, Stage};
pub use executors::{
    dependency::{Dependency, Predicate},
    BatchSystem, JobId, Mode,
};
pub use scheduler::{
    plan::{Function, FunctionSelector, MergeDependencyMode, SubmissionUnit},
    registry::JobRegistry,
    ChainContext, JobChain, SchedulerError,
};
pub use tasks::Index;
