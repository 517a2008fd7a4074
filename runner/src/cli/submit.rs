use super::CliError;
use crate::{
    config::{
        parse_key_value, parse_n_cores, resolve_executable, ResourceOverrides, Resources,
        Workspace, DEFAULT_LOG_DIR,
    },
    executable::Executables,
    executors::{
        dependency::Dependency,
        local::LocalExecutor,
        transport::{ProcessTransport, RecordingTransport, Transport},
        BatchExecutor, BatchSystem, Executors, Mode,
    },
    scheduler::{
        plan::{plan, FlowConfig, FunctionSelector, MergeDependencyMode},
        ChainContext, JobChain,
    },
    tasks::{self, describe},
};
use clap::Args;
use std::{env, path::PathBuf};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Executable implementing the stages
    #[arg(long)]
    pub executable: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Run)]
    pub mode: Mode,

    /// `all`, `main+merge` or a comma separated list of functions
    #[arg(long, default_value = "main")]
    pub function: FunctionSelector,

    /// An index file, a single index, a comma separated list or a range `start > stop`
    #[arg(long, default_value = "0")]
    pub tasks: String,

    /// Number of tasks of a job array, ranks of an MPI pool or local workers
    #[arg(long, default_value_t = 1, value_parser = parse_n_cores)]
    pub n_cores: usize,

    #[arg(long, default_value = "job", alias = "job_name")]
    pub job_name: String,

    /// lsf, slurm or detect to read $BATCH_SYSTEM
    #[arg(long, default_value = "detect")]
    pub system: String,

    /// How often missing indices are rerun in a full chain
    #[arg(long, default_value_t = 0)]
    pub n_rerun_missing: usize,

    /// `after` starts merge once the last main ended, `along` as soon as the first main runs
    #[arg(long, default_value = "after")]
    pub merge_dependency_mode: String,

    /// Dependency of the whole chain in the syntax of the queuing system
    #[arg(long, default_value = "")]
    pub dependency: String,

    /// File sourced by every job before the worker starts, skipped if it does not exist
    #[arg(long, default_value = "activate")]
    pub source_file: PathBuf,

    /// Maximum number of tasks of a job array running at the same time
    #[arg(long)]
    pub max_simultaneous: Option<u32>,

    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Binary providing the worker entry points, defaults to this binary
    #[arg(long)]
    pub worker: Option<PathBuf>,

    /// Print the submissions instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Passthrough resource of the queuing system, key=value
    #[arg(long = "resource", value_parser = parse_key_value)]
    pub extra_resources: Vec<(String, String)>,

    #[command(flatten)]
    pub resources: ResourceOverrides,

    /// Arguments forwarded to every stage of the executable
    #[arg(last = true)]
    pub function_args: Vec<String>,
}

pub fn run(args: SubmitArgs) -> Result<(), CliError> {
    let merge_mode = args.merge_dependency_mode.parse::<MergeDependencyMode>()?;
    // resolved before any side effect, a local chain has no use for it
    let system = if args.mode.is_local() {
        None
    } else {
        Some(BatchSystem::resolve(&args.system)?)
    };

    let workspace = Workspace::current(&args.log_dir)?;
    workspace.create()?;

    let executable_path = resolve_executable(&args.executable)?;
    let executable = Executables::load(&executable_path)?;
    executable.setup(&args.function_args)?;

    let indices = tasks::parse_indices(&args.tasks)?;
    info!("Running on tasks: {}", describe(&indices));
    let indices_file = workspace.indices_file(&args.job_name);
    tasks::write_indices(&indices_file, &indices)?;

    let mut resources = Resources::default();
    if let Some(requested) = executable.resources(&args.function_args)? {
        resources.apply(&requested);
    }
    resources.apply(&args.resources);
    resources.extra = args.extra_resources.clone();
    resources.resolve_time_per_index(indices.len(), args.n_cores);

    let flow = FlowConfig {
        selector: args.function.clone(),
        n_cores: args.n_cores,
        n_rerun: args.n_rerun_missing,
        merge_mode,
        rerun_indices: tasks::rerun_path(&indices_file),
        indices: indices_file,
    };
    let units = plan(executable.capabilities(), &flow);
    info!(
        "Chain of {} for {}: {}",
        args.job_name,
        args.mode,
        units
            .iter()
            .map(|unit| unit.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let context = ChainContext {
        job_name: args.job_name.clone(),
        workspace,
        executable_path,
        function_args: args.function_args.clone(),
        resources,
        dependency: Dependency::raw(&args.dependency),
    };
    let worker = match &args.worker {
        Some(worker) => worker.clone(),
        None => env::current_exe()?,
    };

    let process = ProcessTransport::default();
    let recording = RecordingTransport::default();
    let executor = match system {
        None => Executors::Local(LocalExecutor::new(args.mode, args.n_cores, worker)),
        Some(system) => {
            let transport: &dyn Transport = if args.dry_run {
                &recording
            } else {
                &process
            };

            Executors::Batch(BatchExecutor::new(
                system,
                args.mode,
                transport,
                worker,
                &args.source_file,
                args.max_simultaneous,
            ))
        }
    };

    let registry = JobChain::new(&context, &executable, executor).execute(&units)?;
    info!("Finished chain {} with {} submitted units", args.job_name, registry.len());

    Ok(())
}
