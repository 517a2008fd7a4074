use super::{Capabilities, ExecutableError, IndexStream, Stage};
use crate::{config::ResourceOverrides, tasks::Index};
use std::{collections::BTreeMap, fmt, sync::Arc};

pub type StageHandler = Arc<dyn Fn(Vec<Index>, Vec<String>) -> IndexStream + Send + Sync>;
pub type SetupHandler = Arc<dyn Fn(&[String]) -> Result<(), ExecutableError> + Send + Sync>;

/// Executable built from closures, one handle per implemented stage.
///
/// Used for in-process runs, e.g., when the runner is embedded as a library or in tests.
#[derive(Clone, Default)]
pub struct NativeExecutable {
    capabilities: Capabilities,
    stages: BTreeMap<Stage, StageHandler>,
    setup: Option<SetupHandler>,
    resources: Option<ResourceOverrides>,
}

impl fmt::Debug for NativeExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeExecutable")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl NativeExecutable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lazy stage
    pub fn stage<F>(mut self, stage: Stage, handler: F) -> Self
    where
        F: Fn(Vec<Index>, Vec<String>) -> IndexStream + Send + Sync + 'static,
    {
        self.capabilities.insert(stage.clone());
        self.stages.insert(stage, Arc::new(handler));
        self
    }

    /// Register a stage that processes one index at a time and emits it once done
    pub fn per_index<F>(self, stage: Stage, handler: F) -> Self
    where
        F: Fn(Index, &[String]) -> Result<(), ExecutableError> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        self.stage(stage, move |indices, args| {
            let handler = handler.clone();

            Box::new(
                indices
                    .into_iter()
                    .map(move |index| handler(index, &args).map(|_| index)),
            )
        })
    }

    /// Register a stage that computes its whole result at once
    pub fn eager<F>(self, stage: Stage, handler: F) -> Self
    where
        F: Fn(&[Index], &[String]) -> Result<Vec<Index>, ExecutableError> + Send + Sync + 'static,
    {
        self.stage(stage, move |indices, args| match handler(&indices, &args) {
            Ok(result) => Box::new(result.into_iter().map(Ok)),
            Err(error) => Box::new(std::iter::once(Err(error))),
        })
    }

    pub fn with_setup<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<(), ExecutableError> + Send + Sync + 'static,
    {
        self.capabilities.insert(Stage::Setup);
        self.setup = Some(Arc::new(handler));
        self
    }

    pub fn with_resources(mut self, resources: ResourceOverrides) -> Self {
        self.capabilities.insert(Stage::Resources);
        self.resources = Some(resources);
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn setup(&self, args: &[String]) -> Result<(), ExecutableError> {
        match &self.setup {
            Some(handler) => handler(args),
            None => Ok(()),
        }
    }

    pub fn resources(&self) -> Option<ResourceOverrides> {
        self.resources.clone()
    }

    pub fn call(
        &self,
        stage: &Stage,
        indices: Vec<Index>,
        args: &[String],
    ) -> Result<IndexStream, ExecutableError> {
        match self.stages.get(stage) {
            Some(handler) => Ok(handler(indices, args.to_vec())),
            None => Err(ExecutableError::MissingStage(stage.clone())),
        }
    }
}
