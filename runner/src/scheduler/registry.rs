use crate::executors::JobId;
use std::collections::BTreeMap;

/// Job ids of everything submitted so far, by unit or step name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Vec<JobId>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ids under `name`, ids of an earlier registration of the same name are kept
    pub fn register(&mut self, name: &str, ids: impl IntoIterator<Item = JobId>) {
        self.jobs.entry(name.to_string()).or_default().extend(ids);
    }

    pub fn get(&self, name: &str) -> Option<&[JobId]> {
        self.jobs.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
