use super::locking::locked_append;
use crate::{executable::ExecutableError, tasks::Index};
use itertools::Itertools;
use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

/// Interval between checks for a ledger that has not been written yet
pub const LEDGER_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to access ledger {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Ledger {path:?} contains a malformed line: '{line}'")]
    Malformed { path: PathBuf, line: String },
    #[error("Corruption check failed")]
    CorruptionCheck(#[from] ExecutableError),
}

/// Append only record of finished indices, shared by all workers of a job.
///
/// Every record is written under an exclusive file lock. The ledger is a logical set, duplicates
/// are tolerated and removed when reading.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    poll_interval: Duration,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: LEDGER_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn record_done(&self, index: Index) -> Result<(), LedgerError> {
        locked_append(&self.path, &format!("{index}\n")).map_err(|source| self.io_error(source))
    }

    /// All indices recorded so far, a ledger that does not exist yet is empty
    pub fn recorded(&self) -> Result<BTreeSet<Index>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<Index>().map_err(|_| LedgerError::Malformed {
                    path: self.path.clone(),
                    line: line.to_string(),
                })
            })
            .collect()
    }

    /// Block until the ledger exists, polling with the configured interval.
    ///
    /// This never returns if no worker ever records an index.
    pub fn wait_until_exists(&self) {
        while !self.exists() {
            debug!(path = ?self.path, "Waiting for ledger to be written");
            thread::sleep(self.poll_interval);
        }
    }

    /// Indices of `all` that still need to run: the ones never recorded plus the ones reported
    /// by the optional corruption check. The result is sorted and free of duplicates.
    ///
    /// Blocks until the ledger exists, see `wait_until_exists`.
    pub fn missing_indices<F>(
        &self,
        all: &[Index],
        corruption_check: Option<F>,
    ) -> Result<Vec<Index>, LedgerError>
    where
        F: FnOnce(&[Index]) -> Result<Vec<Index>, ExecutableError>,
    {
        self.wait_until_exists();
        self.missing_indices_now(all, corruption_check)
    }

    /// Same as `missing_indices` but treats a ledger that does not exist yet as empty
    pub fn missing_indices_now<F>(
        &self,
        all: &[Index],
        corruption_check: Option<F>,
    ) -> Result<Vec<Index>, LedgerError>
    where
        F: FnOnce(&[Index]) -> Result<Vec<Index>, ExecutableError>,
    {
        let done = self.recorded()?;
        let failed = all.iter().filter(|index| !done.contains(index)).copied();

        let corrupted = match corruption_check {
            Some(check) => {
                info!("Running corruption check over {} indices", all.len());
                check(all)?
            }
            None => Vec::new(),
        };

        Ok(failed.chain(corrupted).sorted().dedup().collect())
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
