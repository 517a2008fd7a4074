use super::locking::locked_append;
use chrono::Local;
use once_cell::sync::Lazy;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::warn;

static HOSTNAME: Lazy<String> = Lazy::new(|| match nix::unistd::gethostname() {
    Ok(hostname) => hostname.to_string_lossy().into_owned(),
    Err(error) => {
        warn!(error = ?error, "Failed to retrieve hostname for job log");
        String::from("unknown")
    }
});

/// Free text log of a job, one timestamped line per event.
///
/// Lines are appended under the same lock as the ledger so workers of a job array can share it.
#[derive(Debug, Clone)]
pub struct JobLog {
    path: PathBuf,
}

impl JobLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, line: impl AsRef<str>) -> io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");

        locked_append(
            &self.path,
            &format!("{timestamp}    {}    {}\n", *HOSTNAME, line.as_ref()),
        )
    }
}
