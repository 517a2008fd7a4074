use nix::{
    errno::Errno,
    fcntl::{flock, FlockArg},
};
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    os::unix::io::AsRawFd,
    path::Path,
};
use tracing::warn;

/// Exclusive `flock(2)` on an open file, released on drop
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    /// Block until the exclusive lock is held, there is no timeout
    pub fn exclusive(file: &'a File) -> io::Result<Self> {
        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusive) {
                Ok(()) => return Ok(Self { file }),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    pub fn file(&self) -> &'a File {
        self.file
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(errno) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!(error = ?errno, "Failed to release file lock");
        }
    }
}

/// Append `content` to `path` while holding an exclusive lock on it.
///
/// The content is flushed and synced to disk before the lock is released, concurrent writers to
/// the same path never interleave.
pub fn locked_append(path: &Path, content: &str) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let lock = FileLock::exclusive(&file)?;
    let mut handle = lock.file();

    handle.write_all(content.as_bytes())?;
    handle.flush()?;
    handle.sync_all()?;

    drop(lock);

    Ok(())
}
