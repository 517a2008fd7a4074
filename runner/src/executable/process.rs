use super::{Capabilities, ExecutableError, IndexStream, Stage};
use crate::{config::ResourceOverrides, tasks::Index};
use std::{
    io::{BufRead, BufReader, Lines, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

const STAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Executable living on disk, driven through its command line and standard streams
#[derive(Debug, Clone)]
pub struct ProcessExecutable {
    path: PathBuf,
    capabilities: Capabilities,
    timeout: Duration,
}

impl ProcessExecutable {
    pub fn load(path: &Path) -> Result<Self, ExecutableError> {
        let stage = Stage::Custom("capabilities".to_string());
        let output = run_to_completion(path, &stage, &[], STAGE_TIMEOUT)?;
        let names: Vec<String> = serde_yaml::from_str(&output)?;

        Ok(Self {
            path: path.to_path_buf(),
            capabilities: names.iter().map(|name| Stage::from(name.trim())).collect(),
            timeout: STAGE_TIMEOUT,
        })
    }

    /// Limit the runtime of the short lived `setup` and `resources` stages
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn setup(&self, args: &[String]) -> Result<(), ExecutableError> {
        let output = run_to_completion(&self.path, &Stage::Setup, args, self.timeout)?;
        forward_lines(&output);

        Ok(())
    }

    pub fn resources(&self, args: &[String]) -> Result<ResourceOverrides, ExecutableError> {
        let output = run_to_completion(&self.path, &Stage::Resources, args, self.timeout)?;

        Ok(serde_yaml::from_str(&output)?)
    }

    pub fn call(
        &self,
        stage: &Stage,
        indices: Vec<Index>,
        args: &[String],
    ) -> Result<IndexStream, ExecutableError> {
        let mut handle = Command::new(&self.path)
            .arg(stage.as_str())
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ExecutableError::Spawn {
                path: self.path.clone(),
                source,
            })?;
        debug!(pid = handle.id(), stage = %stage, "Started executable stage");

        let payload = serde_yaml::to_string(&indices)?;
        // stdin is fed from a thread while the caller consumes stdout,
        // dropping it at the end marks the end of the index list
        let writer = handle.stdin.take().map(|mut stdin| {
            thread::spawn(move || stdin.write_all(payload.as_bytes()))
        });

        let lines = match handle.stdout.take() {
            Some(stdout) => BufReader::new(stdout).lines(),
            None => {
                return Err(ExecutableError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "stdout of executable is not captured",
                )))
            }
        };

        Ok(Box::new(ProcessStream {
            stage: stage.clone(),
            child: Some(handle),
            lines: Some(lines),
            writer,
        }))
    }
}

/// Run a short lived stage and return its full stdout
fn run_to_completion(
    path: &Path,
    stage: &Stage,
    args: &[String],
    timeout: Duration,
) -> Result<String, ExecutableError> {
    let mut handle = Command::new(path)
        .arg(stage.as_str())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecutableError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

    // both pipes are drained while waiting, a full pipe would block the child
    let stdout = handle.stdout.take().map(read_to_end);
    let stderr = handle.stderr.take().map(read_to_end);

    let status = match handle.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            warn!(stage = %stage, "Executable ran into timeout, killing it");
            handle.kill()?;
            handle.wait()?;

            return Err(ExecutableError::Timeout(stage.clone()));
        }
    };

    let stdout = join_output(stdout)?;
    let stderr = join_output(stderr)?;

    if !status.success() {
        return Err(ExecutableError::Failed {
            stage: stage.clone(),
            status: status.to_string(),
            stderr,
        });
    }

    forward_lines(&stderr);

    Ok(stdout)
}

fn read_to_end<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = String::new();
        pipe.read_to_string(&mut buffer).map(|_| buffer)
    })
}

fn join_output(
    reader: Option<JoinHandle<std::io::Result<String>>>,
) -> Result<String, ExecutableError> {
    match reader.map(JoinHandle::join) {
        Some(Ok(result)) => Ok(result?),
        Some(Err(_)) => {
            warn!("Reader thread for executable output panicked");
            Ok(String::new())
        }
        None => Ok(String::new()),
    }
}

fn forward_lines(output: &str) {
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        info!("{line}");
    }
}

/// Lazily reads indices from a running stage, the child is reaped when the
/// stream is exhausted or dropped
struct ProcessStream {
    stage: Stage,
    child: Option<Child>,
    lines: Option<Lines<BufReader<ChildStdout>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
}

impl ProcessStream {
    fn finish(&mut self) -> Result<(), ExecutableError> {
        // closes our end of stdout so a child still writing receives a broken pipe
        self.lines = None;

        if let Some(writer) = self.writer.take() {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => debug!(error = ?error, "Executable closed stdin early"),
                Err(_) => warn!("Writer thread for executable stdin panicked"),
            }
        }

        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            debug!(status = ?status, stage = %self.stage, "Executable stage exited");

            if !status.success() {
                return Err(ExecutableError::Failed {
                    stage: self.stage.clone(),
                    status: status.to_string(),
                    stderr: String::new(),
                });
            }
        }

        Ok(())
    }
}

impl Iterator for ProcessStream {
    type Item = Result<Index, ExecutableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.as_mut()?.next() {
                Some(Ok(line)) => match line.trim().parse::<Index>() {
                    Ok(index) => return Some(Ok(index)),
                    Err(_) => info!("{line}"),
                },
                Some(Err(error)) => {
                    self.lines = None;
                    return Some(Err(error.into()));
                }
                None => return self.finish().err().map(Err),
            }
        }
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        if let Err(error) = self.finish() {
            warn!(error = %error, "Executable stage did not finish cleanly");
        }
    }
}
