#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    task::JoinError,
    time::timeout,
};

/// Failures while running a subprocess to completion.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The program could not be spawned.
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
    /// Reading or waiting on the process failed.
    #[error("process I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A pipe reader task panicked or was cancelled.
    #[error("process reader task failed: {0}")]
    Join(#[from] JoinError),
    /// One of the standard pipes was not available.
    #[error("missing {0} pipe")]
    MissingPipe(&'static str),
    /// The child was already taken out of its guard.
    #[error("child process already taken from guard")]
    ChildTaken,
    /// The process did not exit before the deadline.
    #[error("subprocess timed out after {0:?}")]
    TimedOut(Duration),
    /// The process wrote more than the allowed number of bytes to stdout.
    #[error("subprocess wrote more than {0} bytes to stdout")]
    OutputTooLarge(usize),
}

/// Drop guard that terminates a spawned child process if callers forget to
/// await it, time out, or bail early.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child, ProcessError> {
        self.0.as_mut().ok_or(ProcessError::ChildTaken)
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

/// Describes how stdin should be wired for the spawned process.
#[derive(Debug)]
pub enum StdinSource {
    /// Attach nothing to stdin.
    Null,
    /// Write the provided bytes, then close stdin.
    Bytes(Vec<u8>),
}

/// Resource limits applied while collecting a subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    /// Wall-clock limit for the whole run, including reading output.
    pub deadline:   Option<Duration>,
    /// Maximum number of stdout bytes accepted before the process is killed.
    pub max_stdout: Option<usize>,
}

/// Spawns a command, optionally feeds stdin, and collects stdout/stderr
/// within the given limits.
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    stdin: StdinSource,
    limits: RunLimits,
) -> Result<Collected, ProcessError> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    match &stdin {
        StdinSource::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinSource::Bytes(_) => {
            cmd.stdin(Stdio::piped());
        }
    }

    let mut guard = ChildDropGuard::new(cmd.spawn().map_err(ProcessError::Spawn)?);

    if let StdinSource::Bytes(bytes) = stdin
        && let Some(mut handle) = guard.child_mut()?.stdin.take()
    {
        tokio::spawn(async move {
            if !bytes.is_empty() {
                let _ = handle.write_all(&bytes).await;
            }
            let _ = handle.shutdown().await;
        });
    }

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .ok_or(ProcessError::MissingPipe("stdout"))?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .ok_or(ProcessError::MissingPipe("stderr"))?;

    let max_stdout = limits.max_stdout;
    let out_task = tokio::spawn(async move {
        let reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        match max_stdout {
            // one byte past the cap is enough to tell an overflow apart
            Some(limit) => {
                reader
                    .take(limit as u64 + 1)
                    .read_to_end(&mut buf)
                    .await?;
            }
            None => {
                let mut reader = reader;
                reader.read_to_end(&mut buf).await?;
            }
        }
        Ok::<Vec<u8>, std::io::Error>(buf)
    });

    let err_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });

    let wait_future = async move {
        let mut guard = guard;
        let stdout = out_task.await??;
        if let Some(limit) = max_stdout
            && stdout.len() > limit
        {
            return Err(ProcessError::OutputTooLarge(limit));
        }
        let status = guard.child_mut()?.wait().await?;
        let stderr = err_task.await??;
        guard.disarm();
        Ok(Collected {
            status,
            stdout,
            stderr,
        })
    };

    match limits.deadline {
        Some(limit) => timeout(limit, wait_future)
            .await
            .map_err(|_| ProcessError::TimedOut(limit))?,
        None => wait_future.await,
    }
}
