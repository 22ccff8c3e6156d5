//! Subprocess executor for external tools.
//!
//! This module provides the [`ProcessSupervisor`], which launches one
//! [`ProcessInvocation`] at a time, streams its output to the invocation's
//! sink while it runs, and force-kills it when asked to.

use crate::supervisor::error::SupervisorError;
use crate::supervisor::invocation::ProcessInvocation;
use crate::supervisor::sink::OutputSink;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const PUMP_BUFFER_SIZE: usize = 8 * 1024;

/// How a supervised subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited on its own with this (non-negative) code.
    Exited(i32),

    /// The process was killed because a kill was requested.
    Killed,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited(0))
    }
}

/// Runs subprocesses and kills them on request.
///
/// The kill switch is a [`CancellationToken`]: cancelling it from any thread
/// while [`execute`](Self::execute) is waiting kills the child immediately
/// with no grace period. Once the token is cancelled, no further process is
/// spawned.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    kill: CancellationToken,
}

impl ProcessSupervisor {
    /// Create a supervisor controlled by `kill`.
    pub fn new(kill: CancellationToken) -> Self {
        Self { kill }
    }

    /// Request the running process, if any, to be killed.
    ///
    /// Calling this more than once has no further effect.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }

    /// Launch `invocation` and wait for it to finish.
    ///
    /// Output is written to the invocation's sink as it is read from the
    /// pipes; every byte has reached the sink when this returns an exit code.
    ///
    /// # Errors
    ///
    /// - `ToolNotFound` if the program or a required file is missing; nothing
    ///   is spawned in that case.
    /// - `Spawn` if the operating system refuses to start the process.
    /// - `Io` if the stdout redirect file cannot be created or waiting fails.
    pub async fn execute(
        &self,
        invocation: &ProcessInvocation,
    ) -> Result<ProcessExit, SupervisorError> {
        let program = resolve_program(invocation.program())?;
        for file in invocation.required_files() {
            if !file.is_file() {
                return Err(SupervisorError::ToolNotFound { tool: file.clone() });
            }
        }

        if self.kill.is_cancelled() {
            return Ok(ProcessExit::Killed);
        }

        let sink = invocation.sink().cloned();

        let mut cmd = Command::new(&program);
        cmd.args(invocation.arguments());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            cmd.current_dir(dir);
        }

        match (invocation.stdout_file(), &sink) {
            (Some(path), _) => {
                let file = std::fs::File::create(path)?;
                cmd.stdout(Stdio::from(file));
            }
            (None, Some(_)) => {
                cmd.stdout(Stdio::piped());
            }
            (None, None) => {
                cmd.stdout(Stdio::null());
            }
        }
        cmd.stderr(if sink.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SupervisorError::ToolNotFound {
                    tool: program.clone(),
                }
            } else {
                SupervisorError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        tracing::debug!(
            pid = child.id(),
            command = %invocation.command_line(),
            "spawned tool"
        );

        let mut pumps: Vec<JoinHandle<()>> = Vec::new();
        if let Some(sink) = &sink {
            if let Some(stdout) = child.stdout.take() {
                pumps.push(tokio::spawn(pump(stdout, Arc::clone(sink))));
            }
            if let Some(stderr) = child.stderr.take() {
                pumps.push(tokio::spawn(pump(stderr, Arc::clone(sink))));
            }
        }

        let status = tokio::select! {
            _ = self.kill.cancelled() => {
                tracing::warn!(program = %program.display(), "killing tool on request");
                let _ = child.kill().await;
                // grandchildren may keep the pipes open; stop reading them
                for pump in &pumps {
                    pump.abort();
                }
                return Ok(ProcessExit::Killed);
            }
            status = child.wait() => status?,
        };

        for pump in pumps {
            if let Err(e) = pump.await {
                tracing::warn!(error = %e, "output relay task failed");
            }
        }

        let code = exit_code(status);
        tracing::debug!(program = %program.display(), code, "tool exited");
        Ok(ProcessExit::Exited(code))
    }
}

/// Resolve a program to an existing file.
///
/// Bare names are looked up on `PATH`; anything with a directory component
/// must exist as given.
fn resolve_program(program: &Path) -> Result<PathBuf, SupervisorError> {
    let not_found = || SupervisorError::ToolNotFound {
        tool: program.to_path_buf(),
    };

    if program.components().count() > 1 {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    which::which(program).map_err(|_| not_found())
}

/// Copy everything from `reader` into `sink` until end of stream.
///
/// A failing sink is reported once; the pipe keeps being drained so the
/// tool never blocks on a full pipe.
async fn pump<R>(mut reader: R, sink: Arc<dyn OutputSink>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    let mut sink_ok = true;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read tool output");
                break;
            }
        };
        if sink_ok {
            if let Err(e) = sink.append(&buf[..n]).await {
                tracing::warn!(error = %e, "output sink failed, discarding further output");
                sink_ok = false;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().map(i32::abs).unwrap_or(1)
}
