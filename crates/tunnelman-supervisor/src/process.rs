//! OS process capabilities used by the supervisor
//!
//! [`ProcessLauncher`] spawns runner processes and finds stray ones;
//! [`ManagedChild`] is the handle the supervisor keeps per spawned process.
//! Both are traits so the supervisor can be driven by fakes in tests.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::error::SupervisorError;

/// Command-line pattern of a running tunnel runner
pub const DEFAULT_RUNNER_PATTERN: &str = "cloudflared.*tunnel.*run";

/// Signal asking a process to shut down on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopSignal {
    #[default]
    Terminate,
    Interrupt,
}

#[cfg(unix)]
impl StopSignal {
    fn as_raw(self) -> libc::c_int {
        match self {
            StopSignal::Terminate => libc::SIGTERM,
            StopSignal::Interrupt => libc::SIGINT,
        }
    }
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitResult {
    Success,
    /// Non-zero exit; `code` is `None` when a signal ended the process
    Failed { code: Option<i32> },
    /// The exit status could not be collected
    Unknown(String),
}

impl ExitResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitResult::Success)
    }
}

impl From<std::io::Result<std::process::ExitStatus>> for ExitResult {
    fn from(status: std::io::Result<std::process::ExitStatus>) -> Self {
        match status {
            Ok(status) if status.success() => ExitResult::Success,
            Ok(status) => ExitResult::Failed {
                code: status.code(),
            },
            Err(e) => ExitResult::Unknown(e.to_string()),
        }
    }
}

/// Handle to one spawned process
#[async_trait]
pub trait ManagedChild: Send + Sync {
    fn pid(&self) -> u32;

    /// Ask the process to exit; a no-op once it has exited
    fn signal(&self, signal: StopSignal) -> Result<(), SupervisorError>;

    /// Resolve when the process exits; may be awaited by several callers
    async fn wait(&self) -> ExitResult;

    async fn force_kill(&self) -> Result<(), SupervisorError>;
}

/// Spawns runner processes and inspects the process table
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<Arc<dyn ManagedChild>, SupervisorError>;

    /// PIDs of every runner process on the host, managed or not
    async fn list_runner_pids(&self) -> Result<Vec<u32>, SupervisorError>;

    fn signal_pid(&self, pid: u32, signal: StopSignal) -> Result<(), SupervisorError>;
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: StopSignal) -> Result<(), SupervisorError> {
    let pid_raw = libc::pid_t::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        reason: "PID out of range".to_string(),
    })?;
    // SAFETY: kill(2) has no memory-safety preconditions
    if unsafe { libc::kill(pid_raw, signal.as_raw()) } == 0 {
        Ok(())
    } else {
        Err(SupervisorError::Signal {
            pid,
            reason: std::io::Error::last_os_error().to_string(),
        })
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, _signal: StopSignal) -> Result<(), SupervisorError> {
    Err(SupervisorError::Signal {
        pid,
        reason: "graceful signals are not supported on this platform".to_string(),
    })
}

type KillReply = oneshot::Sender<std::io::Result<()>>;

/// A child spawned with tokio; a background task owns the [`Child`] and reaps it
pub struct OsChild {
    pid: u32,
    exit: watch::Receiver<Option<ExitResult>>,
    kill_tx: mpsc::Sender<KillReply>,
}

impl OsChild {
    fn spawn_reaper(pid: u32, mut child: Child) -> Self {
        let (exit_tx, exit) = watch::channel(None);
        let (kill_tx, mut kill_rx) = mpsc::channel::<KillReply>(1);

        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(reply) = kill_rx.recv() => {
                        let _ = reply.send(child.start_kill());
                    }
                }
            };
            let result = ExitResult::from(status);
            debug!(pid, ?result, "Runner process exited");
            let _ = exit_tx.send(Some(result));
        });

        Self { pid, exit, kill_tx }
    }

    fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

#[async_trait]
impl ManagedChild for OsChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn signal(&self, signal: StopSignal) -> Result<(), SupervisorError> {
        // A reaped PID may already belong to another process
        if self.has_exited() {
            return Ok(());
        }
        send_signal(self.pid, signal)
    }

    async fn wait(&self) -> ExitResult {
        let mut exit = self.exit.clone();
        // Bound to a local so the watch borrow ends before `exit` is dropped
        let result = match exit.wait_for(Option::is_some).await {
            Ok(result) => result
                .clone()
                .unwrap_or_else(|| ExitResult::Unknown("no exit status".to_string())),
            Err(_) => ExitResult::Unknown("process reaper stopped".to_string()),
        };
        result
    }

    async fn force_kill(&self) -> Result<(), SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.kill_tx.send(reply_tx).await.is_err() {
            // Reaper finished: the process is gone
            return Ok(());
        }
        match reply_rx.await {
            Ok(Ok(())) | Err(_) => Ok(()),
            Ok(Err(e)) => Err(SupervisorError::Kill {
                pid: self.pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// Launcher backed by real OS processes
#[derive(Debug, Clone)]
pub struct OsLauncher {
    pattern: String,
}

impl OsLauncher {
    pub fn new() -> Self {
        Self {
            pattern: DEFAULT_RUNNER_PATTERN.to_string(),
        }
    }

    /// Match orphans with a different `pgrep -f` pattern
    pub fn with_pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl Default for OsLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for OsLauncher {
    fn launch(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<Arc<dyn ManagedChild>, SupervisorError> {
        let spawn_error = |reason: String| SupervisorError::Spawn {
            program: program.display().to_string(),
            reason,
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_error("process exited before its PID was read".to_string()))?;

        Ok(Arc::new(OsChild::spawn_reaper(pid, child)))
    }

    async fn list_runner_pids(&self) -> Result<Vec<u32>, SupervisorError> {
        let output = Command::new("pgrep")
            .args(["-f", &self.pattern])
            .output()
            .await
            .map_err(|e| SupervisorError::ProcessList(e.to_string()))?;

        // pgrep exits 1 when nothing matched
        if !output.status.success() {
            if output.status.code() == Some(1) {
                return Ok(Vec::new());
            }
            return Err(SupervisorError::ProcessList(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect())
    }

    fn signal_pid(&self, pid: u32, signal: StopSignal) -> Result<(), SupervisorError> {
        send_signal(pid, signal)
    }
}
