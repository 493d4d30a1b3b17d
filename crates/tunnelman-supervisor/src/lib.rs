//! Supervision of locally spawned tunnel runner processes
//!
//! [`ProcessSupervisor`] keeps a registry keyed by tunnel name, stops runners
//! with a graceful signal followed by a forced kill, records how each one
//! exited, and signals stray runners it did not spawn.

pub mod error;
pub mod process;
pub mod runner_config;
pub mod supervisor;

pub use error::SupervisorError;
pub use process::{
    ExitResult, ManagedChild, OsLauncher, ProcessLauncher, StopSignal, DEFAULT_RUNNER_PATTERN,
};
pub use runner_config::{RunnerConfig, RunnerConfigStore, DEFAULT_LOG_LEVEL};
pub use supervisor::{
    ManagedProcess, ProcessSupervisor, SupervisorConfig, TunnelLaunch, DEFAULT_GRACE_PERIOD,
};
pub use tokio_util::sync::CancellationToken;
