use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("Tunnel {name} is already running with PID {pid}")]
    Conflict { name: String, pid: u32 },

    #[error("Tunnel {0} is not being managed")]
    NotFound(String),

    #[error("No managed tunnel with PID {0}")]
    PidNotFound(u32),

    #[error("Tunnel {name} is still running with PID {pid}; stop it first")]
    StillRunning { name: String, pid: u32 },

    #[error("Start of tunnel {0} was cancelled")]
    Cancelled(String),

    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Failed to signal PID {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("Failed to kill PID {pid}: {reason}")]
    Kill { pid: u32, reason: String },

    #[error("Failed to list runner processes: {0}")]
    ProcessList(String),

    #[error("Invalid runner config: {0}")]
    InvalidConfig(String),

    #[error("Runner config error at {path}: {reason}")]
    ConfigFile { path: String, reason: String },

    #[error("Errors stopping tunnels: {}", .0.join("; "))]
    StopAll(Vec<String>),
}
