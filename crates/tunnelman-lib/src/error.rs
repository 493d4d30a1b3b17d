//! Error taxonomy exposed to the UI layer
//!
//! Component errors are folded into five kinds so a caller can decide how to
//! present a failure without matching on every crate's enum. The
//! component error stays available as the source where one exists.

use thiserror::Error;
use tunnelman_cloudflare::{ApiError, RunnerError};
use tunnelman_proto::IngressError;
use tunnelman_supervisor::SupervisorError;

#[derive(Error, Debug, Clone)]
pub enum ManagerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    RemoteApi(RemoteError),

    #[error(transparent)]
    Process(ProcessError),
}

/// Failures talking to the provider, over HTTP or through the runner CLI
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error(transparent)]
    Api(ApiError),

    #[error(transparent)]
    Runner(RunnerError),
}

/// Failures of locally owned processes
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error(transparent)]
    Supervisor(SupervisorError),

    #[error("Auth sidecar error: {0}")]
    Sidecar(String),
}

impl ManagerError {
    /// Provider rejected the credentials
    pub fn is_authentication(&self) -> bool {
        match self {
            ManagerError::RemoteApi(RemoteError::Api(e)) => e.is_authentication(),
            ManagerError::RemoteApi(RemoteError::Runner(e)) => {
                let text = e.to_string().to_lowercase();
                text.contains("unauthorized") || text.contains("authentication")
            }
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ManagerError::RemoteApi(RemoteError::Api(e)) if e.is_rate_limited())
    }
}

impl From<IngressError> for ManagerError {
    fn from(err: IngressError) -> Self {
        match err {
            IngressError::Validation(_) => ManagerError::Validation(err.to_string()),
            IngressError::Conflict { .. } => ManagerError::Conflict(err.to_string()),
            IngressError::HostnameNotFound(_) | IngressError::RuleNotFound { .. } => {
                ManagerError::NotFound(err.to_string())
            }
        }
    }
}

impl From<ApiError> for ManagerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::ZoneNotFound(_) | ApiError::RecordNotFound(_) => {
                ManagerError::NotFound(err.to_string())
            }
            ApiError::RecordExists(_) => ManagerError::Conflict(err.to_string()),
            ApiError::NoDomainSelected | ApiError::MissingToken => {
                ManagerError::Validation(err.to_string())
            }
            other => ManagerError::RemoteApi(RemoteError::Api(other)),
        }
    }
}

impl From<RunnerError> for ManagerError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::TunnelNotFound(_) => ManagerError::NotFound(err.to_string()),
            other => ManagerError::RemoteApi(RemoteError::Runner(other)),
        }
    }
}

impl From<SupervisorError> for ManagerError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Conflict { .. } | SupervisorError::StillRunning { .. } => {
                ManagerError::Conflict(err.to_string())
            }
            SupervisorError::NotFound(_) | SupervisorError::PidNotFound(_) => {
                ManagerError::NotFound(err.to_string())
            }
            SupervisorError::InvalidConfig(_) => ManagerError::Validation(err.to_string()),
            other => ManagerError::Process(ProcessError::Supervisor(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_errors_map_to_kinds() {
        let conflict: ManagerError = IngressError::Conflict {
            hostname: "a.example.com".to_string(),
            path: "*".to_string(),
        }
        .into();
        assert!(matches!(conflict, ManagerError::Conflict(_)));
        assert_eq!(
            conflict.to_string(),
            "Hostname a.example.com with path * already exists"
        );

        let missing: ManagerError = IngressError::HostnameNotFound("x".to_string()).into();
        assert!(matches!(missing, ManagerError::NotFound(_)));

        let running: ManagerError = SupervisorError::Conflict {
            name: "t1".to_string(),
            pid: 42,
        }
        .into();
        assert!(matches!(running, ManagerError::Conflict(_)));

        let kill: ManagerError = SupervisorError::Kill {
            pid: 42,
            reason: "denied".to_string(),
        }
        .into();
        assert!(matches!(kill, ManagerError::Process(_)));

        let zone: ManagerError = ApiError::ZoneNotFound("example.com".to_string()).into();
        assert!(matches!(zone, ManagerError::NotFound(_)));
    }

    #[test]
    fn test_remote_errors_keep_classification() {
        let auth: ManagerError = ApiError::Remote {
            status: 403,
            errors: vec![],
        }
        .into();
        assert!(auth.is_authentication());
        assert!(!auth.is_rate_limited());

        let limited: ManagerError = ApiError::Remote {
            status: 429,
            errors: vec![],
        }
        .into();
        assert!(limited.is_rate_limited());

        let runner: ManagerError = RunnerError::Failed {
            command: "cloudflared tunnel list".to_string(),
            output: "error: Unauthorized: invalid origin cert".to_string(),
        }
        .into();
        assert!(runner.is_authentication());
        assert!(runner.to_string().contains("invalid origin cert"));
    }
}
