//! The `cloudflared` command line
//!
//! Tunnel lifecycle (list, create, info, delete) goes through the runner CLI
//! with JSON output. Failures carry the command's combined stdout/stderr.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use tunnelman_proto::Tunnel;

use crate::error::RunnerError;

pub const DEFAULT_RUNNER_PROGRAM: &str = "cloudflared";

/// Source of remote tunnel records
#[async_trait]
pub trait TunnelCatalog: Send + Sync {
    async fn list_tunnels(&self) -> Result<Vec<Tunnel>, RunnerError>;

    async fn create_tunnel(&self, name: &str) -> Result<Tunnel, RunnerError>;

    /// Tunnel record including its current connections
    async fn tunnel_info(&self, name_or_id: &str) -> Result<Tunnel, RunnerError>;

    async fn delete_tunnel(&self, name_or_id: &str) -> Result<(), RunnerError>;
}

#[derive(Debug, Clone)]
pub struct TunnelRunner {
    program: PathBuf,
}

impl TunnelRunner {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_RUNNER_PROGRAM),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn exec<I, S>(&self, args: I) -> Result<Vec<u8>, RunnerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command = format!(
            "{} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        debug!(%command, "Running tunnel runner command");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| RunnerError::Spawn {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(RunnerError::Failed {
                command,
                output: combined.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    async fn exec_json<T: DeserializeOwned>(
        &self,
        what: &'static str,
        args: &[&str],
    ) -> Result<T, RunnerError> {
        let stdout = self.exec(args).await?;
        serde_json::from_slice(&stdout).map_err(|e| RunnerError::Parse {
            what,
            reason: e.to_string(),
        })
    }

    /// Resolve a tunnel name to its id
    pub async fn tunnel_id_for_name(&self, name: &str) -> Result<String, RunnerError> {
        self.list_tunnels()
            .await?
            .into_iter()
            .find(|t| t.name == name)
            .map(|t| t.id)
            .ok_or_else(|| RunnerError::TunnelNotFound(name.to_string()))
    }

    /// Let the runner create the DNS route itself (zone picked by the runner)
    pub async fn route_dns(&self, tunnel: &str, hostname: &str) -> Result<(), RunnerError> {
        self.exec(["tunnel", "route", "dns", tunnel, hostname])
            .await
            .map(drop)
    }

    /// Validate the ingress rules of a local runner config
    pub async fn validate_ingress(&self, config_path: Option<&Path>) -> Result<(), RunnerError> {
        let mut args = vec![
            OsStr::new("tunnel").to_owned(),
            OsStr::new("ingress").to_owned(),
            OsStr::new("validate").to_owned(),
        ];
        if let Some(path) = config_path {
            args.push(OsStr::new("--config").to_owned());
            args.push(path.as_os_str().to_owned());
        }
        self.exec(args).await.map(drop)
    }

    pub async fn version(&self) -> Result<String, RunnerError> {
        let stdout = self.exec(["--version"]).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// True when the runner binary can be executed
    pub async fn is_installed(&self) -> bool {
        self.version().await.is_ok()
    }
}

impl Default for TunnelRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunnelCatalog for TunnelRunner {
    async fn list_tunnels(&self) -> Result<Vec<Tunnel>, RunnerError> {
        self.exec_json("tunnel list", &["tunnel", "--output", "json", "list"])
            .await
    }

    async fn create_tunnel(&self, name: &str) -> Result<Tunnel, RunnerError> {
        self.exec_json("created tunnel", &["tunnel", "--output", "json", "create", name])
            .await
    }

    async fn tunnel_info(&self, name_or_id: &str) -> Result<Tunnel, RunnerError> {
        self.exec_json("tunnel info", &["tunnel", "--output", "json", "info", name_or_id])
            .await
    }

    async fn delete_tunnel(&self, name_or_id: &str) -> Result<(), RunnerError> {
        self.exec(["tunnel", "delete", name_or_id]).await.map(drop)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = TunnelRunner::with_program("/nonexistent/cloudflared");
        let err = runner.list_tunnels().await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert!(!runner.is_installed().await);
    }

    #[tokio::test]
    async fn test_failure_carries_combined_output() {
        // `false` ignores its arguments and exits 1
        let runner = TunnelRunner::with_program("false");
        let err = runner.delete_tunnel("blog").await.unwrap_err();
        match err {
            RunnerError::Failed { command, .. } => {
                assert_eq!(command, "false tunnel delete blog");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_output() {
        let runner = TunnelRunner::with_program("echo");
        let err = runner.list_tunnels().await.unwrap_err();
        assert!(matches!(err, RunnerError::Parse { what: "tunnel list", .. }));
    }
}
