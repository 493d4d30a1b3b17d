//! Ad-hoc basic auth in front of a public hostname
//!
//! The proxy doing the actual authentication is an external sidecar; this
//! module only generates the password, starts and stops the sidecar, and
//! points the hostname's rule at it.

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};
use tunnelman_proto::PublicHostname;

use crate::error::{ManagerError, ProcessError};
use crate::manager::TunnelManager;

pub const PASSWORD_DIGITS: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SidecarError(pub String);

impl From<SidecarError> for ManagerError {
    fn from(err: SidecarError) -> Self {
        ManagerError::Process(ProcessError::Sidecar(err.0))
    }
}

/// Local basic-auth proxy, one instance per hostname
#[async_trait]
pub trait AuthSidecar: Send + Sync {
    /// Start a proxy forwarding to `target`; returns the local port it listens on
    async fn start(&self, hostname: &str, target: &str, password: &str)
        -> Result<u16, SidecarError>;

    async fn stop(&self, hostname: &str) -> Result<(), SidecarError>;
}

/// Random numeric password
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Service URL routing a hostname through the sidecar on `port`
pub fn sidecar_service(port: u16) -> String {
    format!("http://localhost:{}", port)
}

#[derive(Debug, Clone)]
pub(crate) struct AuthState {
    /// Service the rule pointed at before auth was enabled
    pub(crate) original_service: String,
    pub(crate) port: u16,
}

#[derive(Debug, Clone)]
pub struct AuthToggle {
    pub hostname: PublicHostname,
    pub enabled: bool,
    /// Set only when auth was just enabled
    pub password: Option<String>,
}

impl TunnelManager {
    fn sidecar(&self) -> Result<&dyn AuthSidecar, ManagerError> {
        self.sidecar
            .as_deref()
            .ok_or_else(|| ManagerError::Validation("no auth sidecar is configured".to_string()))
    }

    pub async fn auth_enabled(&self, hostname: &str) -> bool {
        self.auth.lock().await.contains_key(hostname)
    }

    /// Enable basic auth for `hostname`, or disable it when already enabled
    pub async fn toggle_auth(
        &self,
        tunnel_id: &str,
        hostname: &str,
    ) -> Result<AuthToggle, ManagerError> {
        let sidecar = self.sidecar()?;
        let config = self.fetch_config(tunnel_id).await?;
        let rule = config
            .ingress
            .iter()
            .find(|rule| !rule.is_catch_all() && rule.hostname == hostname)
            .ok_or_else(|| ManagerError::NotFound(format!("Hostname {} not found", hostname)))?;
        let path = rule.path.clone();
        let current_service = rule.service.clone();

        let mut auth = self.auth.lock().await;

        if let Some(state) = auth.remove(hostname) {
            let restored: Result<PublicHostname, ManagerError> = async {
                sidecar.stop(hostname).await?;
                self.edit_rule(tunnel_id, hostname, hostname, &path, &state.original_service)
                    .await
                    .map(|(rule, _)| rule)
            }
            .await;

            return match restored {
                Ok(rule) => {
                    info!(hostname, service = %state.original_service, "Disabled basic auth");
                    Ok(AuthToggle {
                        hostname: rule,
                        enabled: false,
                        password: None,
                    })
                }
                Err(e) => {
                    // Keep the state so a retry restores the same service
                    auth.insert(hostname.to_string(), state);
                    Err(e)
                }
            };
        }

        let password = generate_password();
        let port = sidecar.start(hostname, &current_service, &password).await?;

        match self
            .edit_rule(tunnel_id, hostname, hostname, &path, &sidecar_service(port))
            .await
        {
            Ok((rule, _)) => {
                info!(hostname, port, "Enabled basic auth");
                auth.insert(
                    hostname.to_string(),
                    AuthState {
                        original_service: current_service,
                        port,
                    },
                );
                Ok(AuthToggle {
                    hostname: rule,
                    enabled: true,
                    password: Some(password),
                })
            }
            Err(e) => {
                if let Err(stop_err) = sidecar.stop(hostname).await {
                    warn!(hostname, error = %stop_err, "Failed to stop auth sidecar after failed repoint");
                }
                Err(e)
            }
        }
    }

    /// Backend behind the sidecar of `hostname` when `service` points at that sidecar
    pub(crate) async fn auth_backend(&self, hostname: &str, service: &str) -> Option<String> {
        self.auth
            .lock()
            .await
            .get(hostname)
            .filter(|state| sidecar_service(state.port) == service)
            .map(|state| state.original_service.clone())
    }

    /// Stop the sidecar of a hostname whose rule is gone
    pub(crate) async fn release_auth(&self, hostname: &str) {
        let Some(state) = self.auth.lock().await.remove(hostname) else {
            return;
        };
        if let Ok(sidecar) = self.sidecar() {
            if let Err(e) = sidecar.stop(hostname).await {
                warn!(hostname, port = state.port, error = %e, "Failed to stop auth sidecar");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_six_digits() {
        for _ in 0..50 {
            let password = generate_password();
            assert_eq!(password.len(), PASSWORD_DIGITS);
            assert!(password.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_sidecar_service() {
        assert_eq!(sidecar_service(49152), "http://localhost:49152");
    }
}
