//! The typed boundary the UI layer talks to
//!
//! Tunnel lifecycle goes through the runner CLI, managed processes through
//! the [`ProcessSupervisor`], and everything about public hostnames through
//! the fetch-edit-push pipeline in [`crate::hostnames`].

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tunnelman_cloudflare::{
    CloudflareApi, DnsSynchronizer, RemoteConfigClient, ResolvedStatus, StatusResolver,
    TunnelCatalog,
};
use tunnelman_proto::{Tunnel, Zone};
use tunnelman_supervisor::{
    CancellationToken, ManagedProcess, ProcessSupervisor, RunnerConfig, TunnelLaunch,
};

use crate::auth::{AuthSidecar, AuthState};
use crate::error::ManagerError;

/// Service used when a hostname is added without one
pub const DEFAULT_SERVICE: &str = "http://localhost:8080";

pub struct TunnelManager {
    pub(crate) api: CloudflareApi,
    pub(crate) catalog: Arc<dyn TunnelCatalog>,
    pub(crate) remote: RemoteConfigClient,
    pub(crate) dns: DnsSynchronizer,
    pub(crate) status: StatusResolver,
    pub(crate) supervisor: ProcessSupervisor,
    pub(crate) sidecar: Option<Arc<dyn AuthSidecar>>,
    /// Hostnames currently gated by the auth sidecar
    pub(crate) auth: Mutex<HashMap<String, AuthState>>,
    pub(crate) default_service: String,
}

impl TunnelManager {
    pub fn new(
        api: CloudflareApi,
        catalog: Arc<dyn TunnelCatalog>,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            remote: RemoteConfigClient::new(api.clone()),
            dns: DnsSynchronizer::new(api.clone()),
            status: StatusResolver::new(catalog.clone()),
            api,
            catalog,
            supervisor,
            sidecar: None,
            auth: Mutex::new(HashMap::new()),
            default_service: DEFAULT_SERVICE.to_string(),
        }
    }

    pub fn with_dns(mut self, dns: DnsSynchronizer) -> Self {
        self.dns = dns;
        self
    }

    pub fn with_auth_sidecar(mut self, sidecar: Arc<dyn AuthSidecar>) -> Self {
        self.sidecar = Some(sidecar);
        self
    }

    pub fn with_default_service(mut self, service: impl Into<String>) -> Self {
        self.default_service = service.into();
        self
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub async fn verify_credentials(&self) -> Result<(), ManagerError> {
        Ok(self.api.verify_credentials().await?)
    }

    // Tunnels

    pub async fn list_tunnels(&self) -> Result<Vec<Tunnel>, ManagerError> {
        Ok(self.catalog.list_tunnels().await?)
    }

    pub async fn create_tunnel(&self, name: &str) -> Result<Tunnel, ManagerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ManagerError::Validation(
                "tunnel name is required".to_string(),
            ));
        }
        let tunnel = self.catalog.create_tunnel(name).await?;
        info!(name, id = %tunnel.id, "Created tunnel");
        Ok(tunnel)
    }

    /// Delete a tunnel; refused while a managed runner for it is Active
    pub async fn delete_tunnel(&self, name: &str) -> Result<(), ManagerError> {
        if let Some(process) = self.supervisor.get(name).await {
            if process.is_active() {
                return Err(ManagerError::Conflict(format!(
                    "Tunnel {} is running with PID {}; stop it first",
                    name, process.pid
                )));
            }
        }

        self.catalog.delete_tunnel(name).await?;
        info!(name, "Deleted tunnel");

        if let Err(e) = self.supervisor.config_store().delete(name) {
            warn!(name, error = %e, "Failed to delete runner config");
        }
        if self.supervisor.get(name).await.is_some() {
            self.supervisor.remove(name).await?;
        }
        Ok(())
    }

    /// Coarse status from live connections; `Unknown` carries the lookup error
    pub async fn tunnel_status(&self, tunnel_id: &str) -> ResolvedStatus {
        self.status.resolve(tunnel_id).await
    }

    // Managed runners

    pub async fn start_managed(
        &self,
        name: &str,
        config: RunnerConfig,
        cancel: &CancellationToken,
    ) -> Result<ManagedProcess, ManagerError> {
        config.validate()?;
        Ok(self
            .supervisor
            .start_managed(name, TunnelLaunch::Config(config), cancel)
            .await?)
    }

    /// Run `name` as a quick tunnel in front of `url`
    pub async fn start_quick(
        &self,
        name: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ManagedProcess, ManagerError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ManagerError::Validation(format!(
                "service URL must start with http:// or https://, got {:?}",
                url
            )));
        }
        Ok(self
            .supervisor
            .start_managed(name, TunnelLaunch::Url(url.to_string()), cancel)
            .await?)
    }

    pub async fn stop(&self, name: &str) -> Result<(), ManagerError> {
        Ok(self.supervisor.stop(name).await?)
    }

    pub async fn restart(&self, name: &str) -> Result<ManagedProcess, ManagerError> {
        Ok(self.supervisor.restart(name).await?)
    }

    pub async fn managed_processes(&self) -> HashMap<String, ManagedProcess> {
        self.supervisor.snapshot().await
    }

    pub async fn reconcile_orphans(&self) -> usize {
        self.supervisor.reconcile_orphans().await
    }

    /// Stop every managed runner
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        Ok(self.supervisor.stop_all().await?)
    }

    // Domains

    pub async fn available_domains(&self) -> Result<Vec<String>, ManagerError> {
        Ok(self.dns.available_domains().await?)
    }

    /// Select the domain whose zone receives hostname records
    pub async fn select_domain(&self, domain: &str) -> Result<Zone, ManagerError> {
        let zone = self.dns.resolve_zone(domain).await?;
        self.dns.select_domain(domain).await;
        Ok(zone)
    }

    pub async fn selected_domain(&self) -> Option<String> {
        self.dns.selected_domain().await
    }
}
