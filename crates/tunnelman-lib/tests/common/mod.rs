#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tunnelman_cloudflare::testing::FakeCloudflare;
use tunnelman_lib::{
    CloudflareApi, ProcessSupervisor, RunnerError, SupervisorConfig, Tunnel, TunnelCatalog,
    TunnelManager,
};

pub const TUNNEL_ID: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";

/// Catalog answering from memory instead of the runner CLI
#[derive(Default)]
pub struct MemoryCatalog {
    pub tunnels: Mutex<Vec<Tunnel>>,
}

#[async_trait]
impl TunnelCatalog for MemoryCatalog {
    async fn list_tunnels(&self) -> Result<Vec<Tunnel>, RunnerError> {
        Ok(self.tunnels.lock().unwrap().clone())
    }

    async fn create_tunnel(&self, name: &str) -> Result<Tunnel, RunnerError> {
        let tunnel = Tunnel {
            id: format!("id-{}", name),
            name: name.to_string(),
            created_at: None,
            connections: Vec::new(),
        };
        self.tunnels.lock().unwrap().push(tunnel.clone());
        Ok(tunnel)
    }

    async fn tunnel_info(&self, name_or_id: &str) -> Result<Tunnel, RunnerError> {
        self.tunnels
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == name_or_id || t.name == name_or_id)
            .cloned()
            .ok_or_else(|| RunnerError::TunnelNotFound(name_or_id.to_string()))
    }

    async fn delete_tunnel(&self, name_or_id: &str) -> Result<(), RunnerError> {
        let mut tunnels = self.tunnels.lock().unwrap();
        let before = tunnels.len();
        tunnels.retain(|t| t.id != name_or_id && t.name != name_or_id);
        if tunnels.len() == before {
            return Err(RunnerError::TunnelNotFound(name_or_id.to_string()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub fake: FakeCloudflare,
    pub manager: TunnelManager,
    pub catalog: Arc<MemoryCatalog>,
    pub dir: TempDir,
}

/// Manager against a fake provider with `example.com` selected
pub async fn harness() -> Harness {
    harness_with(|manager| manager).await
}

/// Like [`harness`], with a hook to customize the manager before the domain is selected
pub async fn harness_with(configure: impl FnOnce(TunnelManager) -> TunnelManager) -> Harness {
    let fake = FakeCloudflare::start().await;
    fake.state().add_zone("zone-1", "example.com");

    let api = CloudflareApi::new(fake.api_config()).unwrap();
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(MemoryCatalog::default());
    let supervisor = ProcessSupervisor::new(SupervisorConfig::new(dir.path()));
    let manager = configure(TunnelManager::new(api, catalog.clone(), supervisor));
    manager.select_domain("example.com").await.unwrap();

    Harness {
        fake,
        manager,
        catalog,
        dir,
    }
}
