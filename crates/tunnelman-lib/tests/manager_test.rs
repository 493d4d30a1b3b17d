mod common;

use common::{harness, TUNNEL_ID};
use tunnelman_lib::{CancellationToken, ManagerError, RunnerConfig, TunnelStatus};
use tunnelman_proto::Connection;

fn connection(pending: bool) -> Connection {
    Connection {
        id: "conn-1".to_string(),
        origin_ip: "203.0.113.7".to_string(),
        location: "ams01".to_string(),
        protocol: Some("quic".to_string()),
        is_pending_reconnect: pending,
        opened_at: None,
    }
}

#[tokio::test]
async fn test_tunnel_lifecycle_through_catalog() {
    let h = harness().await;

    let tunnel = h.manager.create_tunnel(" staging ").await.unwrap();
    assert_eq!(tunnel.name, "staging");
    assert_eq!(tunnel.id, "id-staging");

    let tunnels = h.manager.list_tunnels().await.unwrap();
    assert_eq!(tunnels.len(), 1);

    h.manager.delete_tunnel("staging").await.unwrap();
    assert!(h.manager.list_tunnels().await.unwrap().is_empty());

    let err = h.manager.delete_tunnel("staging").await.unwrap_err();
    assert!(matches!(err, ManagerError::NotFound(_)));

    let err = h.manager.create_tunnel("   ").await.unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn test_delete_removes_runner_config() {
    let h = harness().await;
    h.manager.create_tunnel("staging").await.unwrap();
    let store = h.manager.supervisor().config_store();
    store
        .save("staging", &RunnerConfig::catch_all_only(TUNNEL_ID, h.dir.path()))
        .unwrap();

    h.manager.delete_tunnel("staging").await.unwrap();

    assert!(!store.path_for("staging").exists());
}

#[tokio::test]
async fn test_status_from_connections() {
    let h = harness().await;
    let tunnel = h.manager.create_tunnel("prod").await.unwrap();

    let resolved = h.manager.tunnel_status(&tunnel.id).await;
    assert_eq!(resolved.status, TunnelStatus::Inactive);
    assert!(resolved.error.is_none());

    h.catalog.tunnels.lock().unwrap()[0].connections = vec![connection(true)];
    assert_eq!(
        h.manager.tunnel_status(&tunnel.id).await.status,
        TunnelStatus::Inactive
    );

    h.catalog.tunnels.lock().unwrap()[0]
        .connections
        .push(connection(false));
    assert_eq!(
        h.manager.tunnel_status(&tunnel.id).await.status,
        TunnelStatus::Active
    );

    let resolved = h.manager.tunnel_status("missing").await;
    assert_eq!(resolved.status, TunnelStatus::Unknown);
    assert!(resolved.error.is_some());
}

#[tokio::test]
async fn test_runner_inputs_validated_before_launch() {
    let h = harness().await;
    let cancel = CancellationToken::new();

    let err = h
        .manager
        .start_quick("quick", "localhost:3000", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));

    let mut config = RunnerConfig::catch_all_only(TUNNEL_ID, h.dir.path());
    config.tunnel_id.clear();
    let err = h
        .manager
        .start_managed("broken", config, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));

    assert!(h.manager.managed_processes().await.is_empty());
    assert_eq!(
        h.manager.supervisor().status("quick").await,
        TunnelStatus::Inactive
    );
}

#[tokio::test]
async fn test_cancelled_start_spawns_nothing() {
    let h = harness().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .manager
        .start_quick("quick", "http://localhost:3000", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Process(_)));
    assert!(h.manager.managed_processes().await.is_empty());
}

#[tokio::test]
async fn test_domains() {
    let h = harness().await;
    h.fake.state().add_zone("zone-2", "example.org");

    let domains = h.manager.available_domains().await.unwrap();
    assert_eq!(domains, vec!["example.com", "example.org"]);

    let zone = h.manager.select_domain("example.org").await.unwrap();
    assert_eq!(zone.id, "zone-2");
    assert_eq!(h.manager.selected_domain().await.as_deref(), Some("example.org"));

    let err = h.manager.select_domain("unknown.net").await.unwrap_err();
    assert!(matches!(err, ManagerError::NotFound(_)));
    assert_eq!(h.manager.selected_domain().await.as_deref(), Some("example.org"));

    h.manager.verify_credentials().await.unwrap();
}

#[cfg(unix)]
mod running {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tunnelman_cloudflare::testing::FakeCloudflare;
    use tunnelman_lib::{CloudflareApi, ProcessSupervisor, SupervisorConfig, TunnelManager};

    #[tokio::test]
    async fn test_delete_refused_while_runner_active() {
        let fake = FakeCloudflare::start().await;
        let dir = TempDir::new().unwrap();
        let runner = dir.path().join("runner");
        std::fs::write(&runner, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&runner, std::fs::Permissions::from_mode(0o755)).unwrap();

        let catalog = Arc::new(common::MemoryCatalog::default());
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::new(dir.path().join("configs")).with_program(&runner),
        );
        let manager =
            TunnelManager::new(CloudflareApi::new(fake.api_config()).unwrap(), catalog, supervisor);
        manager.create_tunnel("edge").await.unwrap();

        let process = manager
            .start_managed(
                "edge",
                RunnerConfig::catch_all_only(TUNNEL_ID, dir.path()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(process.is_active());
        assert!(manager.supervisor().config_store().path_for("edge").exists());

        let err = manager.delete_tunnel("edge").await.unwrap_err();
        assert!(matches!(err, ManagerError::Conflict(_)));

        manager.stop("edge").await.unwrap();
        manager.delete_tunnel("edge").await.unwrap();
        assert!(manager.managed_processes().await.is_empty());

        manager.shutdown().await.unwrap();
    }
}
