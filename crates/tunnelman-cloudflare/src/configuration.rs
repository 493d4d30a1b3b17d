//! Remote tunnel configuration (the ordered ingress document)
//!
//! `push` replaces the whole rule list; the provider offers no partial
//! update and no version precondition. Callers must `fetch` immediately
//! before editing, and even then the last writer wins when another editor
//! touches the same tunnel concurrently.

use reqwest::Method;
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::{debug, info};
use tunnelman_proto::{TunnelConfig, TunnelConfiguration};

use crate::client::CloudflareApi;
use crate::error::ApiError;

#[derive(Clone)]
pub struct RemoteConfigClient {
    api: CloudflareApi,
}

impl RemoteConfigClient {
    pub fn new(api: CloudflareApi) -> Self {
        Self { api }
    }

    async fn resource_path(&self, tunnel_id: &str) -> Result<String, ApiError> {
        let account_id = self.api.account_id().await?;
        Ok(format!(
            "accounts/{}/cfd_tunnel/{}/configurations",
            account_id, tunnel_id
        ))
    }

    /// Current configuration of `tunnel_id`
    pub async fn fetch(&self, tunnel_id: &str) -> Result<TunnelConfiguration, ApiError> {
        let path = self.resource_path(tunnel_id).await?;
        let configuration: TunnelConfiguration = self.api.get(&path, &[]).await?;
        debug!(
            tunnel_id,
            version = configuration.version,
            rules = configuration.config.ingress.len(),
            "Fetched tunnel configuration"
        );
        Ok(configuration)
    }

    /// Replace the remote configuration of `tunnel_id` with `config`
    pub async fn push(&self, tunnel_id: &str, config: &TunnelConfig) -> Result<(), ApiError> {
        let path = self.resource_path(tunnel_id).await?;
        let body = json!({ "config": config });
        let _: IgnoredAny = self.api.call(Method::PUT, &path, &[], Some(&body)).await?;
        info!(
            tunnel_id,
            rules = config.ingress.len(),
            "Pushed tunnel configuration"
        );
        Ok(())
    }
}
