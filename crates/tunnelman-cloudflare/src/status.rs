//! Coarse tunnel health from the runner's connection list

use std::sync::Arc;
use tracing::warn;
use tunnelman_proto::{Connection, TunnelStatus};

use crate::error::RunnerError;
use crate::runner::TunnelCatalog;

/// Outcome of a status lookup; `Unknown` always carries the lookup error
#[derive(Debug, Clone)]
pub struct ResolvedStatus {
    pub status: TunnelStatus,
    pub error: Option<RunnerError>,
}

impl ResolvedStatus {
    fn known(status: TunnelStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    fn unknown(error: RunnerError) -> Self {
        Self {
            status: TunnelStatus::Unknown,
            error: Some(error),
        }
    }
}

/// Active when any connection is not waiting to reconnect, Inactive otherwise
pub fn status_from_connections(connections: &[Connection]) -> TunnelStatus {
    if connections.iter().any(|c| !c.is_pending_reconnect) {
        TunnelStatus::Active
    } else {
        TunnelStatus::Inactive
    }
}

#[derive(Clone)]
pub struct StatusResolver {
    catalog: Arc<dyn TunnelCatalog>,
}

impl StatusResolver {
    pub fn new(catalog: Arc<dyn TunnelCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn resolve(&self, tunnel_id: &str) -> ResolvedStatus {
        match self.catalog.tunnel_info(tunnel_id).await {
            Ok(tunnel) => ResolvedStatus::known(status_from_connections(&tunnel.connections)),
            Err(e) => {
                warn!(tunnel_id, error = %e, "Failed to resolve tunnel status");
                ResolvedStatus::unknown(e)
            }
        }
    }
}
