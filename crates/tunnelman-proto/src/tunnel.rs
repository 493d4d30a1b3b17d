//! Tunnel and connection snapshots as reported by the tunnel runner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse tunnel health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    Active,
    Inactive,
    Error,
    Unknown,
}

impl TunnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelStatus::Active => "active",
            TunnelStatus::Inactive => "inactive",
            TunnelStatus::Error => "error",
            TunnelStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remotely declared tunnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunnel {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    /// Active connections, empty when the tunnel is not running anywhere
    #[serde(default, rename = "conns", alias = "connections")]
    pub connections: Vec<Connection>,
}

impl Tunnel {
    /// True when at least one connection is established and not waiting to reconnect
    pub fn has_live_connection(&self) -> bool {
        self.connections.iter().any(|c| !c.is_pending_reconnect)
    }
}

/// One edge connection of a tunnel (read-only snapshot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub origin_ip: String,
    /// Edge location the connection terminates at
    #[serde(default, rename = "colo_name")]
    pub location: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub is_pending_reconnect: bool,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}
