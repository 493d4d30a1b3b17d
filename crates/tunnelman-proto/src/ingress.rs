//! Ingress rules and the remote tunnel configuration document
//!
//! Fields unknown to tunnelman are kept in an explicit `extra` side map so a
//! fetch-edit-push cycle never drops them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Caller-facing spelling of the wildcard path
pub const WILDCARD_PATH: &str = "*";

/// Service of the catch-all rule seeded into an empty configuration
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

/// Map an empty path to the wildcard; other paths are returned unchanged
pub fn normalize_path(path: &str) -> &str {
    if path.is_empty() {
        WILDCARD_PATH
    } else {
        path
    }
}

/// Canonical stored form of a path: the wildcard is stored as empty
pub(crate) fn stored_path(path: &str) -> String {
    if path == WILDCARD_PATH {
        String::new()
    } else {
        path.to_string()
    }
}

/// One entry of a tunnel's routing table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngressRule {
    /// Opaque id, numeric by convention
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Empty for the catch-all rule
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// Empty means wildcard
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(default)]
    pub service: String,

    #[serde(
        rename = "originRequest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub origin_request: Option<Map<String, Value>>,

    /// Unknown fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl IngressRule {
    /// Build a rule for `hostname`; the wildcard path is stored as empty
    pub fn new(hostname: impl Into<String>, path: &str, service: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            path: stored_path(path),
            service: service.into(),
            ..Default::default()
        }
    }

    /// The catch-all rule routing everything else to `service`
    pub fn catch_all(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.hostname.is_empty()
    }

    /// Path with the empty form mapped to `*`
    pub fn normalized_path(&self) -> &str {
        normalize_path(&self.path)
    }

    /// True when this rule routes `(hostname, path)`, comparing normalized paths
    pub fn matches(&self, hostname: &str, path: &str) -> bool {
        self.hostname == hostname && self.normalized_path() == normalize_path(path)
    }

    /// Numeric value of the id, if it has one
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarpRouting {
    #[serde(default)]
    pub enabled: bool,
}

/// Ordered ingress rules plus the routing-mode flag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    #[serde(default)]
    pub ingress: Vec<IngressRule>,

    #[serde(rename = "warp-routing", default)]
    pub warp_routing: WarpRouting,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TunnelConfig {
    /// A configuration holding only the catch-all rule
    pub fn with_catch_all(service: impl Into<String>) -> Self {
        Self {
            ingress: vec![IngressRule::catch_all(service)],
            ..Default::default()
        }
    }

    /// Index of the first rule without hostname
    pub fn catch_all_index(&self) -> Option<usize> {
        self.ingress.iter().position(IngressRule::is_catch_all)
    }

    /// Non-catch-all rules as public hostnames
    pub fn public_hostnames(&self) -> Vec<PublicHostname> {
        self.ingress
            .iter()
            .filter(|rule| !rule.is_catch_all())
            .map(PublicHostname::from)
            .collect()
    }
}

/// Configuration resource as returned by the remote API
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TunnelConfiguration {
    #[serde(default)]
    pub tunnel_id: String,
    #[serde(default)]
    pub version: i64,
    /// Null for tunnels that were never configured remotely
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: TunnelConfig,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A routed hostname as presented to the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicHostname {
    pub id: String,
    pub hostname: String,
    pub path: String,
    pub service: String,
}

impl From<&IngressRule> for PublicHostname {
    fn from(rule: &IngressRule) -> Self {
        Self {
            id: rule.id.clone(),
            hostname: rule.hostname.clone(),
            path: rule.path.clone(),
            service: rule.service.clone(),
        }
    }
}
