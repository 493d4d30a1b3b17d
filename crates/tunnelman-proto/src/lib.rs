//! Shared data model for tunnelman
//!
//! Wire types for tunnels, ingress rules and DNS records, plus the pure
//! ingress editor used by every hostname mutation.

pub mod dns;
pub mod editor;
pub mod ingress;
pub mod tunnel;

pub use dns::{DnsRecord, DnsRecordType, Zone};
pub use editor::IngressError;
pub use ingress::{
    normalize_path, IngressRule, PublicHostname, TunnelConfig, TunnelConfiguration, WarpRouting,
    CATCH_ALL_SERVICE, WILDCARD_PATH,
};
pub use tunnel::{Connection, Tunnel, TunnelStatus};
