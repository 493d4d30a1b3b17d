//! Cloudflare integration for tunnelman
//!
//! - [`CloudflareApi`]: authenticated access to the provider's v4 API
//! - [`RemoteConfigClient`]: fetch/push of a tunnel's ingress document
//! - [`DnsSynchronizer`]: CNAME records that follow public hostnames
//! - [`TunnelRunner`]: the `cloudflared` command line
//! - [`StatusResolver`]: coarse health derived from live connections

pub mod client;
pub mod configuration;
pub mod dns;
pub mod error;
pub mod runner;
pub mod status;

#[cfg(feature = "test-support")]
pub mod testing;

pub use client::{ApiConfig, CloudflareApi, DEFAULT_API_BASE};
pub use configuration::RemoteConfigClient;
pub use dns::{tunnel_target, DnsSynchronizer, TUNNEL_TARGET_SUFFIX};
pub use error::{ApiError, RunnerError};
pub use runner::{TunnelCatalog, TunnelRunner, DEFAULT_RUNNER_PROGRAM};
pub use status::{status_from_connections, ResolvedStatus, StatusResolver};
