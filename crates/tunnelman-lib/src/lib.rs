//! tunnelman library - the API the UI layer is built on
//!
//! [`TunnelManager`] wires the pieces together:
//!
//! - tunnel lifecycle through the runner CLI ([`tunnelman_cloudflare::TunnelRunner`])
//! - public hostname edits as fetch, edit, validate, push, then DNS
//! - locally managed runners through [`tunnelman_supervisor::ProcessSupervisor`]
//! - basic auth through an [`AuthSidecar`]
//!
//! ```ignore
//! use std::sync::Arc;
//! use tunnelman_lib::{TunnelManager, CloudflareApi, ApiConfig, TunnelRunner};
//! use tunnelman_lib::{ProcessSupervisor, SupervisorConfig, RunnerConfigStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = CloudflareApi::new(ApiConfig::new(std::env::var("CLOUDFLARE_API_TOKEN")?))?;
//! let supervisor = ProcessSupervisor::new(SupervisorConfig::new(RunnerConfigStore::default_dir()?));
//! let manager = TunnelManager::new(api, Arc::new(TunnelRunner::new()), supervisor);
//!
//! manager.select_domain("example.com").await?;
//! let change = manager
//!     .add_hostname("6ff42ae2-765d-4adf-8112-31c55c1551ef", "app.example.com", "", "http://localhost:3000")
//!     .await?;
//! if change.is_partial_failure() {
//!     eprintln!("ingress updated, DNS not: {:?}", change.dns);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod hostnames;
pub mod manager;

pub use auth::{generate_password, sidecar_service, AuthSidecar, AuthToggle, SidecarError};
pub use error::{ManagerError, ProcessError, RemoteError};
pub use hostnames::{DnsOutcome, HostnameChange};
pub use manager::{TunnelManager, DEFAULT_SERVICE};

// Re-export the component crates' public types
pub use tunnelman_cloudflare::{
    ApiConfig, ApiError, CloudflareApi, DnsSynchronizer, ResolvedStatus, RunnerError,
    TunnelCatalog, TunnelRunner,
};
pub use tunnelman_proto::{
    DnsRecord, IngressRule, PublicHostname, Tunnel, TunnelConfig, TunnelStatus, Zone,
};
pub use tunnelman_supervisor::{
    CancellationToken, ManagedProcess, ProcessSupervisor, RunnerConfig, RunnerConfigStore,
    SupervisorConfig,
};
