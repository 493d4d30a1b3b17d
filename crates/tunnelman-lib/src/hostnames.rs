//! Public hostname edits: fetch, edit, validate, push, then DNS
//!
//! Every edit re-fetches the remote configuration right before changing it.
//! The provider has no version precondition, so an edit made by someone else
//! between fetch and push is overwritten.
//!
//! DNS is synchronized only after the push succeeded. A DNS failure at that
//! point does not undo the ingress edit: the change is returned as a
//! success whose [`DnsOutcome`] is `Failed`.

use tracing::{debug, info, warn};
use tunnelman_cloudflare::ApiError;
use tunnelman_proto::editor;
use tunnelman_proto::{DnsRecord, IngressRule, PublicHostname, TunnelConfig, CATCH_ALL_SERVICE};

use crate::error::ManagerError;
use crate::manager::TunnelManager;

/// What happened to the DNS side of a hostname change
#[derive(Debug, Clone)]
pub enum DnsOutcome {
    Created(DnsRecord),
    /// Number of records deleted
    Deleted(usize),
    /// Hostname renamed: records of the old name deleted, one created for the new
    Moved { deleted: usize, created: DnsRecord },
    /// Nothing to synchronize
    Unchanged,
    /// The ingress edit is live but DNS is out of sync
    Failed(ApiError),
}

#[derive(Debug, Clone)]
pub struct HostnameChange {
    /// The rule as pushed (for removals, the rule that was removed)
    pub hostname: PublicHostname,
    pub dns: DnsOutcome,
}

impl HostnameChange {
    /// Ingress updated but the DNS record could not be synchronized
    pub fn is_partial_failure(&self) -> bool {
        matches!(self.dns, DnsOutcome::Failed(_))
    }
}

fn require_hostname(hostname: &str) -> Result<(), ManagerError> {
    if hostname.is_empty() {
        return Err(ManagerError::Validation(
            "hostname is required (an empty hostname is the catch-all rule)".to_string(),
        ));
    }
    Ok(())
}

fn hostname_not_found(hostname: &str) -> ManagerError {
    ManagerError::NotFound(format!("Hostname {} not found", hostname))
}

impl TunnelManager {
    fn service_or_default(&self, service: &str) -> String {
        let service = service.trim();
        if service.is_empty() {
            self.default_service.clone()
        } else {
            service.to_string()
        }
    }

    /// Current remote rules; an empty rule list is seeded with the catch-all
    pub(crate) async fn fetch_config(&self, tunnel_id: &str) -> Result<TunnelConfig, ManagerError> {
        let mut config = self.remote.fetch(tunnel_id).await?.config;
        if config.ingress.is_empty() {
            debug!(tunnel_id, "Remote configuration is empty, seeding catch-all rule");
            config.ingress.push(IngressRule::catch_all(CATCH_ALL_SERVICE));
        }
        Ok(config)
    }

    async fn push_config(&self, tunnel_id: &str, config: &TunnelConfig) -> Result<(), ManagerError> {
        editor::validate(config)?;
        self.remote.push(tunnel_id, config).await?;
        Ok(())
    }

    /// Rewrite the rule of `original` without touching DNS
    ///
    /// Returns the rewritten rule together with the configuration as pushed.
    pub(crate) async fn edit_rule(
        &self,
        tunnel_id: &str,
        original: &str,
        new_hostname: &str,
        path: &str,
        service: &str,
    ) -> Result<(PublicHostname, TunnelConfig), ManagerError> {
        let config = self.fetch_config(tunnel_id).await?;
        let index = config
            .ingress
            .iter()
            .position(|rule| rule.hostname == original)
            .ok_or_else(|| hostname_not_found(original))?;

        let edited = editor::update(&config, original, new_hostname, path, service)?;
        self.push_config(tunnel_id, &edited).await?;

        let rule = edited
            .ingress
            .get(index)
            .map(PublicHostname::from)
            .ok_or_else(|| hostname_not_found(new_hostname))?;
        Ok((rule, edited))
    }

    pub async fn public_hostnames(
        &self,
        tunnel_id: &str,
    ) -> Result<Vec<PublicHostname>, ManagerError> {
        Ok(self.fetch_config(tunnel_id).await?.public_hostnames())
    }

    /// Route `hostname` + `path` to `service` and point DNS at the tunnel
    ///
    /// An empty path means every path; an empty service falls back to the
    /// default service.
    pub async fn add_hostname(
        &self,
        tunnel_id: &str,
        hostname: &str,
        path: &str,
        service: &str,
    ) -> Result<HostnameChange, ManagerError> {
        let hostname = hostname.trim();
        require_hostname(hostname)?;
        let service = self.service_or_default(service);

        let config = self.fetch_config(tunnel_id).await?;
        let edited = editor::insert(&config, hostname, path, &service)?;
        self.push_config(tunnel_id, &edited).await?;

        let rule = edited
            .ingress
            .iter()
            .find(|rule| rule.matches(hostname, path))
            .map(PublicHostname::from)
            .ok_or_else(|| hostname_not_found(hostname))?;
        info!(tunnel_id, hostname, path = %rule.path, service = %rule.service, "Added public hostname");

        // The rule is live from here on; DNS failures are reported, not rolled back
        let dns = match self.dns.on_hostname_added(hostname, tunnel_id, false).await {
            Ok(record) => DnsOutcome::Created(record),
            Err(e) => {
                warn!(hostname, error = %e, "Hostname added but DNS record was not created");
                DnsOutcome::Failed(e)
            }
        };

        Ok(HostnameChange {
            hostname: rule,
            dns,
        })
    }

    /// Rewrite the first rule of `original`; DNS follows a rename
    ///
    /// Records of `original` are kept while another rule still routes it, and
    /// no record is created for a hostname that was already routed.
    pub async fn update_hostname(
        &self,
        tunnel_id: &str,
        original: &str,
        new_hostname: &str,
        path: &str,
        service: &str,
    ) -> Result<HostnameChange, ManagerError> {
        let new_hostname = new_hostname.trim();
        require_hostname(new_hostname)?;
        let renamed = original != new_hostname;

        let mut service = self.service_or_default(service);
        if renamed {
            // The sidecar is bound to the old name; route the new one to the real backend
            if let Some(original_service) = self.auth_backend(original, &service).await {
                service = original_service;
            }
        }

        let (rule, edited) = self
            .edit_rule(tunnel_id, original, new_hostname, path, &service)
            .await?;
        info!(tunnel_id, original, hostname = new_hostname, "Updated public hostname");

        if !renamed {
            return Ok(HostnameChange {
                hostname: rule,
                dns: DnsOutcome::Unchanged,
            });
        }

        let original_routed = edited.ingress.iter().any(|r| r.hostname == original);
        let new_already_routed = edited
            .ingress
            .iter()
            .filter(|r| r.hostname == new_hostname)
            .count()
            > 1;

        if !original_routed {
            self.release_auth(original).await;
        }

        let dns = match self
            .move_dns(tunnel_id, original, new_hostname, original_routed, new_already_routed)
            .await
        {
            Ok(dns) => dns,
            Err(e) => {
                warn!(original, hostname = new_hostname, error = %e, "Hostname renamed but DNS was not moved");
                DnsOutcome::Failed(e)
            }
        };

        Ok(HostnameChange {
            hostname: rule,
            dns,
        })
    }

    async fn move_dns(
        &self,
        tunnel_id: &str,
        original: &str,
        new_hostname: &str,
        keep_original: bool,
        new_already_routed: bool,
    ) -> Result<DnsOutcome, ApiError> {
        let deleted = if keep_original {
            debug!(hostname = original, "Hostname still routed by another rule, keeping DNS");
            None
        } else {
            match self.dns.on_hostname_removed(original).await {
                Ok(count) => Some(count),
                Err(ApiError::RecordNotFound(_)) => Some(0),
                Err(e) => return Err(e),
            }
        };
        let created = if new_already_routed {
            None
        } else {
            Some(
                self.dns
                    .on_hostname_added(new_hostname, tunnel_id, false)
                    .await?,
            )
        };

        Ok(match (deleted, created) {
            (Some(deleted), Some(created)) => DnsOutcome::Moved { deleted, created },
            (None, Some(created)) => DnsOutcome::Created(created),
            (Some(deleted), None) => DnsOutcome::Deleted(deleted),
            (None, None) => DnsOutcome::Unchanged,
        })
    }

    /// Remove the rule for `hostname` + `path`; `""` and `*` are the same path
    ///
    /// DNS records are deleted only when no other rule still uses the hostname.
    pub async fn remove_hostname(
        &self,
        tunnel_id: &str,
        hostname: &str,
        path: &str,
    ) -> Result<HostnameChange, ManagerError> {
        let hostname = hostname.trim();
        require_hostname(hostname)?;

        let config = self.fetch_config(tunnel_id).await?;
        let removed = config
            .ingress
            .iter()
            .find(|rule| rule.matches(hostname, path))
            .map(PublicHostname::from);
        let edited = editor::remove(&config, hostname, path)?;
        self.push_config(tunnel_id, &edited).await?;

        let removed = removed.ok_or_else(|| hostname_not_found(hostname))?;
        info!(tunnel_id, hostname, path = %removed.path, "Removed public hostname");

        self.release_auth(hostname).await;

        if edited.ingress.iter().any(|rule| rule.hostname == hostname) {
            debug!(hostname, "Hostname still routed by another rule, keeping DNS");
            return Ok(HostnameChange {
                hostname: removed,
                dns: DnsOutcome::Unchanged,
            });
        }

        let dns = match self.dns.on_hostname_removed(hostname).await {
            Ok(count) => DnsOutcome::Deleted(count),
            Err(e) => {
                warn!(hostname, error = %e, "Hostname removed but DNS records were not deleted");
                DnsOutcome::Failed(e)
            }
        };

        Ok(HostnameChange {
            hostname: removed,
            dns,
        })
    }
}
