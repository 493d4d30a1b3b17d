//! DNS records that follow a tunnel's public hostnames
//!
//! Each public hostname added through tunnelman gets a CNAME pointing at
//! `<tunnel-id>.cfargotunnel.com` in the zone of the selected domain. The
//! provider does not tie the record to the ingress rule; the pairing is a
//! tunnelman convention only.

use reqwest::Method;
use serde::de::IgnoredAny;
use tokio::sync::RwLock;
use tracing::{debug, info};
use tunnelman_proto::{DnsRecord, DnsRecordType, Zone};

use crate::client::CloudflareApi;
use crate::error::ApiError;

pub const TUNNEL_TARGET_SUFFIX: &str = "cfargotunnel.com";

/// CNAME target routing traffic into `tunnel_id`
pub fn tunnel_target(tunnel_id: &str) -> String {
    format!("{}.{}", tunnel_id, TUNNEL_TARGET_SUFFIX)
}

pub struct DnsSynchronizer {
    api: CloudflareApi,
    selected_domain: RwLock<Option<String>>,
    proxied: bool,
}

impl DnsSynchronizer {
    pub fn new(api: CloudflareApi) -> Self {
        Self {
            api,
            selected_domain: RwLock::new(None),
            proxied: true,
        }
    }

    /// Whether created records are proxied (default: true)
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    pub async fn select_domain(&self, domain: impl Into<String>) {
        let domain = domain.into();
        info!(%domain, "Selected DNS domain");
        *self.selected_domain.write().await = Some(domain);
    }

    pub async fn selected_domain(&self) -> Option<String> {
        self.selected_domain.read().await.clone()
    }

    /// Zone holding `domain`
    pub async fn resolve_zone(&self, domain: &str) -> Result<Zone, ApiError> {
        let zones: Vec<Zone> = self.api.get("zones", &[("name", domain)]).await?;
        zones
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ZoneNotFound(domain.to_string()))
    }

    /// Zone of the currently selected domain
    pub async fn active_zone(&self) -> Result<Zone, ApiError> {
        let domain = self
            .selected_domain()
            .await
            .ok_or(ApiError::NoDomainSelected)?;
        self.resolve_zone(&domain).await
    }

    pub async fn list_zones(&self) -> Result<Vec<Zone>, ApiError> {
        self.api.get("zones", &[("per_page", "50")]).await
    }

    /// Names of every zone visible to the token
    pub async fn available_domains(&self) -> Result<Vec<String>, ApiError> {
        Ok(self
            .list_zones()
            .await?
            .into_iter()
            .map(|zone| zone.name)
            .collect())
    }

    pub async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
        record_type: Option<DnsRecordType>,
    ) -> Result<Vec<DnsRecord>, ApiError> {
        let path = format!("zones/{}/dns_records", zone_id);
        let mut query = vec![("name", name)];
        if let Some(record_type) = &record_type {
            query.push(("type", record_type.as_str()));
        }
        self.api.get(&path, &query).await
    }

    pub async fn create_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord, ApiError> {
        let path = format!("zones/{}/dns_records", zone_id);
        let body = serde_json::to_value(record).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.api.call(Method::POST, &path, &[], Some(&body)).await
    }

    pub async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ApiError> {
        let path = format!("zones/{}/dns_records/{}", zone_id, record_id);
        let _: IgnoredAny = self.api.call(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    /// Point `hostname` at `tunnel_id`, replacing existing records only when `overwrite`
    pub async fn on_hostname_added(
        &self,
        hostname: &str,
        tunnel_id: &str,
        overwrite: bool,
    ) -> Result<DnsRecord, ApiError> {
        let zone = self.active_zone().await?;

        let existing = self.list_records(&zone.id, hostname, None).await?;
        if !existing.is_empty() {
            if !overwrite {
                return Err(ApiError::RecordExists(hostname.to_string()));
            }
            for record in &existing {
                debug!(hostname, record_id = %record.id, "Replacing existing DNS record");
                self.delete_record(&zone.id, &record.id).await?;
            }
        }

        let record = DnsRecord::cname(hostname, tunnel_target(tunnel_id), self.proxied);
        let created = self.create_record(&zone.id, &record).await?;
        info!(hostname, target = %record.content, zone = %zone.name, "Created DNS record");
        Ok(created)
    }

    /// Delete every record named `hostname`; returns how many were removed
    pub async fn on_hostname_removed(&self, hostname: &str) -> Result<usize, ApiError> {
        let zone = self.active_zone().await?;

        let records = self.list_records(&zone.id, hostname, None).await?;
        if records.is_empty() {
            return Err(ApiError::RecordNotFound(hostname.to_string()));
        }

        for record in &records {
            self.delete_record(&zone.id, &record.id).await?;
        }
        info!(hostname, count = records.len(), "Deleted DNS records");
        Ok(records.len())
    }
}
