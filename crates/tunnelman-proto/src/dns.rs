//! DNS records and zones as exchanged with the DNS provider

use serde::{Deserialize, Serialize};
use std::fmt;

/// TTL value the provider interprets as "automatic"
pub const AUTO_TTL: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "MX")]
    Mx,
    #[serde(rename = "TXT")]
    Txt,
    #[serde(rename = "SRV")]
    Srv,
    #[serde(rename = "NS")]
    Ns,
    #[serde(rename = "PTR")]
    Ptr,
    #[serde(other)]
    Other,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRecordType::A => "A",
            DnsRecordType::Aaaa => "AAAA",
            DnsRecordType::Cname => "CNAME",
            DnsRecordType::Mx => "MX",
            DnsRecordType::Txt => "TXT",
            DnsRecordType::Srv => "SRV",
            DnsRecordType::Ns => "NS",
            DnsRecordType::Ptr => "PTR",
            DnsRecordType::Other => "OTHER",
        }
    }

    /// Only address and alias records can sit behind the provider's proxy
    pub fn can_be_proxied(&self) -> bool {
        matches!(
            self,
            DnsRecordType::A | DnsRecordType::Aaaa | DnsRecordType::Cname
        )
    }
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Assigned by the provider; empty for records not yet created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    AUTO_TTL
}

impl DnsRecord {
    /// A CNAME record for `name` pointing at `target`
    pub fn cname(name: impl Into<String>, target: impl Into<String>, proxied: bool) -> Self {
        Self {
            id: String::new(),
            zone_id: String::new(),
            name: name.into(),
            record_type: DnsRecordType::Cname,
            content: target.into(),
            proxied,
            ttl: AUTO_TTL,
        }
    }
}

/// DNS-management scope, usually a registered domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}
