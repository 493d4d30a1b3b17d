//! Persistent CLI settings
//!
//! Stored in ~/.tunnelman/config.json. Command-line flags and environment
//! variables take precedence over anything stored here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Keys accepted by `tunnelman config set`
pub const SETTING_KEYS: &[&str] = &[
    "api-token",
    "account-id",
    "domain",
    "runner-config-dir",
    "refresh-interval",
    "log-level",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelmanConfig {
    pub api_token: Option<String>,
    pub account_id: Option<String>,
    /// Domain whose zone receives hostname records
    pub selected_domain: Option<String>,
    /// Directory of runner configs; ~/.cloudflared when unset
    pub runner_config_dir: Option<PathBuf>,
    /// Status polling cadence of `tunnelman run`
    pub refresh_interval_secs: u64,
    pub log_level: String,
}

impl Default for TunnelmanConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            account_id: None,
            selected_domain: None,
            runner_config_dir: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl TunnelmanConfig {
    /// Apply `tunnelman config set <key> <value>`; an empty value clears optional keys
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        match key {
            "api-token" => self.api_token = optional(value),
            "account-id" => self.account_id = optional(value),
            "domain" => self.selected_domain = optional(value),
            "runner-config-dir" => self.runner_config_dir = optional(value).map(PathBuf::from),
            "refresh-interval" => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid refresh interval: {:?}", value))?;
                if secs == 0 {
                    bail!("Refresh interval must be at least 1 second");
                }
                self.refresh_interval_secs = secs;
            }
            "log-level" => {
                self.log_level = optional(value).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
            }
            other => bail!(
                "Unknown setting {:?} (expected one of: {})",
                other,
                SETTING_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Token with everything but the last four characters masked
    pub fn redacted_token(&self) -> Option<String> {
        self.api_token.as_ref().map(|token| {
            let visible: String = token
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{}", visible)
        })
    }
}

/// Configuration manager
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self {
            path: home.join(".tunnelman").join("config.json"),
        })
    }

    #[cfg(test)]
    pub fn with_base_dir(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join("config.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration; a missing file yields the defaults
    pub fn load(&self) -> Result<TunnelmanConfig> {
        if !self.path.exists() {
            return Ok(TunnelmanConfig::default());
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file: {:?}", self.path))?;

        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {:?}", self.path))
    }

    pub fn save(&self, config: &TunnelmanConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write config file: {:?}", self.path))
    }

    /// Load, change one key, save
    pub fn set(&self, key: &str, value: &str) -> Result<TunnelmanConfig> {
        let mut config = self.load()?;
        config.set(key, value)?;
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(dir.path());

        let config = manager.load().unwrap();
        assert_eq!(config, TunnelmanConfig::default());
        assert_eq!(config.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECS);
    }

    #[test]
    fn test_set_persists_and_clears() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(&dir.path().join("nested"));

        manager.set("api-token", "abcdef123456").unwrap();
        manager.set("domain", "example.com").unwrap();
        manager.set("refresh-interval", "15").unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.api_token.as_deref(), Some("abcdef123456"));
        assert_eq!(config.selected_domain.as_deref(), Some("example.com"));
        assert_eq!(config.refresh_interval_secs, 15);
        assert_eq!(config.redacted_token().as_deref(), Some("****3456"));

        manager.set("domain", "").unwrap();
        assert!(manager.load().unwrap().selected_domain.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = TunnelmanConfig::default();
        assert!(config.set("refresh-interval", "0").is_err());
        assert!(config.set("refresh-interval", "soon").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert_eq!(config, TunnelmanConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(dir.path());
        fs::write(manager.path(), r#"{"account_id": "acc-1"}"#).unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.account_id.as_deref(), Some("acc-1"));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }
}
