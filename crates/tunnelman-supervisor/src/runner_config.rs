//! Local runner config files
//!
//! A managed tunnel launched from a config gets it written to
//! `<config_dir>/<name>.yml` first; the runner then reads that file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tunnelman_proto::editor;
use tunnelman_proto::{IngressRule, TunnelConfig, CATCH_ALL_SERVICE};

use crate::error::SupervisorError;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Contents of a runner `.yml` config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(rename = "tunnel")]
    pub tunnel_id: String,

    #[serde(rename = "credentials-file", default)]
    pub credentials_file: PathBuf,

    #[serde(default)]
    pub ingress: Vec<IngressRule>,

    #[serde(rename = "loglevel", default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(rename = "logfile", default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(
        rename = "no-autoupdate",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub no_autoupdate: bool,

    /// Keys tunnelman does not model, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RunnerConfig {
    /// Config with only the catch-all rule; credentials are expected in `<config_dir>/<tunnel_id>.json`
    pub fn catch_all_only(tunnel_id: &str, config_dir: &Path) -> Self {
        Self {
            tunnel_id: tunnel_id.to_string(),
            credentials_file: config_dir.join(format!("{}.json", tunnel_id)),
            ingress: vec![IngressRule::catch_all(CATCH_ALL_SERVICE)],
            log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
            log_file: None,
            metrics: None,
            protocol: None,
            no_autoupdate: false,
            extra: BTreeMap::new(),
        }
    }

    /// Config routing `hostname` to `service`
    pub fn single_service(tunnel_id: &str, config_dir: &Path, hostname: &str, service: &str) -> Self {
        let mut config = Self::catch_all_only(tunnel_id, config_dir);
        config.add_rule(hostname, service);
        config
    }

    /// Insert a rule for `hostname` just before the catch-all
    pub fn add_rule(&mut self, hostname: &str, service: &str) {
        let rule = IngressRule::new(hostname, "", service);
        match self.ingress.iter().position(IngressRule::is_catch_all) {
            Some(index) => self.ingress.insert(index, rule),
            None => self.ingress.push(rule),
        }
    }

    /// Remove the first rule for `hostname`; false when there is none
    pub fn remove_rule(&mut self, hostname: &str) -> bool {
        match self.ingress.iter().position(|r| r.hostname == hostname) {
            Some(index) => {
                self.ingress.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.tunnel_id.is_empty() {
            return Err(SupervisorError::InvalidConfig(
                "tunnel ID is required".to_string(),
            ));
        }

        let rules = TunnelConfig {
            ingress: self.ingress.clone(),
            ..Default::default()
        };
        editor::validate(&rules).map_err(|e| SupervisorError::InvalidConfig(e.to_string()))
    }
}

/// `<name>.yml` files in one directory
#[derive(Debug, Clone)]
pub struct RunnerConfigStore {
    dir: PathBuf,
}

impl RunnerConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.cloudflared`, where the runner keeps its credentials
    pub fn default_dir() -> Result<PathBuf, SupervisorError> {
        dirs::home_dir()
            .map(|home| home.join(".cloudflared"))
            .ok_or_else(|| SupervisorError::ConfigFile {
                path: "~/.cloudflared".to_string(),
                reason: "failed to get home directory".to_string(),
            })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yml", name))
    }

    fn file_error(path: &Path, reason: impl ToString) -> SupervisorError {
        SupervisorError::ConfigFile {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Tunnel name (alphanumeric, hyphens, underscores, dots)
    fn validate_name(name: &str) -> Result<(), SupervisorError> {
        if name.is_empty() {
            return Err(SupervisorError::InvalidConfig(
                "tunnel name cannot be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || name.starts_with('.')
        {
            return Err(SupervisorError::InvalidConfig(format!(
                "tunnel name {:?} must contain only alphanumeric characters, hyphens, underscores and dots",
                name
            )));
        }
        Ok(())
    }

    /// Write `config` for `name`, returning the file path
    pub fn save(&self, name: &str, config: &RunnerConfig) -> Result<PathBuf, SupervisorError> {
        Self::validate_name(name)?;
        fs::create_dir_all(&self.dir).map_err(|e| Self::file_error(&self.dir, e))?;

        let path = self.path_for(name);
        let yaml = serde_yaml::to_string(config).map_err(|e| Self::file_error(&path, e))?;
        fs::write(&path, yaml).map_err(|e| Self::file_error(&path, e))?;

        debug!(name, path = %path.display(), "Saved runner config");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<RunnerConfig, SupervisorError> {
        Self::validate_name(name)?;
        let path = self.path_for(name);
        let yaml = fs::read_to_string(&path).map_err(|e| Self::file_error(&path, e))?;
        serde_yaml::from_str(&yaml).map_err(|e| Self::file_error(&path, e))
    }

    /// Delete the config of `name`; a missing file is not an error
    pub fn delete(&self, name: &str) -> Result<(), SupervisorError> {
        Self::validate_name(name)?;
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::file_error(&path, e)),
        }
    }

    /// Names of every stored config, sorted
    pub fn list(&self) -> Result<Vec<String>, SupervisorError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::file_error(&self.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Self::file_error(&self.dir, e))?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
