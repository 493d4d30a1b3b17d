//! Pure edits over a [`TunnelConfig`]
//!
//! Every function takes the fetched configuration by reference and returns a
//! new value, so a rejected edit leaves the input untouched. None of them
//! perform I/O; pushing the result is the caller's job.

use std::collections::HashSet;
use thiserror::Error;

use crate::ingress::{normalize_path, stored_path, IngressRule, TunnelConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    #[error("Invalid ingress configuration: {0}")]
    Validation(String),

    #[error("Hostname {hostname} with path {path} already exists")]
    Conflict { hostname: String, path: String },

    #[error("Hostname {0} not found")]
    HostnameNotFound(String),

    #[error("Hostname {hostname} with path {path} not found")]
    RuleNotFound { hostname: String, path: String },
}

/// Next rule id: one past the largest numeric id
///
/// Non-numeric ids are ignored, as is an id of `u64::MAX` since nothing follows it.
pub fn next_rule_id(rules: &[IngressRule]) -> u64 {
    rules
        .iter()
        .filter_map(IngressRule::numeric_id)
        .filter(|id| *id < u64::MAX)
        .max()
        .unwrap_or(0)
        + 1
}

/// Insert a rule for `(hostname, path)` immediately before the catch-all
///
/// Without a catch-all the rule is appended; [`validate`] will reject such a
/// config before it is pushed.
pub fn insert(
    config: &TunnelConfig,
    hostname: &str,
    path: &str,
    service: &str,
) -> Result<TunnelConfig, IngressError> {
    let path = normalize_path(path);

    if config
        .ingress
        .iter()
        .any(|rule| !rule.is_catch_all() && rule.matches(hostname, path))
    {
        return Err(IngressError::Conflict {
            hostname: hostname.to_string(),
            path: path.to_string(),
        });
    }

    let mut rule = IngressRule::new(hostname, path, service);
    rule.id = next_rule_id(&config.ingress).to_string();
    rule.origin_request = Some(Default::default());

    let mut edited = config.clone();
    match edited.catch_all_index() {
        Some(index) => edited.ingress.insert(index, rule),
        None => edited.ingress.push(rule),
    }

    Ok(edited)
}

/// Rewrite the first rule whose hostname is `original_hostname`
pub fn update(
    config: &TunnelConfig,
    original_hostname: &str,
    new_hostname: &str,
    path: &str,
    service: &str,
) -> Result<TunnelConfig, IngressError> {
    let mut edited = config.clone();
    let rule = edited
        .ingress
        .iter_mut()
        .find(|rule| rule.hostname == original_hostname)
        .ok_or_else(|| IngressError::HostnameNotFound(original_hostname.to_string()))?;

    rule.hostname = new_hostname.to_string();
    rule.service = service.to_string();
    rule.path = stored_path(path);

    Ok(edited)
}

/// Remove the first rule routing `(hostname, path)`; `""` and `*` are equivalent
pub fn remove(
    config: &TunnelConfig,
    hostname: &str,
    path: &str,
) -> Result<TunnelConfig, IngressError> {
    let index = config
        .ingress
        .iter()
        .position(|rule| rule.matches(hostname, path))
        .ok_or_else(|| IngressError::RuleNotFound {
            hostname: hostname.to_string(),
            path: normalize_path(path).to_string(),
        })?;

    let mut edited = config.clone();
    edited.ingress.remove(index);
    Ok(edited)
}

/// Check the structural invariants required before a push
pub fn validate(config: &TunnelConfig) -> Result<(), IngressError> {
    let Some(last) = config.ingress.len().checked_sub(1) else {
        return Err(IngressError::Validation(
            "at least one ingress rule is required".to_string(),
        ));
    };

    let mut seen = HashSet::new();
    for (i, rule) in config.ingress.iter().enumerate() {
        if rule.service.is_empty() {
            return Err(IngressError::Validation(format!(
                "service is required for ingress rule {}",
                i
            )));
        }

        if rule.is_catch_all() {
            if i != last {
                return Err(IngressError::Validation(format!(
                    "hostname is required for ingress rule {} (only the last rule may be a catch-all)",
                    i
                )));
            }
            continue;
        }

        if i == last {
            return Err(IngressError::Validation(
                "last ingress rule must be a catch-all (no hostname)".to_string(),
            ));
        }

        if !seen.insert((rule.hostname.as_str(), rule.normalized_path())) {
            return Err(IngressError::Validation(format!(
                "duplicate ingress rule for {} with path {}",
                rule.hostname,
                rule.normalized_path()
            )));
        }
    }

    Ok(())
}
