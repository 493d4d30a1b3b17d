//! Errors returned by the provider API and the runner CLI

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Cloudflare API token is required")]
    MissingToken,

    /// Non-2xx status or `success: false`; `errors` is the provider payload verbatim
    #[error("API request failed with status {status}: {}", render_errors(.errors))]
    Remote { status: u16, errors: Vec<Value> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("No account available for this API token")]
    AccountUnavailable,

    #[error("No domain selected - please select a domain first")]
    NoDomainSelected,

    #[error("No zones found for domain: {0}")]
    ZoneNotFound(String),

    #[error("DNS record for {0} already exists. Use overwrite option to replace it")]
    RecordExists(String),

    #[error("No DNS record found for {0}")]
    RecordNotFound(String),
}

fn render_errors(errors: &[Value]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| match e.get("message").and_then(Value::as_str) {
            Some(message) => match e.get("code") {
                Some(code) => format!("[{}] {}", code, message),
                None => message.to_string(),
            },
            None => e.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApiError {
    fn text(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Credentials rejected; surfaced with a friendlier hint, never retried
    pub fn is_authentication(&self) -> bool {
        if let ApiError::Remote { status, .. } = self {
            if *status == 401 || *status == 403 {
                return true;
            }
        }
        let text = self.text();
        text.contains("authentication")
            || text.contains("unauthorized")
            || text.contains("invalid token")
    }

    pub fn is_rate_limited(&self) -> bool {
        if let ApiError::Remote { status: 429, .. } = self {
            return true;
        }
        let text = self.text();
        text.contains("rate limit") || text.contains("too many requests")
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::ZoneNotFound(_) | ApiError::RecordNotFound(_) => true,
            ApiError::Remote { status: 404, .. } => true,
            _ => {
                let text = self.text();
                text.contains("not found") || text.contains("does not exist")
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

#[derive(Error, Debug, Clone)]
pub enum RunnerError {
    #[error("Failed to execute {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// Non-zero exit; `output` is the combined stdout/stderr text
    #[error("Command failed: {command} - {output}")]
    Failed { command: String, output: String },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("Tunnel with name {0} not found")]
    TunnelNotFound(String),
}
