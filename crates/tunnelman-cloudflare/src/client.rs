//! Authenticated access to the provider's v4 API
//!
//! Every response is wrapped in a `{success, result, errors}` envelope. A
//! non-2xx status or `success: false` is surfaced as [`ApiError::Remote`]
//! carrying the provider's `errors` array unchanged. Calls are issued once;
//! there is no retry or backoff.

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::ApiError;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Connection settings for [`CloudflareApi`]
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bearer token
    pub token: String,
    /// Account to operate on; looked up from the token when absent
    pub account_id: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            account_id: None,
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
}

/// Shared handle to the provider API; cheap to clone
#[derive(Clone)]
pub struct CloudflareApi {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    token: String,
    account_id: OnceCell<String>,
}

impl CloudflareApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        if config.token.is_empty() {
            return Err(ApiError::MissingToken);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::from)?;

        let account_id = match config.account_id {
            Some(id) if !id.is_empty() => OnceCell::new_with(Some(id)),
            _ => OnceCell::new(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                token: config.token,
                account_id,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Account id, resolved from the first account visible to the token on first use
    pub async fn account_id(&self) -> Result<String, ApiError> {
        self.inner
            .account_id
            .get_or_try_init(|| async {
                let accounts: Vec<Account> = self.get("accounts", &[]).await?;
                accounts
                    .into_iter()
                    .next()
                    .map(|account| account.id)
                    .ok_or(ApiError::AccountUnavailable)
            })
            .await
            .cloned()
    }

    /// Check that the token is accepted by the provider
    pub async fn verify_credentials(&self) -> Result<(), ApiError> {
        let _: Value = self.get("user/tokens/verify", &[]).await?;
        Ok(())
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.call(Method::GET, path, query, None).await
    }

    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'));
        debug!(%method, %url, "Cloudflare API request");

        let mut request = self
            .inner
            .http
            .request(method, &url)
            .bearer_auth(&self.inner.token)
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Remote {
                    status: status.as_u16(),
                    errors: vec![Value::String(String::from_utf8_lossy(&bytes).into_owned())],
                });
            }
            Err(e) => return Err(ApiError::Decode(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            return Err(ApiError::Remote {
                status: status.as_u16(),
                errors: envelope.errors,
            });
        }

        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}
