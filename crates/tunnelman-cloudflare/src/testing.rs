//! In-process fake of the provider API for integration tests
//!
//! Serves the account, tunnel-configuration, zone and DNS-record endpoints
//! from an in-memory [`FakeState`] on a random local port.

use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tunnelman_proto::{DnsRecord, TunnelConfig, Zone};

use crate::client::ApiConfig;

pub const FAKE_ACCOUNT_ID: &str = "fake-account";
pub const FAKE_TOKEN: &str = "fake-token";
/// Body of a plain-text gateway error
pub const GATEWAY_ERROR_BODY: &str = "upstream connect error or disconnect/reset before headers";

#[derive(Debug, Default)]
pub struct FakeState {
    pub configs: HashMap<String, TunnelConfig>,
    pub versions: HashMap<String, i64>,
    pub zones: Vec<Zone>,
    pub records: Vec<DnsRecord>,
    pub next_record_id: u64,
    pub config_pushes: usize,
    /// Reject DNS record creation with a provider error
    pub fail_dns_create: bool,
    /// Tunnels whose configuration endpoint answers 403
    pub forbidden_tunnels: Vec<String>,
    /// Answer configuration reads with HTTP 200 and `success: false`
    pub reject_configuration_reads: bool,
    /// Answer configuration reads with a plain-text 502, as a proxy in front of the API would
    pub configuration_gateway_down: bool,
}

impl FakeState {
    pub fn add_zone(&mut self, id: &str, name: &str) {
        self.zones.push(Zone {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn records_named(&self, name: &str) -> Vec<&DnsRecord> {
        self.records.iter().filter(|r| r.name == name).collect()
    }
}

type Shared = Arc<Mutex<FakeState>>;
type Reply = (StatusCode, Json<Value>);

pub struct FakeCloudflare {
    base_url: String,
    state: Shared,
    task: JoinHandle<()>,
}

impl FakeCloudflare {
    pub async fn start() -> Self {
        let state: Shared = Arc::default();

        let app = Router::new()
            .route("/accounts", get(accounts))
            .route(
                "/accounts/{account}/cfd_tunnel/{tunnel}/configurations",
                get(get_configuration).put(put_configuration),
            )
            .route("/zones", get(zones))
            .route(
                "/zones/{zone}/dns_records",
                get(list_records).post(create_record),
            )
            .route("/zones/{zone}/dns_records/{id}", delete(delete_record))
            .route("/user/tokens/verify", get(verify_token))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake provider");
        let addr = listener.local_addr().expect("fake provider address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            task,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client settings pointing at this fake
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::new(FAKE_TOKEN).with_base_url(self.base_url.clone())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }
}

impl Drop for FakeCloudflare {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn ok(result: Value) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "errors": [], "messages": [], "result": result })),
    )
}

fn fail(status: StatusCode, code: u32, message: &str) -> Reply {
    (
        status,
        Json(json!({
            "success": false,
            "errors": [{ "code": code, "message": message }],
            "messages": [],
            "result": null
        })),
    )
}

fn check_auth(headers: &HeaderMap) -> Result<(), Reply> {
    let expected = format!("Bearer {}", FAKE_TOKEN);
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(fail(
            StatusCode::UNAUTHORIZED,
            10000,
            "Authentication error",
        )),
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, FakeState> {
    state.lock().expect("fake state poisoned")
}

async fn accounts(headers: HeaderMap) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    ok(json!([{ "id": FAKE_ACCOUNT_ID, "name": "Fake account" }]))
}

async fn verify_token(headers: HeaderMap) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    ok(json!({ "id": "token-id", "status": "active" }))
}

fn configuration_body(tunnel: &str, version: i64, config: Option<&TunnelConfig>) -> Value {
    json!({
        "tunnel_id": tunnel,
        "version": version,
        "config": config,
        "source": "cloudflare",
        "created_at": "2024-01-01T00:00:00Z"
    })
}

async fn get_configuration(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((account, tunnel)): Path<(String, String)>,
) -> Response {
    if let Err(reply) = check_auth(&headers) {
        return reply.into_response();
    }
    if account != FAKE_ACCOUNT_ID {
        return fail(StatusCode::NOT_FOUND, 1001, "Account not found").into_response();
    }

    let state = lock(&state);
    if state.configuration_gateway_down {
        return (StatusCode::BAD_GATEWAY, GATEWAY_ERROR_BODY).into_response();
    }
    if state.reject_configuration_reads {
        return fail(StatusCode::OK, 1003, "Invalid tunnel configuration request").into_response();
    }
    if state.forbidden_tunnels.contains(&tunnel) {
        return fail(StatusCode::FORBIDDEN, 10000, "Authentication error").into_response();
    }
    let version = state.versions.get(&tunnel).copied().unwrap_or(0);
    ok(configuration_body(&tunnel, version, state.configs.get(&tunnel))).into_response()
}

async fn put_configuration(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((account, tunnel)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    if account != FAKE_ACCOUNT_ID {
        return fail(StatusCode::NOT_FOUND, 1001, "Account not found");
    }

    let config: TunnelConfig = match serde_json::from_value(body["config"].clone()) {
        Ok(config) => config,
        Err(e) => return fail(StatusCode::BAD_REQUEST, 1003, &e.to_string()),
    };

    let mut state = lock(&state);
    if state.forbidden_tunnels.contains(&tunnel) {
        return fail(StatusCode::FORBIDDEN, 10000, "Authentication error");
    }
    let version = state.versions.get(&tunnel).copied().unwrap_or(0) + 1;
    state.versions.insert(tunnel.clone(), version);
    state.configs.insert(tunnel.clone(), config);
    state.config_pushes += 1;
    ok(configuration_body(&tunnel, version, state.configs.get(&tunnel)))
}

async fn zones(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    let state = lock(&state);
    let zones: Vec<&Zone> = state
        .zones
        .iter()
        .filter(|z| query.get("name").map_or(true, |name| &z.name == name))
        .collect();
    ok(json!(zones))
}

async fn list_records(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(zone): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    let state = lock(&state);
    let records: Vec<&DnsRecord> = state
        .records
        .iter()
        .filter(|r| r.zone_id == zone)
        .filter(|r| query.get("name").map_or(true, |name| &r.name == name))
        .filter(|r| {
            query
                .get("type")
                .map_or(true, |t| r.record_type.as_str() == t)
        })
        .collect();
    ok(json!(records))
}

async fn create_record(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(zone): Path<String>,
    Json(mut record): Json<DnsRecord>,
) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    let mut state = lock(&state);
    if state.fail_dns_create {
        return fail(
            StatusCode::BAD_REQUEST,
            81053,
            "An A, AAAA, or CNAME record with that host already exists.",
        );
    }

    state.next_record_id += 1;
    record.id = format!("rec-{}", state.next_record_id);
    record.zone_id = zone;
    state.records.push(record.clone());
    ok(json!(record))
}

async fn delete_record(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((zone, id)): Path<(String, String)>,
) -> Reply {
    if let Err(reply) = check_auth(&headers) {
        return reply;
    }
    let mut state = lock(&state);
    let before = state.records.len();
    state.records.retain(|r| !(r.zone_id == zone && r.id == id));
    if state.records.len() == before {
        return fail(StatusCode::NOT_FOUND, 81044, "Record does not exist.");
    }
    ok(json!({ "id": id }))
}
