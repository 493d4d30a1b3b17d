//! Client, remote config and DNS against the in-process fake provider

use serde_json::json;
use tunnelman_cloudflare::testing::{FakeCloudflare, FAKE_ACCOUNT_ID, GATEWAY_ERROR_BODY};
use tunnelman_cloudflare::{ApiConfig, ApiError, CloudflareApi, DnsSynchronizer, RemoteConfigClient};
use tunnelman_proto::{IngressRule, TunnelConfig, CATCH_ALL_SERVICE};

const TUNNEL_ID: &str = "c1744f8b-faa1-48a4-9e5c-02ac921467fa";

fn api(fake: &FakeCloudflare) -> CloudflareApi {
    CloudflareApi::new(fake.api_config()).unwrap()
}

#[tokio::test]
async fn test_account_lookup_and_credentials() {
    let fake = FakeCloudflare::start().await;
    let api = api(&fake);

    assert_eq!(api.account_id().await.unwrap(), FAKE_ACCOUNT_ID);
    api.verify_credentials().await.unwrap();

    let rejected =
        CloudflareApi::new(ApiConfig::new("wrong").with_base_url(fake.base_url())).unwrap();
    let err = rejected.verify_credentials().await.unwrap_err();
    assert!(err.is_authentication());
    assert!(err.to_string().contains("[10000] Authentication error"));
}

#[tokio::test]
async fn test_fetch_unconfigured_tunnel_is_empty() {
    let fake = FakeCloudflare::start().await;
    let remote = RemoteConfigClient::new(api(&fake));

    let configuration = remote.fetch(TUNNEL_ID).await.unwrap();

    assert_eq!(configuration.tunnel_id, TUNNEL_ID);
    assert_eq!(configuration.version, 0);
    assert!(configuration.config.ingress.is_empty());
}

#[tokio::test]
async fn test_push_replaces_configuration() {
    let fake = FakeCloudflare::start().await;
    let remote = RemoteConfigClient::new(api(&fake));

    let mut config = TunnelConfig::with_catch_all(CATCH_ALL_SERVICE);
    config.ingress.insert(
        0,
        IngressRule::new("app.example.com", "*", "http://localhost:3000"),
    );
    remote.push(TUNNEL_ID, &config).await.unwrap();

    let fetched = remote.fetch(TUNNEL_ID).await.unwrap();
    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.config, config);
    assert_eq!(fake.state().config_pushes, 1);
}

#[tokio::test]
async fn test_forbidden_tunnel() {
    let fake = FakeCloudflare::start().await;
    fake.state().forbidden_tunnels.push(TUNNEL_ID.to_string());
    let remote = RemoteConfigClient::new(api(&fake));

    let err = remote.fetch(TUNNEL_ID).await.unwrap_err();

    assert!(matches!(err, ApiError::Remote { status: 403, .. }));
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_unsuccessful_envelope_with_ok_status() {
    let fake = FakeCloudflare::start().await;
    fake.state().reject_configuration_reads = true;
    let remote = RemoteConfigClient::new(api(&fake));

    let err = remote.fetch(TUNNEL_ID).await.unwrap_err();

    match &err {
        ApiError::Remote { status, errors } => {
            assert_eq!(*status, 200);
            assert_eq!(
                *errors,
                vec![json!({ "code": 1003, "message": "Invalid tunnel configuration request" })]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err
        .to_string()
        .contains("[1003] Invalid tunnel configuration request"));
}

#[tokio::test]
async fn test_non_json_error_body_is_kept_verbatim() {
    let fake = FakeCloudflare::start().await;
    fake.state().configuration_gateway_down = true;
    let remote = RemoteConfigClient::new(api(&fake));

    let err = remote.fetch(TUNNEL_ID).await.unwrap_err();

    match &err {
        ApiError::Remote { status, errors } => {
            assert_eq!(*status, 502);
            assert_eq!(*errors, vec![json!(GATEWAY_ERROR_BODY)]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_authentication());
}

#[tokio::test]
async fn test_dns_follows_hostnames() {
    let fake = FakeCloudflare::start().await;
    fake.state().add_zone("zone-1", "example.com");
    let dns = DnsSynchronizer::new(api(&fake));

    let err = dns
        .on_hostname_added("app.example.com", TUNNEL_ID, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NoDomainSelected));

    dns.select_domain("example.com").await;
    let record = dns
        .on_hostname_added("app.example.com", TUNNEL_ID, false)
        .await
        .unwrap();
    assert_eq!(record.id, "rec-1");
    assert_eq!(record.content, format!("{}.cfargotunnel.com", TUNNEL_ID));

    let err = dns
        .on_hostname_added("app.example.com", TUNNEL_ID, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RecordExists(_)));

    let replaced = dns
        .on_hostname_added("app.example.com", TUNNEL_ID, true)
        .await
        .unwrap();
    assert_eq!(replaced.id, "rec-2");
    assert_eq!(fake.state().records_named("app.example.com").len(), 1);

    assert_eq!(dns.on_hostname_removed("app.example.com").await.unwrap(), 1);
    let err = dns.on_hostname_removed("app.example.com").await.unwrap_err();
    assert!(matches!(err, ApiError::RecordNotFound(_)));
}

#[tokio::test]
async fn test_unknown_domain() {
    let fake = FakeCloudflare::start().await;
    fake.state().add_zone("zone-1", "example.com");
    let dns = DnsSynchronizer::new(api(&fake));

    assert_eq!(dns.available_domains().await.unwrap(), vec!["example.com"]);

    let err = dns.resolve_zone("example.net").await.unwrap_err();
    assert!(matches!(err, ApiError::ZoneNotFound(_)));
    assert!(err.is_not_found());
}
