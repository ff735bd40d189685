#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` using wiremock.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use tailctl_api::types::{AclPolicyBody, AclRuleBody, ServiceRequestBody};
use tailctl_api::{
    ApiClient, Error, ErrorKind, InMemoryMetrics, Jitter, RateLimitConfig, RetryPolicy,
};

// ── Helpers ─────────────────────────────────────────────────────────

const ROOT: &str = "/api/v2/tailnet/example.com";

fn tailnet_path(suffix: &str) -> String {
    format!("{ROOT}/{suffix}")
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        factor: 2.0,
        max_delay: Duration::from_millis(20),
        max_total_wait: Duration::from_secs(5),
        jitter: Jitter::None,
    }
}

fn unlimited() -> RateLimitConfig {
    RateLimitConfig {
        requests_per_second: 0.0,
        ..RateLimitConfig::default()
    }
}

async fn setup_with(rate_limit: RateLimitConfig) -> (MockServer, ApiClient, Arc<InMemoryMetrics>) {
    let server = MockServer::start().await;
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = ApiClient::builder(server.uri(), "example.com")
        .api_key("tskey-api-test".to_owned().into())
        .rate_limit(rate_limit)
        .retry(fast_retry())
        .metrics(metrics.clone())
        .build()
        .unwrap();
    (server, client, metrics)
}

async fn setup() -> (MockServer, ApiClient, Arc<InMemoryMetrics>) {
    setup_with(unlimited()).await
}

fn device_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("{id}.example.ts.net"),
        "hostname": id,
        "os": "linux",
        "addresses": ["100.64.0.1"],
        "authorized": true,
        "tags": ["tag:server"],
        "lastSeen": "2026-10-16T12:00:00Z",
        "connectedToControl": true
    })
}

// ── Auth & basics ───────────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/n1")))
        .and(header("authorization", "Bearer tskey-api-test"))
        .and(query_param("fields", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_json("n1")))
        .expect(1)
        .mount(&server)
        .await;

    let device = client.get_device("n1").await.unwrap();
    assert_eq!(device.id, "n1");
    assert!(device.connected_to_control);
}

#[tokio::test]
async fn test_status_codes_map_to_kinds() {
    let (server, client, _) = setup().await;

    for (id, status, kind) in [
        ("a", 401, ErrorKind::Authentication),
        ("b", 403, ErrorKind::Authorization),
        ("c", 404, ErrorKind::NotFound),
        ("d", 422, ErrorKind::Validation),
    ] {
        Mock::given(method("GET"))
            .and(path(tailnet_path(&format!("devices/{id}"))))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"message": "nope"})),
            )
            .mount(&server)
            .await;

        let err = client.get_device(id).await.unwrap_err();
        assert_eq!(err.kind(), kind, "status {status}: {err:?}");
        assert_eq!(err.status(), Some(status));
    }
}

// ── Retry ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transient_get_exhausts_after_max_attempts() {
    let (server, client, metrics) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/n1")))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client.get_device("n1").await.unwrap_err();
    assert!(
        matches!(err, Error::RetriesExhausted { attempts: 3, .. }),
        "expected RetriesExhausted after 3 attempts, got: {err:?}"
    );
    assert_eq!(err.kind(), ErrorKind::TransientServer);

    let snap = metrics.snapshot();
    assert_eq!(snap.server_error, 3);
    assert_eq!(snap.retries_exhausted, 1);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/n1")))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/n1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_json("n1")))
        .mount(&server)
        .await;

    let device = client.get_device("n1").await.unwrap();
    assert_eq!(device.id, "n1");
}

#[tokio::test]
async fn test_non_idempotent_post_is_not_retried() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("keys")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .create_key(&tailctl_api::types::CreateKeyBody::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Server { status: 500, .. }),
        "expected raw Server error, got: {err:?}"
    );
}

#[tokio::test]
async fn test_asserted_idempotent_post_is_retried() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("devices/n1/tags")))
        .and(body_json(json!({"tags": ["tag:web"]})))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client
        .set_device_tags("n1", &["tag:web".to_owned()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_service_create_with_idempotency_key_is_retried() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("services")))
        .and(header("idempotency-key", "req-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("services")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "svc1", "name": "web"})),
        )
        .mount(&server)
        .await;

    let body = ServiceRequestBody {
        name: "web".into(),
        ..ServiceRequestBody::default()
    };
    let service = client.create_service(&body, Some("req-1")).await.unwrap();
    assert_eq!(service.id, "svc1");
}

#[tokio::test]
async fn test_rate_limited_response_is_retried() {
    let (server, client, metrics) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("dns/nameservers")))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("dns/nameservers")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dns": ["1.1.1.1"]})))
        .mount(&server)
        .await;

    let nameservers = client.get_nameservers().await.unwrap();
    assert_eq!(nameservers, vec!["1.1.1.1".to_owned()]);
    assert_eq!(metrics.snapshot().client_error, 1);
}

// ── Rate limiting ───────────────────────────────────────────────────

#[tokio::test]
async fn test_same_family_requests_are_spaced() {
    let (server, client, _) = setup_with(RateLimitConfig {
        requests_per_second: 10.0,
        ..RateLimitConfig::default()
    })
    .await;

    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&arrivals);
    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/n1")))
        .respond_with(move |_: &Request| {
            recorded.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200).set_body_json(device_json("n1"))
        })
        .expect(4)
        .mount(&server)
        .await;

    let calls = (0..4).map(|_| {
        let client = client.clone();
        async move { client.get_device("n1").await }
    });
    for result in futures_util::future::join_all(calls).await {
        result.unwrap();
    }

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 4);
    // 100ms interval, less a little slack for loopback transit jitter.
    for pair in arrivals.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(90), "requests {gap:?} apart");
    }
}

#[tokio::test]
async fn test_families_are_limited_independently() {
    let mut per_endpoint = std::collections::HashMap::new();
    per_endpoint.insert("devices".to_owned(), 0.2);
    let (server, client, _) = setup_with(RateLimitConfig {
        requests_per_second: 0.0,
        per_endpoint,
        max_wait: Duration::from_secs(30),
    })
    .await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/n1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_json("n1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("dns/searchpaths")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"searchPaths": []})))
        .mount(&server)
        .await;

    client.get_device("n1").await.unwrap();

    // The devices bucket is now 5s out; DNS must not wait behind it.
    let start = Instant::now();
    client.get_search_paths().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_limiter_ceiling_fails_fast() {
    let (server, client, metrics) = setup_with(RateLimitConfig {
        requests_per_second: 0.1,
        per_endpoint: std::collections::HashMap::new(),
        max_wait: Duration::from_secs(1),
    })
    .await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("users/u1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
        .expect(1)
        .mount(&server)
        .await;

    client.get_user("u1").await.unwrap();
    let err = client.get_user("u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert_eq!(metrics.snapshot().rate_limit_exceeded, 1);
}

// ── Pagination ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_pagination_follows_cursor() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("devices")))
        .and(query_param("cursor", "page2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"devices": [device_json("n3")]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("devices")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [device_json("n1"), device_json("n2")],
            "nextCursor": "page2"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n2", "n3"]);
}

#[tokio::test]
async fn test_repeated_cursor_terminates() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("users")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"id": "u1"}],
            "nextCursor": "same"
        })))
        .mount(&server)
        .await;

    let users = client.list_users().await.unwrap();
    // First page, then one page for cursor "same" which repeats itself.
    assert_eq!(users.len(), 2);
}

// ── ACL ─────────────────────────────────────────────────────────────

fn policy() -> AclPolicyBody {
    AclPolicyBody {
        acls: vec![AclRuleBody {
            action: "accept".into(),
            src: vec!["group:eng".into()],
            dst: vec!["tag:web:443".into()],
            proto: None,
        }],
        ..AclPolicyBody::default()
    }
}

#[tokio::test]
async fn test_acl_round_trip_uses_etag() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("acl")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-1\"")
                .set_body_json(&policy()),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .and(header("if-match", "\"rev-1\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-2\"")
                .set_body_json(&policy()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let current = client.get_acl().await.unwrap();
    assert_eq!(current.etag.as_deref(), Some("\"rev-1\""));

    let updated = client
        .update_acl(&current.policy, current.etag.as_deref())
        .await
        .unwrap();
    assert_eq!(updated.etag.as_deref(), Some("\"rev-2\""));
    assert_eq!(updated.policy, policy());
}

#[tokio::test]
async fn test_acl_partial_apply_is_transient_server_error() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .respond_with(ResponseTemplate::new(207).set_body_json(json!({
            "partial": true,
            "message": "3 nodes pending"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.update_acl(&policy(), None).await.unwrap_err();
    assert!(matches!(err, Error::PartialApply { ref message } if message == "3 nodes pending"));
    assert_eq!(err.kind(), ErrorKind::TransientServer);
}

#[tokio::test]
async fn test_acl_conflict_is_not_retried() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .and(header_exists("if-match"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({"message": "precondition failed"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.update_acl(&policy(), Some("\"stale\"")).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { status: 412, .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancellation_aborts_in_flight_request() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("devices/slow")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(device_json("slow"))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let scoped = client.with_cancellation(token.clone());
    let handle = tokio::spawn(async move { scoped.get_device("slow").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let start = Instant::now();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = ApiClient::builder("http://127.0.0.1:9", "example.com")
        .retry(RetryPolicy::disabled())
        .rate_limit(unlimited())
        .build()
        .unwrap();

    let err = client.get_device("n1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
