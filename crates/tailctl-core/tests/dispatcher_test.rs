#![allow(clippy::unwrap_used)]
// Integration tests for the operations modules and `Dispatcher`, against
// a wiremock control plane.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tailctl_api::{ApiClient, Jitter, RateLimitConfig, RetryPolicy};
use tailctl_core::{Dispatcher, ErrorKind, LivenessPolicy, Operations};

// ── Helpers ─────────────────────────────────────────────────────────

const ROOT: &str = "/api/v2/tailnet/example.com";

fn tailnet_path(suffix: &str) -> String {
    format!("{ROOT}/{suffix}")
}

async fn setup() -> (MockServer, Dispatcher) {
    let server = MockServer::start().await;
    let api = ApiClient::builder(server.uri(), "example.com")
        .api_key("tskey-api-test".to_owned().into())
        .rate_limit(RateLimitConfig {
            requests_per_second: 0.0,
            ..RateLimitConfig::default()
        })
        .retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            factor: 2.0,
            max_delay: Duration::from_millis(10),
            max_total_wait: Duration::from_secs(1),
            jitter: Jitter::None,
        })
        .build()
        .unwrap();
    let dispatcher = Dispatcher::new(Operations::new(api, LivenessPolicy::default()));
    (server, dispatcher)
}

fn device_json(id: &str, tags: &[&str], last_seen_minutes_ago: i64) -> Value {
    let seen = Utc::now() - TimeDelta::minutes(last_seen_minutes_ago);
    json!({
        "id": id,
        "name": format!("{id}.example.ts.net"),
        "hostname": id,
        "os": "linux",
        "addresses": ["100.64.0.1"],
        "authorized": true,
        "tags": tags,
        "lastSeen": seen.to_rfc3339(),
        "connectedToControl": true
    })
}

async fn mount_devices(server: &MockServer, devices: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(tailnet_path("devices")))
        .and(query_param("fields", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": devices })))
        .mount(server)
        .await;
}

fn ids(result: &Value) -> Vec<String> {
    result["result"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_owned())
        .collect()
}

// ── Parameter validation ────────────────────────────────────────────

#[tokio::test]
async fn test_missing_required_param_fails_before_any_request() {
    let (server, dispatcher) = setup().await;

    let err = dispatcher
        .invoke("device", "tag", json!({ "tags": ["tag:web"] }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), "VALIDATION_ERROR");
    let fields: Vec<&str> = err.source.fields().iter().map(|f| f.field.as_str()).collect();
    assert_eq!(fields, vec!["device_id"]);
    assert!(err.to_string().contains("device_id"), "{err}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_missing_params_are_named() {
    let (server, dispatcher) = setup().await;

    let err = dispatcher
        .invoke("security", "tag_batch", json!({ "mode": "add", "extra": 1 }))
        .await
        .unwrap_err();

    let fields: Vec<&str> = err.source.fields().iter().map(|f| f.field.as_str()).collect();
    assert_eq!(fields, vec!["device_ids", "tags", "extra"]);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_tool_and_operation_name_the_valid_set() {
    let (server, dispatcher) = setup().await;

    let err = dispatcher.invoke("firewall", "list", Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(
        err.to_string()
            .contains("device, network, policy, security, reporting"),
        "{err}"
    );

    let err = dispatcher.invoke("policy", "destroy", Value::Null).await.unwrap_err();
    assert!(err.to_string().contains("rollback"), "{err}");
    assert_eq!(err.to_json()["operation"], "destroy");

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_local_validation_runs_before_network() {
    let (server, dispatcher) = setup().await;

    let err = dispatcher
        .invoke(
            "device",
            "tag",
            json!({ "device_id": "n1", "tags": ["web"], "mode": "replace" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("tag:"), "{err}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_time_windows_are_bounded_before_network() {
    let (server, dispatcher) = setup().await;

    for operation in ["audit_log", "connectivity"] {
        for hours in [0, 8761, u32::MAX] {
            let err = dispatcher
                .invoke("security", operation, json!({ "hours": hours }))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "{operation} hours={hours}");
            let fields: Vec<&str> =
                err.source.fields().iter().map(|f| f.field.as_str()).collect();
            assert_eq!(fields, vec!["hours"], "{operation} hours={hours}");
        }
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tag_filter_is_intersection_in_server_order() {
    let (server, dispatcher) = setup().await;
    mount_devices(
        &server,
        vec![
            device_json("c", &["tag:x", "tag:y", "tag:z"], 1),
            device_json("d", &["tag:y"], 1),
            device_json("a", &["tag:x", "tag:y"], 1),
            device_json("b", &["tag:x"], 1),
            device_json("e", &[], 1),
            device_json("f", &["tag:z"], 1),
        ],
    )
    .await;

    let result = dispatcher
        .invoke("device", "list", json!({ "tags": ["tag:x", "tag:y"] }))
        .await
        .unwrap();

    assert_eq!(result["tool"], "device");
    assert_eq!(result["operation"], "list");
    assert_eq!(ids(&result), vec!["c", "d", "a", "b"]);
    assert_eq!(result["result"]["total"], 4);
}

#[tokio::test]
async fn test_list_derives_liveness() {
    let (server, dispatcher) = setup().await;
    mount_devices(
        &server,
        vec![device_json("fresh", &[], 10), device_json("stale", &[], 45)],
    )
    .await;

    let result = dispatcher.invoke("device", "list", json!({})).await.unwrap();
    let statuses: Vec<&str> = result["result"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["online", "offline"]);

    let online = dispatcher
        .invoke("device", "list", json!({ "online_only": true }))
        .await
        .unwrap();
    assert_eq!(ids(&online), vec!["fresh"]);
}

#[tokio::test]
async fn test_list_pages_with_limit_and_offset() {
    let (server, dispatcher) = setup().await;
    mount_devices(
        &server,
        (1..=5).map(|i| device_json(&format!("n{i}"), &[], 1)).collect(),
    )
    .await;

    let result = dispatcher
        .invoke("device", "list", json!({ "limit": 2, "offset": 3 }))
        .await
        .unwrap();
    assert_eq!(ids(&result), vec!["n4", "n5"]);
    assert_eq!(result["result"]["has_more"], false);
}

// ── Batch tags ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_tag_update_reports_per_item_outcomes() {
    let (server, dispatcher) = setup().await;

    for id in ["n1", "n2", "n3", "n4"] {
        Mock::given(method("GET"))
            .and(path(tailnet_path(&format!("devices/{id}"))))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(device_json(id, &["tag:old"], 1)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(tailnet_path(&format!("devices/{id}/tags"))))
            .and(body_json(json!({ "tags": ["tag:new", "tag:old"] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }
    // "gone" is unknown to the mock server, which answers 404.

    let result = dispatcher
        .invoke(
            "security",
            "tag_batch",
            json!({
                "device_ids": ["n1", "n2", "gone", "n3", "n4"],
                "tags": ["tag:new"],
                "mode": "add"
            }),
        )
        .await
        .unwrap();

    let outcome = &result["result"];
    assert_eq!(outcome["total"], 5);
    assert_eq!(outcome["succeeded"], 4);
    assert_eq!(outcome["failed"], 1);

    let failed = &outcome["results"][2];
    assert_eq!(failed["device_id"], "gone");
    assert_eq!(failed["ok"], false);
    assert_eq!(failed["error"]["kind"], "NOT_FOUND");
    assert_eq!(failed["error"]["code"], "NOT_FOUND");
    assert!(failed["error"]["message"].is_string());
    assert!(failed["error"].get("fields").is_none());
    assert_eq!(outcome["results"][0]["ok"], true);
}

// ── Auth keys ───────────────────────────────────────────────────────

fn key_json(id: &str, revoked: bool) -> Value {
    let mut key = json!({
        "id": id,
        "description": format!("key {id}"),
        "created": "2026-10-01T00:00:00Z",
        "expires": "2099-01-01T00:00:00Z",
        "capabilities": {"devices": {"create": {"reusable": true}}}
    });
    if revoked {
        key["revoked"] = json!("2026-10-15T00:00:00Z");
    }
    key
}

#[tokio::test]
async fn test_revoked_keys_are_never_listed() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .and(path(tailnet_path("keys")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [key_json("k1", false), key_json("k2", true), key_json("k3", false)]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(tailnet_path("keys/k1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("keys")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [key_json("k1", true), key_json("k2", true), key_json("k3", false)]
        })))
        .mount(&server)
        .await;

    let before = dispatcher.invoke("device", "key_list", json!({})).await.unwrap();
    assert_eq!(ids(&before), vec!["k1", "k3"]);

    dispatcher
        .invoke("device", "key_revoke", json!({ "key_id": "k1" }))
        .await
        .unwrap();

    let after = dispatcher.invoke("device", "key_list", json!({})).await.unwrap();
    assert_eq!(ids(&after), vec!["k3"]);
}

#[tokio::test]
async fn test_key_create_exposes_secret_once() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("keys")))
        .respond_with(ResponseTemplate::new(200).set_body_json({
            let mut key = key_json("k9", false);
            key["key"] = json!("tskey-auth-secret");
            key
        }))
        .expect(1)
        .mount(&server)
        .await;

    let result = dispatcher
        .invoke(
            "device",
            "key_create",
            json!({ "reusable": true, "tags": ["tag:ci"], "expiry_seconds": 3600 }),
        )
        .await
        .unwrap();
    assert_eq!(result["result"]["secret"], "tskey-auth-secret");
    assert_eq!(result["result"]["key"]["id"], "k9");
    assert!(result["result"]["key"].get("secret").is_none());
}

// ── Policy update and rollback ──────────────────────────────────────

fn policy_a() -> Value {
    json!({ "acls": [{ "action": "accept", "src": ["group:eng"], "dst": ["tag:db:5432"] }] })
}

fn policy_b() -> Value {
    json!({ "acls": [{ "action": "accept", "src": ["*"], "dst": ["*:*"] }] })
}

#[tokio::test]
async fn test_update_then_rollback_restores_prior_revision() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("acl/validate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("acl")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-1\"")
                .set_body_json(policy_a()),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .and(header("if-match", "\"rev-1\""))
        .and(body_json(policy_b()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-2\"")
                .set_body_json(policy_b()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .and(body_json(policy_a()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-3\"")
                .set_body_json(policy_a()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let updated = dispatcher
        .invoke(
            "policy",
            "update",
            json!({ "policy": policy_b(), "expected_revision": "\"rev-1\"" }),
        )
        .await
        .unwrap();
    assert_eq!(updated["result"]["revision"], "\"rev-2\"");
    assert_eq!(updated["result"]["document"], policy_b());

    let restored = dispatcher.invoke("policy", "rollback", json!({})).await.unwrap();
    assert_eq!(restored["result"]["document"], policy_a());

    // The snapshot is consumed.
    let err = dispatcher.invoke("policy", "rollback", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_stale_expected_revision_is_rejected_without_write() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("acl/validate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("acl")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-5\"")
                .set_body_json(policy_a()),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_b()))
        .expect(0)
        .mount(&server)
        .await;

    let err = dispatcher
        .invoke(
            "policy",
            "update",
            json!({ "policy": policy_b(), "expected_revision": "\"rev-4\"" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.source.fields()[0].field, "revision");
}

#[tokio::test]
async fn test_partial_apply_keeps_snapshot_for_rollback() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("POST"))
        .and(path(tailnet_path("acl/validate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("acl")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"rev-1\"")
                .set_body_json(policy_a()),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("acl")))
        .and(body_json(policy_b()))
        .respond_with(ResponseTemplate::new(207).set_body_json(json!({
            "partial": true,
            "message": "2 nodes pending"
        })))
        .mount(&server)
        .await;

    let err = dispatcher
        .invoke("policy", "update", json!({ "policy": policy_b() }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientServer);
    assert_eq!(err.code(), "POLICY_PARTIALLY_APPLIED");
    assert!(dispatcher.operations().policies.has_snapshot().await);
}

#[tokio::test]
async fn test_locally_invalid_policy_never_reaches_validator() {
    let (server, dispatcher) = setup().await;

    let result = dispatcher
        .invoke(
            "policy",
            "validate",
            json!({ "policy": { "acls": [{ "action": "accept", "src": [], "dst": ["web"] }] } }),
        )
        .await
        .unwrap();
    assert_eq!(result["result"]["valid"], false);
    assert_eq!(result["result"]["validation"]["state"], "invalid");
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Reporting ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_report_degrades_when_policy_is_forbidden() {
    let (server, dispatcher) = setup().await;
    mount_devices(&server, vec![device_json("n1", &["tag:web"], 1)]).await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("acl")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "scope"})))
        .mount(&server)
        .await;
    for (suffix, body) in [
        ("dns/nameservers", json!({"dns": ["1.1.1.1"]})),
        ("dns/preferences", json!({"magicDNS": true})),
        ("dns/searchpaths", json!({"searchPaths": []})),
    ] {
        Mock::given(method("GET"))
            .and(path(tailnet_path(suffix)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }

    let result = dispatcher
        .invoke("reporting", "generate", json!({ "format": "json" }))
        .await
        .unwrap();
    let report = &result["result"]["content"];
    assert_eq!(result["result"]["format"], "json");
    assert_eq!(report["policy"]["status"], "unavailable");
    assert_eq!(report["dns"]["status"], "available");
    assert_eq!(report["statistics"]["total"], 1);
}

// ── Services ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_service_create_retries_under_one_idempotency_key() {
    let (server, dispatcher) = setup().await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("services")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(tailnet_path("services")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "svc1",
            "name": "web",
            "addrs": ["100.100.0.1"],
            "endpoints": [{ "host": "n1", "port": 443, "protocol": "tcp" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = dispatcher
        .invoke(
            "network",
            "service_create",
            json!({ "service": { "name": "web", "endpoints": [{ "host": "n1", "port": 443 }] } }),
        )
        .await
        .unwrap();
    assert_eq!(result["result"]["id"], "svc1");
    assert_eq!(result["result"]["addresses"], json!(["100.100.0.1"]));

    let keys: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            r.headers
                .get("idempotency-key")
                .unwrap()
                .to_str()
                .unwrap()
                .to_owned()
        })
        .collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
    assert!(!keys[0].is_empty());
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancelled_invocation_is_network_error() {
    let (server, dispatcher) = setup().await;
    Mock::given(method("GET"))
        .and(path(tailnet_path("devices")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "devices": [] }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = dispatcher
        .invoke_with("device", "stats", Value::Null, token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
