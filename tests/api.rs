//! End-to-end tests of the HTTP surface.
//!
//! Every test builds a fresh router over a fresh registry and drives it with
//! `tower::ServiceExt::oneshot`; no sockets or external services are needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use keygate::{api, config, AppState};

const ADMIN: &str = "admin-secret-for-tests";
const CLIENT: &str = "client-secret-for-tests";
const SECRET: &str = "your-decryption-key";

fn app(timeout: &str) -> (Router, Arc<AppState>) {
    let env: HashMap<&str, &str> = HashMap::from([
        ("KEYGATE_ADMIN_SECRET", ADMIN),
        ("KEYGATE_CLIENT_SECRET", CLIENT),
        ("KEYGATE_SECRET", SECRET),
        ("KEYGATE_REQUEST_TIMEOUT", timeout),
    ]);
    let cfg = config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
    let state = Arc::new(AppState::from_config(&cfg).unwrap());
    (api::router(state.clone()), state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn request_key(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/server/request-key",
        Some(CLIENT),
        Some(json!({ "server_id": "db-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["request_id"].as_str().unwrap().to_string()
}

async fn get_key(app: &Router, id: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/server/get-key",
        Some(CLIENT),
        Some(json!({ "req_id": id })),
    )
    .await
}

async fn admin(app: &Router, action: &str, id: &str) -> (StatusCode, Value) {
    send(app, Method::GET, &format!("/admin/{}/{}", action, id), Some(ADMIN), None).await
}

// ═══════════════════════════════════════════════════════════════════
//  Health
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_ping_needs_no_auth() {
    let (app, _) = app("5m");
    let (status, body) = send(&app, Method::GET, "/pingz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "pong");

    let (status, _) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = app("5m");
    let (status, _) = send(&app, Method::GET, "/admin/nope", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/approve/x", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════
//  Request creation
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_request_key_response_shape() {
    let (app, _) = app("5m");
    let (status, body) = send(
        &app,
        Method::POST,
        "/server/request-key",
        Some(CLIENT),
        Some(json!({ "server_id": "test-server" })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["request_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok(), "request_id should be a valid UUID");
    assert_eq!(body["expires_in_secs"], 300);
    assert_eq!(body["approve_link"], format!("/admin/approve/{}", id));
    assert_eq!(body["deny_link"], format!("/admin/deny/{}", id));
    assert!(body["message"].as_str().unwrap().contains("300 seconds"));
}

#[tokio::test]
async fn test_request_key_body_validation() {
    let (app, state) = app("5m");

    // server_id is optional
    let (status, _) = send(
        &app,
        Method::POST,
        "/server/request-key",
        Some(CLIENT),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // not JSON at all
    let req = Request::builder()
        .method(Method::POST)
        .uri("/server/request-key")
        .header("authorization", format!("Bearer {}", CLIENT))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // wrong type for server_id
    let (status, body) = send(
        &app,
        Method::POST,
        "/server/request-key",
        Some(CLIENT),
        Some(json!({ "server_id": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_body");

    assert_eq!(state.registry.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════
//  Authorization gates
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_server_routes_require_client_secret() {
    let (app, state) = app("5m");
    let body = Some(json!({ "server_id": "s" }));

    let (status, err) = send(&app, Method::POST, "/server/request-key", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"]["message"], "authorization header is required");

    let (status, err) = send(&app, Method::POST, "/server/request-key", Some("wrong"), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"]["message"], "invalid authorization key");

    // the approver's secret is not a requester credential
    let (status, _) = send(&app, Method::POST, "/server/request-key", Some(ADMIN), body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_admin_routes_require_admin_secret() {
    let (app, _) = app("5m");
    let id = request_key(&app).await;

    for bearer in [None, Some("invalid-key"), Some(CLIENT)] {
        let (status, _) = send(&app, Method::GET, &format!("/admin/approve/{}", id), bearer, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/admin/requests", bearer, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // rejected approvals never reached the registry
    let (status, _) = get_key(&app, &id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_non_bearer_authorization_is_rejected() {
    let (app, _) = app("5m");
    let req = Request::builder()
        .method(Method::GET)
        .uri("/admin/requests")
        .header("authorization", ADMIN)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ═══════════════════════════════════════════════════════════════════
//  Lifecycle scenarios
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_approve_then_poll_repeatedly() {
    let (app, _) = app("5m");
    let id = request_key(&app).await;

    let (status, body) = get_key(&app, &id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "request_not_approved");

    let (status, body) = admin(&app, "approve", &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["id"], id);

    for _ in 0..2 {
        let (status, body) = get_key(&app, &id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["key"], SECRET);
    }
}

#[tokio::test]
async fn test_deny_removes_request() {
    let (app, _) = app("5m");
    let id = request_key(&app).await;

    let (status, body) = admin(&app, "deny", &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "denied");

    let (status, _) = get_key(&app, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = admin(&app, "approve", &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = admin(&app, "deny", &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_decisions_accept_post() {
    let (app, _) = app("5m");
    let id = request_key(&app).await;
    let (status, _) = send(&app, Method::POST, &format!("/admin/approve/{}", id), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, &format!("/admin/deny/{}", id), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_expired_request_is_gone() {
    let (app, _) = app("1s");
    let id = request_key(&app).await;

    tokio::time::advance(Duration::from_millis(1001)).await;

    let (status, body) = admin(&app, "approve", &id).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], "request_expired");

    let (status, _) = get_key(&app, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_approved_request_expires_too() {
    let (app, _) = app("5m");
    let id = request_key(&app).await;
    let (status, _) = admin(&app, "approve", &id).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::advance(Duration::from_secs(301)).await;

    let (status, _) = get_key(&app, &id).await;
    assert_eq!(status, StatusCode::GONE);
    let (status, _) = get_key(&app, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════
//  Identifier handling
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_malformed_ids_are_bad_request() {
    let (app, state) = app("5m");
    request_key(&app).await;

    for action in ["approve", "deny"] {
        let (status, body) = admin(&app, action, "invalid-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request_id");
    }
    let (status, _) = get_key(&app, "invalid-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (app, _) = app("5m");
    let stranger = uuid::Uuid::new_v4().to_string();

    let (status, _) = admin(&app, "approve", &stranger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = admin(&app, "deny", &stranger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_key(&app, &stranger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════
//  Listing, metrics, headers
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_admin_can_list_live_requests() {
    let (app, _) = app("5m");
    let first = request_key(&app).await;
    let second = request_key(&app).await;
    admin(&app, "approve", &second).await;

    let (status, body) = send(&app, Method::GET, "/admin/requests", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 2);

    let find = |id: &str| listed.iter().find(|r| r["id"] == id).unwrap().clone();
    assert_eq!(find(first.as_str())["status"], "pending");
    assert_eq!(find(second.as_str())["status"], "approved");
    assert_eq!(find(first.as_str())["server_id"], "db-01");
    // oneshot requests carry no peer address
    assert_eq!(find(first.as_str())["source_addr"], "unknown");
}

#[tokio::test]
async fn test_metrics_reflect_outcomes() {
    let (app, _) = app("5m");
    let id = request_key(&app).await;
    get_key(&app, &id).await;
    admin(&app, "approve", &id).await;
    get_key(&app, &id).await;
    send(&app, Method::GET, "/admin/requests", Some("nope"), None).await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();

    assert!(text.contains("keygate_requests_created_total 1"));
    assert!(text.contains(r#"keygate_retrievals_total{outcome="not_approved"} 1"#));
    assert!(text.contains(r#"keygate_retrievals_total{outcome="ok"} 1"#));
    assert!(text.contains(r#"keygate_decisions_total{decision="approve",outcome="ok"} 1"#));
    assert!(text.contains(r#"keygate_auth_rejections_total{role="approver"} 1"#));
    assert!(text.contains("keygate_live_requests 1"));
}

#[tokio::test]
async fn test_responses_carry_security_headers() {
    let (app, _) = app("5m");
    let req = Request::builder()
        .method(Method::POST)
        .uri("/server/get-key")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let headers = resp.headers();
    assert_eq!(headers["cache-control"], "no-store");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}
