use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::auth::{require_role, GateLayer};
use crate::AppState;

pub mod handlers;

/// Request bodies are two short JSON fields; anything bigger is abuse.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Build the full HTTP surface.
///
/// `/admin/*` sits behind the approver gate and `/server/*` behind the
/// requester gate. Gates are route layers, so a rejected call never reaches
/// a handler (and therefore never touches the registry).
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/approve/:req_id",
            get(handlers::approve).post(handlers::approve),
        )
        .route("/deny/:req_id", get(handlers::deny).post(handlers::deny))
        .route("/requests", get(handlers::list_requests))
        .route_layer(middleware::from_fn_with_state(
            GateLayer {
                gate: state.admin_gate.clone(),
                metrics: state.metrics.clone(),
            },
            require_role,
        ));

    let server = Router::new()
        .route("/request-key", post(handlers::request_key))
        .route("/get-key", post(handlers::get_key))
        .route_layer(middleware::from_fn_with_state(
            GateLayer {
                gate: state.client_gate.clone(),
                metrics: state.metrics.clone(),
            },
            require_role,
        ));

    Router::new()
        // Health endpoints (no auth)
        .route("/pingz", get(handlers::ping))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(handlers::metrics))
        .nest("/admin", admin)
        .nest("/server", server)
        .fallback(fallback_404)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with broker logs.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // The secret travels in response bodies; nothing may cache them.
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
