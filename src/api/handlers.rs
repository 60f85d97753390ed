use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;
use crate::middleware::metrics::Decision;
use crate::models::request::RequestSummary;
use crate::models::request_id::RequestId;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct RequestKeyBody {
    /// Free-form label identifying the requesting server. Not authenticated.
    #[serde(default)]
    pub server_id: String,
}

#[derive(Serialize)]
pub struct RequestKeyResponse {
    pub message: String,
    pub request_id: RequestId,
    pub expires_in_secs: u64,
    pub approve_link: String,
    pub deny_link: String,
}

#[derive(Deserialize)]
pub struct GetKeyBody {
    pub req_id: String,
}

#[derive(Serialize)]
pub struct GetKeyResponse<'a> {
    pub key: &'a str,
}

#[derive(Serialize)]
pub struct DecisionResponse {
    pub id: RequestId,
    pub status: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /pingz
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

/// GET /metrics — Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.set_live_requests(state.registry.len());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

/// POST /server/request-key — register a request awaiting approval
pub async fn request_key(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<RequestKeyBody>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestKeyResponse>), AppError> {
    let Json(body) = payload.map_err(|e| {
        tracing::warn!("request_key: {}", e);
        AppError::InvalidBody
    })?;

    let source = source_addr(
        state.trust_proxy_headers,
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
    );
    let id = state.registry.create(&body.server_id, &source);
    state.metrics.record_created();

    let expires_in_secs = state.registry.timeout().as_secs();
    Ok((
        StatusCode::ACCEPTED,
        Json(RequestKeyResponse {
            message: format!(
                "Request received. Awaiting approval. Request will expire in {} seconds.",
                expires_in_secs
            ),
            request_id: id,
            expires_in_secs,
            approve_link: format!("/admin/approve/{}", id),
            deny_link: format!("/admin/deny/{}", id),
        }),
    ))
}

/// POST /server/get-key — release the secret for an approved request
pub async fn get_key(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GetKeyBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload.map_err(|e| {
        tracing::warn!("get_key: {}", e);
        AppError::InvalidBody
    })?;

    let result = state.registry.retrieve(&body.req_id);
    state.metrics.record_retrieval(&result);
    let key = result?;

    Ok(Json(GetKeyResponse { key }).into_response())
}

/// GET|POST /admin/approve/:req_id
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(req_id): Path<String>,
) -> Result<Json<DecisionResponse>, AppError> {
    let result = state.registry.approve(&req_id);
    state.metrics.record_decision(Decision::Approve, &result);
    let id = result?;

    Ok(Json(DecisionResponse {
        id,
        status: "approved",
    }))
}

/// GET|POST /admin/deny/:req_id — removes the request
pub async fn deny(
    State(state): State<Arc<AppState>>,
    Path(req_id): Path<String>,
) -> Result<Json<DecisionResponse>, AppError> {
    let result = state.registry.deny(&req_id);
    state.metrics.record_decision(Decision::Deny, &result);
    let id = result?;

    Ok(Json(DecisionResponse {
        id,
        status: "denied",
    }))
}

/// GET /admin/requests — live requests, oldest first
pub async fn list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<RequestSummary>> {
    Json(state.registry.list())
}

/// Informational origin of a request. Never used for any decision.
fn source_addr(trust_proxy_headers: bool, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
