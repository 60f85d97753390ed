//! keygate — human-approved release of a protected secret.
//!
//! A requester registers an access request, an approver approves or denies
//! it within the request timeout, and the requester collects the secret once
//! approved. The binary in `main.rs` wires these modules into an HTTP
//! service; integration tests in `tests/` drive the same router.

use std::sync::Arc;

use anyhow::Context;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod registry;

use middleware::auth::{AuthGate, Role};
use middleware::metrics::Metrics;
use registry::Registry;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub admin_gate: Arc<AuthGate>,
    pub client_gate: Arc<AuthGate>,
    pub metrics: Arc<Metrics>,
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn from_config(cfg: &config::Config) -> anyhow::Result<Self> {
        let metrics = Metrics::new().context("failed to register metrics")?;
        Ok(Self {
            registry: Arc::new(Registry::new(cfg.secret.clone(), cfg.request_timeout)),
            admin_gate: Arc::new(AuthGate::new(Role::Approver, &cfg.admin_secret)),
            client_gate: Arc::new(AuthGate::new(Role::Requester, &cfg.client_secret)),
            metrics: Arc::new(metrics),
            trust_proxy_headers: cfg.trust_proxy_headers,
        })
    }
}
