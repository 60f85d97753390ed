//! Prometheus metrics for the approval workflow.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! Each [`Metrics`] owns its own `prometheus::Registry` so several
//! instances (e.g. one per test) never collide on registration.

use prometheus::{
    opts, Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};

use crate::errors::RegistryError;
use crate::middleware::auth::Role;

#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Approve,
    Deny,
}

pub struct Metrics {
    registry: Registry,

    // Counters
    requests_created_total: IntCounter,
    decisions_total: IntCounterVec,
    retrievals_total: IntCounterVec,
    auth_rejections_total: IntCounterVec,
    swept_total: IntCounter,

    // Gauges
    live_requests: IntGauge,
}

impl Metrics {
    /// Create all metrics and register them in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_created_total = IntCounter::with_opts(opts!(
            "keygate_requests_created_total",
            "Total number of access requests registered"
        ))?;
        let decisions_total = IntCounterVec::new(
            opts!("keygate_decisions_total", "Approver decisions by outcome"),
            &["decision", "outcome"],
        )?;
        let retrievals_total = IntCounterVec::new(
            opts!("keygate_retrievals_total", "Secret retrieval attempts by outcome"),
            &["outcome"],
        )?;
        let auth_rejections_total = IntCounterVec::new(
            opts!("keygate_auth_rejections_total", "Calls turned away by an auth gate"),
            &["role"],
        )?;
        let swept_total = IntCounter::with_opts(opts!(
            "keygate_swept_total",
            "Expired requests purged by the sweeper"
        ))?;
        let live_requests = IntGauge::with_opts(opts!(
            "keygate_live_requests",
            "Entries currently held by the registry"
        ))?;

        registry.register(Box::new(requests_created_total.clone()))?;
        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(retrievals_total.clone()))?;
        registry.register(Box::new(auth_rejections_total.clone()))?;
        registry.register(Box::new(swept_total.clone()))?;
        registry.register(Box::new(live_requests.clone()))?;

        Ok(Self {
            registry,
            requests_created_total,
            decisions_total,
            retrievals_total,
            auth_rejections_total,
            swept_total,
            live_requests,
        })
    }

    pub fn record_created(&self) {
        self.requests_created_total.inc();
    }

    pub fn record_decision<T>(&self, decision: Decision, result: &Result<T, RegistryError>) {
        let decision = match decision {
            Decision::Approve => "approve",
            Decision::Deny => "deny",
        };
        self.decisions_total
            .with_label_values(&[decision, outcome_label(result)])
            .inc();
    }

    pub fn record_retrieval<T>(&self, result: &Result<T, RegistryError>) {
        self.retrievals_total
            .with_label_values(&[outcome_label(result)])
            .inc();
    }

    pub fn record_auth_rejection(&self, role: Role) {
        self.auth_rejections_total
            .with_label_values(&[role.as_str()])
            .inc();
    }

    pub fn record_swept(&self, removed: usize) {
        self.swept_total.inc_by(removed as u64);
    }

    pub fn set_live_requests(&self, live: usize) {
        self.live_requests.set(live as i64);
    }

    /// Encode all registered metrics as Prometheus text format.
    /// Called by the `/metrics` HTTP handler.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

fn outcome_label<T>(result: &Result<T, RegistryError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(RegistryError::BadId) => "bad_id",
        Err(RegistryError::NotFound) => "not_found",
        Err(RegistryError::Expired) => "expired",
        Err(RegistryError::NotApproved) => "not_approved",
    }
}

// ── Tests ─────────────────────────────────────────────────────
