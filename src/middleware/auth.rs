//! Role-scoped bearer-token gate.
//!
//! One [`AuthGate`] per role (approver, requester). The expected secret is
//! kept only as a SHA-256 digest, and presented credentials are digested the
//! same way before a `subtle` constant-time compare, so the comparison always
//! runs over 32 bytes whatever the caller sent.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AuthError};
use crate::middleware::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Approver,
    Requester,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Approver => "approver",
            Role::Requester => "requester",
        }
    }
}

pub struct AuthGate {
    role: Role,
    expected: [u8; 32],
}

impl AuthGate {
    pub fn new(role: Role, secret: &str) -> Self {
        Self {
            role,
            expected: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Check a presented credential. `None` is always rejected.
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        self.check(presented).is_ok()
    }

    fn check(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let presented = presented.ok_or(AuthError::MissingCredential)?;
        let digest: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        if bool::from(digest[..].ct_eq(&self.expected[..])) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("role", &self.role)
            .field("expected", &"<redacted>")
            .finish()
    }
}

/// Shared state for [`require_role`]: the gate plus the metrics it reports to.
#[derive(Clone)]
pub struct GateLayer {
    pub gate: Arc<AuthGate>,
    pub metrics: Arc<Metrics>,
}

/// Middleware: only lets the request through if `Authorization: Bearer <secret>`
/// matches the gate's role secret.
pub async fn require_role(State(layer): State<GateLayer>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")).unwrap_or(""));

    match layer.gate.check(presented) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            // never log the presented value
            tracing::warn!(role = layer.gate.role().as_str(), "rejected: {}", e);
            layer.metrics.record_auth_rejection(layer.gate.role());
            AppError::from(e).into_response()
        }
    }
}
