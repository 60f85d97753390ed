use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::request_id::RequestId;

/// Stored state of a live request. Denied and expired requests are removed
/// from the registry rather than kept in a terminal state.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Approved,
}

/// One access attempt, owned exclusively by the registry.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) requester: String,
    pub(crate) source_addr: String,
    pub(crate) state: RequestState,
    /// Monotonic creation time, the only input to expiry.
    pub(crate) created_at: Instant,
    /// Wall-clock creation time, for display only.
    pub(crate) requested_at: DateTime<Utc>,
}

/// Point-in-time copy of a live request for listings.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RequestSummary {
    pub id: RequestId,
    pub server_id: String,
    pub source_addr: String,
    pub status: RequestState,
    pub created_at: DateTime<Utc>,
    pub expires_in_secs: u64,
}
