//! In-memory registry of access requests.
//!
//! Every operation runs inside one critical section over the entry map, so
//! the "exists → expired → state" checks of approve/deny/retrieve can never
//! interleave with each other or with the sweeper. The lock is a plain
//! `std::sync::Mutex` and is never held across an `.await`.
//!
//! ```text
//! Pending ──approve──> Approved
//!    │                    │
//!    └──deny / expiry─────┴──> removed (id is gone for good)
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::errors::RegistryError;
use crate::models::request::{Request, RequestState, RequestSummary};
use crate::models::request_id::RequestId;

pub struct Registry {
    entries: Mutex<HashMap<RequestId, Request>>,
    secret: Zeroizing<String>,
    timeout: Duration,
}

impl Registry {
    pub fn new(secret: Zeroizing<String>, timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            secret,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a new pending request and return its id.
    pub fn create(&self, requester: &str, source_addr: &str) -> RequestId {
        let id = RequestId::generate();
        let request = Request {
            requester: requester.to_string(),
            source_addr: source_addr.to_string(),
            state: RequestState::Pending,
            created_at: Instant::now(),
            requested_at: Utc::now(),
        };
        self.lock().insert(id, request);

        tracing::info!(
            request_id = %id,
            server_id = requester,
            source = source_addr,
            "access request registered"
        );
        id
    }

    /// Mark a request approved. Approving twice is a no-op.
    pub fn approve(&self, raw_id: &str) -> Result<RequestId, RegistryError> {
        let id = RequestId::parse(raw_id)?;
        let mut entries = self.lock();
        let request = self.live_entry(&mut entries, &id)?;
        request.state = RequestState::Approved;

        tracing::info!(request_id = %id, server_id = %request.requester, "request approved");
        Ok(id)
    }

    /// Remove a request regardless of its state.
    pub fn deny(&self, raw_id: &str) -> Result<RequestId, RegistryError> {
        let id = RequestId::parse(raw_id)?;
        let mut entries = self.lock();
        self.live_entry(&mut entries, &id)?;
        if let Some(request) = entries.remove(&id) {
            tracing::info!(request_id = %id, server_id = %request.requester, "request denied and removed");
        }
        Ok(id)
    }

    /// Release the secret for an approved request. The entry stays live so
    /// the caller may poll again until it expires or is denied.
    pub fn retrieve(&self, raw_id: &str) -> Result<&str, RegistryError> {
        let id = RequestId::parse(raw_id)?;
        let mut entries = self.lock();
        let request = self.live_entry(&mut entries, &id)?;
        match request.state {
            RequestState::Approved => {
                tracing::info!(request_id = %id, server_id = %request.requester, "secret released");
                Ok(self.secret.as_str())
            }
            RequestState::Pending => Err(RegistryError::NotApproved),
        }
    }

    /// Purge every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, request| !self.is_expired(request, now));
        before - entries.len()
    }

    /// Snapshot of unexpired entries, oldest first.
    pub fn list(&self) -> Vec<RequestSummary> {
        let now = Instant::now();
        let entries = self.lock();
        let mut summaries: Vec<_> = entries
            .iter()
            .filter(|(_, request)| !self.is_expired(request, now))
            .map(|(id, request)| {
                let age = now.saturating_duration_since(request.created_at);
                RequestSummary {
                    id: *id,
                    server_id: request.requester.clone(),
                    source_addr: request.source_addr.clone(),
                    status: request.state,
                    created_at: request.requested_at,
                    expires_in_secs: self.timeout.saturating_sub(age).as_secs(),
                }
            })
            .collect();
        drop(entries);

        summaries.sort_by_key(|s| (s.created_at, s.id));
        summaries
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a live entry, evicting it if it has outlived the timeout.
    fn live_entry<'a>(
        &self,
        entries: &'a mut HashMap<RequestId, Request>,
        id: &RequestId,
    ) -> Result<&'a mut Request, RegistryError> {
        let expired = match entries.get(id) {
            None => return Err(RegistryError::NotFound),
            Some(request) => self.is_expired(request, Instant::now()),
        };
        if expired {
            entries.remove(id);
            tracing::info!(request_id = %id, "request expired");
            return Err(RegistryError::Expired);
        }
        entries.get_mut(id).ok_or(RegistryError::NotFound)
    }

    fn is_expired(&self, request: &Request, now: Instant) -> bool {
        now.saturating_duration_since(request.created_at) > self.timeout
    }

    // Every critical section leaves the map consistent, so a panic in
    // another holder cannot have left it half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Request>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
