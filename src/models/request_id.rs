//! Opaque request identifiers.
//!
//! Ids are random UUIDv4 values drawn from the OS CSPRNG. Anything a caller
//! sends back is parsed before it gets anywhere near the registry, so a
//! malformed id is reported as [`RegistryError::BadId`] rather than
//! `NotFound`.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a fresh id from 128 bits of OS randomness (v4 version and
    /// variant bits stamped over six of them).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Validate caller-supplied text. Hyphenated, simple, braced and URN
    /// forms are accepted and all name the same id.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        Uuid::try_parse(raw.trim())
            .map(Self)
            .map_err(|_| RegistryError::BadId)
    }
}

impl FromStr for RequestId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}
