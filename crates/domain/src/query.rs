//! Query snapshot
//!
//! A `Query` is everything one request produced for one address: the
//! deduplicated offer set keyed by offer hash, the address, the request
//! timestamp and the session. Both caches and the share store persist
//! serialized queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Address, Offer};

/// Snapshot of all offers returned for a specific address at a specific
/// time.
///
/// Offers are keyed by their content hash, which enforces per-hash
/// deduplication inside a query. `BTreeMap` keeps serialization (and
/// therefore share-id derivation) deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub offers: BTreeMap<String, Offer>,
    pub address: Address,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub session_id: String,
    #[serde(default)]
    pub address_hash: String,
}

impl Query {
    /// Create an empty query for an address; the address hash is derived
    /// immediately so cache keys are always available.
    pub fn new(address: Address, timestamp: i64, session_id: impl Into<String>) -> Self {
        let address_hash = address.hash();
        Self {
            offers: BTreeMap::new(),
            address,
            timestamp,
            session_id: session_id.into(),
            address_hash,
        }
    }

    /// Cache key for the per-session user cache.
    pub fn user_cache_key(&self) -> String {
        format!("{}:{}", self.address_hash, self.session_id)
    }
}
