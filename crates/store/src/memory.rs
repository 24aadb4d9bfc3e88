//! In-memory store implementations
//!
//! Mutex-guarded maps with the same trait surface as the Redis and
//! MongoDB backends. Used by pipeline and API tests; TTL handling is
//! deliberately absent since tests never outlive it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use offerd_domain::Query;

use crate::error::Result;
use crate::query_cache::QueryCache;
use crate::share::{QueryEntity, ShareRepository};

/// In-memory [`QueryCache`].
#[derive(Default)]
pub struct MemoryQueryCache {
    entries: Mutex<HashMap<String, Query>>,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries (test assertions).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn get(&self, key: &str) -> Result<Option<Query>> {
        Ok(self.entries.lock().expect("cache lock").get(key).cloned())
    }

    async fn put(&self, key: &str, query: &Query) -> Result<()> {
        self.entries
            .lock()
            .expect("cache lock")
            .insert(key.to_string(), query.clone());
        Ok(())
    }
}

/// In-memory [`ShareRepository`].
#[derive(Default)]
pub struct MemoryShareRepository {
    entries: Mutex<HashMap<String, QueryEntity>>,
}

impl MemoryShareRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots (test assertions).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("share lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ShareRepository for MemoryShareRepository {
    async fn exists(&self, share_id: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .expect("share lock")
            .contains_key(share_id))
    }

    async fn insert(&self, entity: &QueryEntity) -> Result<()> {
        self.entries
            .lock()
            .expect("share lock")
            .insert(entity.share_id.clone(), entity.clone());
        Ok(())
    }

    async fn get(&self, share_id: &str) -> Result<Option<Query>> {
        Ok(self
            .entries
            .lock()
            .expect("share lock")
            .get(share_id)
            .map(|entity| entity.query.clone()))
    }
}
