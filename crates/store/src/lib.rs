//! Persistence layer
//!
//! Two Redis-backed query caches (one shared per address, one per
//! session) and a MongoDB-backed share store holding immutable query
//! snapshots. Both backends sit behind traits so the pipeline and the
//! API can be exercised against in-memory implementations in tests.

mod error;
mod memory;
mod query_cache;
mod share;

pub use error::{Result, StoreError};
pub use memory::{MemoryQueryCache, MemoryShareRepository};
pub use query_cache::{QueryCache, RedisQueryCache, CACHE_TTL_SECS};
pub use share::{MongoShareRepository, QueryEntity, ShareRepository};
