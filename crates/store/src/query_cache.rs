//! Query cache
//!
//! Stores serialized [`Query`] snapshots under a string key with a 24 h
//! TTL. The address cache keys by address hash, the user cache by
//! `addressHash:sessionId`; both run through this one implementation
//! against separate Redis instances. Writes are last-writer-wins.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use offerd_domain::Query;

use crate::error::Result;

/// Cache entries live for one day.
pub const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Key/value store for query snapshots.
///
/// `get` returns `Ok(None)` on a miss; real backend failures surface as
/// errors and are downgraded to misses by the caller.
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Query>>;
    async fn put(&self, key: &str, query: &Query) -> Result<()>;
}

/// Redis-backed query cache.
pub struct RedisQueryCache {
    connection: redis::aio::MultiplexedConnection,
    name: &'static str,
}

impl RedisQueryCache {
    /// Connect to one Redis instance and verify it answers.
    pub async fn connect(url: &str, name: &'static str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;

        let _: () = redis::cmd("PING").query_async(&mut connection).await?;
        info!(cache = name, "connected to redis");

        Ok(Self { connection, name })
    }
}

#[async_trait]
impl QueryCache for RedisQueryCache {
    async fn get(&self, key: &str) -> Result<Option<Query>> {
        let mut connection = self.connection.clone();
        let data: Option<Vec<u8>> = connection.get(key).await?;

        match data {
            None => Ok(None),
            Some(bytes) => {
                let query = serde_json::from_slice(&bytes)?;
                debug!(cache = self.name, key = %key, "cache hit");
                Ok(Some(query))
            }
        }
    }

    async fn put(&self, key: &str, query: &Query) -> Result<()> {
        let data = serde_json::to_vec(query)?;
        let mut connection = self.connection.clone();

        if let Err(e) = connection
            .set_ex::<_, _, ()>(key, data, CACHE_TTL_SECS)
            .await
        {
            warn!(cache = self.name, key = %key, error = %e, "failed to store query");
            return Err(e.into());
        }

        debug!(
            cache = self.name,
            key = %key,
            offers = query.offers.len(),
            "stored query"
        );
        Ok(())
    }
}
