//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the cache and share-store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// MongoDB command or connection error
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// A cached value could not be (de)serialized
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
