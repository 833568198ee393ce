//! Storage error type.

/// Errors from the token store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A record could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A Redis connection could not be obtained from the pool.
    #[error("Redis pool error: {0}")]
    Pool(String),

    /// A Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StorageError {
    pub(crate) fn pool(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}
