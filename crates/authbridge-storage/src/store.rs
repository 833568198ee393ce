//! Token store backends: local DashMap and Redis.

use std::sync::Arc;

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::StorageError;
use crate::record::TokenRecord;

/// Key prefix for records in Redis, to keep the keyspace shareable.
const KEY_PREFIX: &str = "authbridge:token:";

/// Token store keyed by external user id.
///
/// ## Modes
///
/// - **Memory**: Single-instance mode backed by a DashMap
/// - **Redis**: Multi-instance mode backed by a Redis pool
///
/// Unlike a cache, the store is the source of truth for issued tokens, so
/// Redis writes are awaited and write failures surface to the caller.
/// Expiry is judged at read time; an expired record is removed and reads
/// as absent.
#[derive(Clone)]
pub enum TokenStore {
    /// Single-instance: local DashMap only.
    Memory(Arc<DashMap<String, TokenRecord>>),

    /// Multi-instance: Redis.
    Redis(Pool),
}

impl TokenStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new_memory() -> Self {
        TokenStore::Memory(Arc::new(DashMap::new()))
    }

    /// Creates a new Redis-backed store.
    #[must_use]
    pub fn new_redis(pool: Pool) -> Self {
        TokenStore::Redis(pool)
    }

    /// Stores a record under the given user id, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be serialized or the Redis
    /// write fails.
    pub async fn put(&self, user_id: &str, record: TokenRecord) -> Result<(), StorageError> {
        match self {
            TokenStore::Memory(map) => {
                map.insert(user_id.to_string(), record);
                Ok(())
            }
            TokenStore::Redis(pool) => {
                let payload = serde_json::to_string(&record)?;
                let mut conn = pool.get().await.map_err(StorageError::pool)?;
                let key = format!("{KEY_PREFIX}{user_id}");
                // Let Redis reap expired records too; read-time expiry still
                // applies for clock skew between instances.
                if record.expires_in > 0 {
                    conn.set_ex::<_, _, ()>(&key, payload, record.expires_in)
                        .await?;
                } else {
                    conn.set::<_, _, ()>(&key, payload).await?;
                }
                tracing::debug!(user_id = %user_id, "token record stored");
                Ok(())
            }
        }
    }

    /// Fetches the record for a user id.
    ///
    /// Expired records are removed and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the Redis read fails or a stored payload
    /// cannot be decoded.
    pub async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StorageError> {
        let record = match self {
            TokenStore::Memory(map) => map.get(user_id).map(|entry| entry.value().clone()),
            TokenStore::Redis(pool) => {
                let mut conn = pool.get().await.map_err(StorageError::pool)?;
                let key = format!("{KEY_PREFIX}{user_id}");
                let payload: Option<String> = conn.get(&key).await?;
                match payload {
                    Some(payload) => Some(serde_json::from_str(&payload)?),
                    None => None,
                }
            }
        };

        match record {
            Some(record) if record.is_expired() => {
                tracing::debug!(user_id = %user_id, "stored token expired, removing");
                self.remove(user_id).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Removes the record for a user id, if present.
    ///
    /// # Errors
    ///
    /// Returns an error when the Redis delete fails.
    pub async fn remove(&self, user_id: &str) -> Result<(), StorageError> {
        match self {
            TokenStore::Memory(map) => {
                map.remove(user_id);
                Ok(())
            }
            TokenStore::Redis(pool) => {
                let mut conn = pool.get().await.map_err(StorageError::pool)?;
                conn.del::<_, ()>(format!("{KEY_PREFIX}{user_id}")).await?;
                Ok(())
            }
        }
    }
}
