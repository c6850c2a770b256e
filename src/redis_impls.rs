//! Concrete `LockStore` backed by Redis.

use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::{config::StoreConfig, error::CronError, traits::LockStore};

/// `LockStore` over a multiplexed Redis connection. Cloning is cheap; all
/// clones share the underlying connection, which reconnects on failure.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
    pub async fn connect(conf: &StoreConfig) -> Result<Self, CronError> {
        let client =
            redis::Client::open(conf.url()).map_err(|e| CronError::Store(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CronError::Store(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl LockStore for RedisLockStore {
    type Error = CronError;

    /// `SET key value NX PX ttl` in one atomic round trip; Redis replies OK
    /// when the key was set and nil when it already existed.
    async fn set_if_absent(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CronError> {
        let mut conn = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| CronError::Store(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: String) -> Result<(), CronError> {
        let mut conn = self.conn.clone();
        // DEL returns the number of keys removed; 0 (absent) is fine.
        let _removed: i64 = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CronError::Store(e.to_string()))?;
        Ok(())
    }
}
