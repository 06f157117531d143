use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::key_value_store::KeyValueStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

const COMPARE_AND_EXPIRE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

/// [`KeyValueStore`] backed by a redis server.
///
/// Uses a [`ConnectionManager`], which reconnects on its own after transport
/// failures; clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl RedisKeyValueStore {
    pub async fn connect(url: &str) -> DomainResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| DomainError::StoreUnavailable(format!("Invalid redis url: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            DomainError::StoreUnavailable(format!("Failed to connect to redis: {}", e))
        })?;

        tracing::info!("Connected to redis");

        Ok(Self {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE),
        })
    }
}

fn ttl_millis(ttl: Duration) -> DomainResult<u64> {
    // PX accepts a signed 64-bit millisecond count
    u64::try_from(ttl.as_millis())
        .ok()
        .filter(|ms| *ms <= i64::MAX as u64)
        .map(|ms| ms.max(1))
        .ok_or(DomainError::InvalidTtl(ttl))
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("SET NX {} failed: {}", key, e)))?;

        Ok(reply.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> DomainResult<bool> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("PEXPIRE {} failed: {}", key, e)))?;

        Ok(updated == 1)
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("DEL {} failed: {}", key, e)))?;
        Ok(())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl)?);
        }

        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("SET {} failed: {}", key, e)))
    }

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("GET {} failed: {}", key, e)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::StoreUnavailable(format!("Conditional DEL {} failed: {}", key, e))
            })?;

        Ok(deleted == 1)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> DomainResult<bool> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .compare_and_expire
            .key(key)
            .arg(expected)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::StoreUnavailable(format!("Conditional PEXPIRE {} failed: {}", key, e))
            })?;

        Ok(updated == 1)
    }

    async fn ping(&self) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("PING failed: {}", e)))?;
        Ok(())
    }
}
