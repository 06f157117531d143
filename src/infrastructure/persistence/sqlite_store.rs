use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::key_value_store::KeyValueStore;
use crate::infrastructure::persistence::Database;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::time::Duration;

/// [`KeyValueStore`] over the `kv_entries` table.
///
/// Expiry is stored as epoch milliseconds and enforced lazily: every read and
/// conditional write filters on `expires_at`, and `set_if_absent` takes over
/// rows whose lease has already run out.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    db: Database,
}

impl SqliteKeyValueStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Drop rows whose TTL has passed. Returns the number removed.
    pub async fn purge_expired(&self) -> DomainResult<u64> {
        let result =
            sqlx::query("DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(now_millis())
                .execute(&self.db.pool)
                .await
                .map_err(|e| db_error("purge expired entries", e))?;
        Ok(result.rows_affected())
    }

    /// Start a background task that runs [`Self::purge_expired`] every `period`.
    /// Expired rows are already invisible to readers; this only reclaims space.
    pub fn start_purge_task(&self, period: Duration) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Purged {} expired kv entries", n),
                    Err(e) => tracing::warn!("Failed to purge expired kv entries: {}", e),
                }
            }
        });
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(ttl: Duration) -> DomainResult<i64> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ms| now_millis().checked_add(ms.max(1)))
        .ok_or(DomainError::InvalidTtl(ttl))
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::StoreUnavailable(format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        let now = now_millis();

        // Insert, or take over the row only if the previous entry has expired.
        let query = r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            WHERE kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at < ?
        "#;

        let result = sqlx::query(query)
            .bind(key)
            .bind(value.to_vec())
            .bind(expiry_millis(ttl)?)
            .bind(now)
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("set entry if absent", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> DomainResult<bool> {
        let query = r#"
            UPDATE kv_entries SET expires_at = ?
            WHERE key = ? AND (expires_at IS NULL OR expires_at >= ?)
        "#;

        let result = sqlx::query(query)
            .bind(expiry_millis(ttl)?)
            .bind(key)
            .bind(now_millis())
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("refresh entry expiry", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("delete entry", e))?;
        Ok(())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        let query = r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
        "#;

        sqlx::query(query)
            .bind(key)
            .bind(value.to_vec())
            .bind(ttl.map(expiry_millis).transpose()?)
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("write entry", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        let row = sqlx::query(
            "SELECT value FROM kv_entries WHERE key = ? AND (expires_at IS NULL OR expires_at >= ?)",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.db.pool)
        .await
        .map_err(|e| db_error("read entry", e))?;

        row.map(|row| row.try_get::<Vec<u8>, _>("value"))
            .transpose()
            .map_err(|e| db_error("decode entry", e))
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        let query = r#"
            DELETE FROM kv_entries
            WHERE key = ? AND value = ? AND (expires_at IS NULL OR expires_at >= ?)
        "#;

        let result = sqlx::query(query)
            .bind(key)
            .bind(expected.to_vec())
            .bind(now_millis())
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("conditionally delete entry", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> DomainResult<bool> {
        let query = r#"
            UPDATE kv_entries SET expires_at = ?
            WHERE key = ? AND value = ? AND (expires_at IS NULL OR expires_at >= ?)
        "#;

        let result = sqlx::query(query)
            .bind(expiry_millis(ttl)?)
            .bind(key)
            .bind(expected.to_vec())
            .bind(now_millis())
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("conditionally refresh entry expiry", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> DomainResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db.pool)
            .await
            .map_err(|e| db_error("ping database", e))?;
        Ok(())
    }
}
