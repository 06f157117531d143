use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use std::time::Duration;

/// Single-key operations of the shared key-value store.
///
/// Implementations must make every operation atomic with respect to the key it
/// touches. Nothing here spans more than one key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Create `key` with `value` and expiry `ttl` only if it does not exist.
    /// Returns true iff this call created the key.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool>;

    /// Reset the remaining time to live of `key`. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> DomainResult<bool>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> DomainResult<()>;

    /// Unconditional write. `None` stores the value without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()>;

    /// Read `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>>;

    /// Delete `key` only while it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> DomainResult<bool>;

    /// Refresh the expiry of `key` only while it still holds `expected`.
    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> DomainResult<bool>;

    /// Round-trip to the backend.
    async fn ping(&self) -> DomainResult<()>;
}
