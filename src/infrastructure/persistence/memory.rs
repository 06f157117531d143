use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::key_value_store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    /// An entry stays live through its expiry instant, like redis.
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at >= now)
    }
}

/// Process-local store with TTL semantics.
///
/// Expiry uses the tokio clock, so paused-time tests can fast-forward leases.
/// `set_unavailable(true)` makes every call fail as if the backend were down.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Live value of `key`, bypassing the availability switch.
    pub async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    fn check_available(&self) -> DomainResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::StoreUnavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }

    async fn live_entries(&self) -> tokio::sync::MutexGuard<'_, HashMap<String, Entry>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        entries
    }
}

fn deadline(ttl: Duration) -> DomainResult<Instant> {
    Instant::now()
        .checked_add(ttl)
        .ok_or(DomainError::InvalidTtl(ttl))
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        self.check_available()?;
        let mut entries = self.live_entries().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(deadline(ttl)?),
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> DomainResult<bool> {
        self.check_available()?;
        let mut entries = self.live_entries().await;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline(ttl)?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.check_available()?;
        self.live_entries().await.remove(key);
        Ok(())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        self.check_available()?;
        let expires_at = ttl.map(deadline).transpose()?;
        self.live_entries().await.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.live_entries().await.get(key).map(|e| e.value.clone()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        self.check_available()?;
        let mut entries = self.live_entries().await;
        if entries.get(key).is_some_and(|e| e.value == expected) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> DomainResult<bool> {
        self.check_available()?;
        let mut entries = self.live_entries().await;
        match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Some(deadline(ttl)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> DomainResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_expiry() {
        let store = InMemoryKeyValueStore::new();
        let ttl = Duration::from_secs(2);

        assert!(store.set_if_absent("k", b"a", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", b"b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.set_if_absent("k", b"b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(store.set_if_absent("k", b"b", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends_live_key_only() {
        let store = InMemoryKeyValueStore::new();
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());

        store
            .set_if_absent("k", b"a", Duration::from_secs(2))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.expire("k", Duration::from_secs(2)).await.unwrap());
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_without_ttl_never_expires() {
        let store = InMemoryKeyValueStore::new();
        store.set("image", &[1, 2, 3], None).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(store.get("image").await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_compare_operations_check_value() {
        let store = InMemoryKeyValueStore::new();
        let ttl = Duration::from_secs(5);
        store.set_if_absent("k", b"mine", ttl).await.unwrap();

        assert!(!store.compare_and_expire("k", b"theirs", ttl).await.unwrap());
        assert!(!store.compare_and_delete("k", b"theirs").await.unwrap());
        assert!(store.compare_and_expire("k", b"mine", ttl).await.unwrap());
        assert!(store.compare_and_delete("k", b"mine").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryKeyValueStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.get("k").await,
            Err(DomainError::StoreUnavailable(_))
        ));
        assert!(store.ping().await.is_err());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let store = InMemoryKeyValueStore::new();

        assert_eq!(
            store.set_if_absent("k", b"a", Duration::MAX).await,
            Err(DomainError::InvalidTtl(Duration::MAX))
        );
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set("k", b"a", Some(Duration::MAX)).await.is_err());
    }
}
