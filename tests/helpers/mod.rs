#![allow(dead_code)]

pub mod test_db;

use async_trait::async_trait;
use imgmutex::domain::errors::{DomainError, DomainResult};
use imgmutex::domain::ports::key_value_store::KeyValueStore;
use imgmutex::infrastructure::persistence::InMemoryKeyValueStore;
use imgmutex::infrastructure::runtime::tokio::TokioTimeService;
use imgmutex::{Config, LeaseMutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BOUNDARY: &str = "imgmutex-test-boundary";

pub fn memory_mutex() -> (Arc<InMemoryKeyValueStore>, LeaseMutex) {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let mutex = LeaseMutex::new(store.clone(), Arc::new(TokioTimeService::new()));
    (store, mutex)
}

/// Config for the memory backend with the given overrides.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: Vec<(String, String)> = vec![
        ("STORE_BACKEND".into(), "memory".into()),
        ("IMAGE_PATH".into(), "test".into()),
    ];
    vars.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    Config::from_lookup(|key| {
        vars.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("test config should parse")
}

/// multipart/form-data body with a single file field.
pub fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"upload.jpg\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Store wrapper counting conditional refreshes.
pub struct CountingStore {
    inner: Arc<InMemoryKeyValueStore>,
    refreshes: AtomicU32,
}

impl CountingStore {
    pub fn new(inner: Arc<InMemoryKeyValueStore>) -> Self {
        Self {
            inner,
            refreshes: AtomicU32::new(0),
        }
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> DomainResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.inner.delete(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> DomainResult<bool> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.inner.compare_and_expire(key, expected, ttl).await
    }

    async fn ping(&self) -> DomainResult<()> {
        self.inner.ping().await
    }
}

/// Store wrapper whose unconditional `set` always fails. Lock operations pass
/// through, so a writer gets the lease and then fails while persisting.
pub struct FailingWriteStore {
    inner: Arc<InMemoryKeyValueStore>,
}

impl FailingWriteStore {
    pub fn new(inner: Arc<InMemoryKeyValueStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl KeyValueStore for FailingWriteStore {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> DomainResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.inner.delete(key).await
    }

    async fn set(&self, key: &str, _value: &[u8], _ttl: Option<Duration>) -> DomainResult<()> {
        Err(DomainError::StoreUnavailable(format!("write to {} refused", key)))
    }

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> DomainResult<bool> {
        self.inner.compare_and_expire(key, expected, ttl).await
    }

    async fn ping(&self) -> DomainResult<()> {
        self.inner.ping().await
    }
}
