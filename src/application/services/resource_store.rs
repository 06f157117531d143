use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::key_value_store::KeyValueStore;
use std::sync::Arc;

/// Persistence for the protected payload. Knows nothing about locking.
#[derive(Clone)]
pub struct ResourceStore {
    store: Arc<dyn KeyValueStore>,
}

impl ResourceStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Overwrite `key` with `bytes`, without expiry.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> DomainResult<()> {
        self.store.set(key, bytes, None).await
    }

    pub async fn get(&self, key: &str) -> DomainResult<Vec<u8>> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| DomainError::ResourceNotFound(key.to_string()))
    }

    pub async fn ping(&self) -> DomainResult<()> {
        self.store.ping().await
    }
}
