use crate::application::services::lease_mutex::{LeaseMutex, RenewalOutcome};
use crate::application::services::resource_store::ResourceStore;
use crate::domain::entities::{LockSettings, UploadPhase};
use crate::domain::errors::{DomainError, DomainResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Summary of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub bytes: usize,
    pub waited: Duration,
    pub renewal: Option<RenewalOutcome>,
    pub released: bool,
}

/// Serializes writers of the protected resource behind one lease.
///
/// Per request: `Waiting -> LockHeld -> Renewing -> Writing -> Released`, or
/// `Waiting -> TimedOut`. Once the lock is held it is released on every exit
/// path, whether reading the payload or writing it failed.
#[derive(Clone)]
pub struct UploadOrchestrator {
    mutex: LeaseMutex,
    resources: ResourceStore,
    lock_key: String,
    resource_key: String,
    settings: LockSettings,
}

impl UploadOrchestrator {
    pub fn new(
        mutex: LeaseMutex,
        resources: ResourceStore,
        lock_key: impl Into<String>,
        resource_key: impl Into<String>,
        settings: LockSettings,
    ) -> Self {
        Self {
            mutex,
            resources,
            lock_key: lock_key.into(),
            resource_key: resource_key.into(),
            settings,
        }
    }

    /// Acquire the lock, then drive `payload` to completion and persist it.
    ///
    /// `payload` is not polled until the lock is held, so request bodies are
    /// buffered inside the critical section.
    pub async fn upload<P>(&self, payload: P) -> DomainResult<UploadReport>
    where
        P: Future<Output = DomainResult<Vec<u8>>>,
    {
        let started = Instant::now();
        self.enter(UploadPhase::Waiting);

        let mut guard = match self.mutex.acquire(&self.lock_key, &self.settings).await {
            Ok(guard) => guard,
            Err(e) => {
                if matches!(e, DomainError::LockTimeout { .. }) {
                    self.enter(UploadPhase::TimedOut);
                }
                return Err(e);
            }
        };
        let waited = started.elapsed();
        self.enter(UploadPhase::LockHeld);

        guard.start_renewal();
        self.enter(UploadPhase::Renewing);

        let written = self.write(payload).await;

        let renewal = guard.stop_renewal().await;
        if guard.is_lost() {
            tracing::error!(
                "Lease {} was lost before the upload finished; another writer may have overlapped",
                self.lock_key
            );
        }
        let released = match guard.release().await {
            Ok(released) => released,
            Err(e) => {
                tracing::error!("Failed to release lock {}: {}", self.lock_key, e);
                false
            }
        };
        self.enter(UploadPhase::Released);

        let bytes = written?;
        metrics::counter!("uploads_total").increment(1);
        tracing::info!(
            "Stored {} bytes under {} after waiting {:?}",
            bytes,
            self.resource_key,
            waited
        );

        Ok(UploadReport {
            bytes,
            waited,
            renewal,
            released,
        })
    }

    /// Read path. Never touches the lock.
    pub async fn fetch(&self) -> DomainResult<Vec<u8>> {
        self.resources.get(&self.resource_key).await
    }

    /// Round-trip to the backing store.
    pub async fn check_store(&self) -> DomainResult<()> {
        self.resources.ping().await
    }

    async fn write<P>(&self, payload: P) -> DomainResult<usize>
    where
        P: Future<Output = DomainResult<Vec<u8>>>,
    {
        let bytes = payload.await?;
        self.enter(UploadPhase::Writing);
        self.resources.put(&self.resource_key, &bytes).await?;
        Ok(bytes.len())
    }

    fn enter(&self, phase: UploadPhase) {
        tracing::debug!(lock = %self.lock_key, phase = %phase, "Upload phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::key_value_store::KeyValueStore;
    use crate::infrastructure::persistence::InMemoryKeyValueStore;
    use crate::infrastructure::runtime::tokio::TokioTimeService;
    use std::sync::Arc;

    fn orchestrator(store: Arc<InMemoryKeyValueStore>) -> UploadOrchestrator {
        let mutex = LeaseMutex::new(store.clone(), Arc::new(TokioTimeService::new()));
        UploadOrchestrator::new(
            mutex,
            ResourceStore::new(store),
            "test:image-upload-mutex",
            "test:uploaded-image",
            LockSettings::new(
                Duration::from_secs(30),
                Duration::from_secs(5),
                Duration::from_secs(1),
            ),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_persists_and_releases() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let orchestrator = orchestrator(store.clone());

        let report = orchestrator
            .upload(async { Ok(vec![0x01, 0x02, 0x03]) })
            .await
            .unwrap();

        assert_eq!(report.bytes, 3);
        assert!(report.released);
        assert_eq!(orchestrator.fetch().await.unwrap(), vec![0x01, 0x02, 0x03]);
        assert!(store.get_raw("test:image-upload-mutex").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_error_still_releases_lock() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let orchestrator = orchestrator(store.clone());

        let result = orchestrator
            .upload(async { Err(DomainError::PayloadMissing("image".to_string())) })
            .await;

        assert_eq!(
            result.unwrap_err(),
            DomainError::PayloadMissing("image".to_string())
        );
        assert!(store.get_raw("test:image-upload-mutex").await.is_none());
        assert!(matches!(
            orchestrator.fetch().await,
            Err(DomainError::ResourceNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_existing_lease_untouched() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let orchestrator = orchestrator(store.clone());
        store
            .set_if_absent(
                "test:image-upload-mutex",
                b"other-instance",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let result = orchestrator.upload(async { Ok(vec![9]) }).await;

        match result {
            Err(DomainError::LockTimeout { waited, .. }) => {
                assert!(waited >= Duration::from_secs(5));
                assert!(waited < Duration::from_secs(6));
            }
            other => panic!("expected LockTimeout, got {:?}", other),
        }
        assert_eq!(
            store.get_raw("test:image-upload-mutex").await.unwrap(),
            b"other-instance"
        );
    }
}
