use crate::domain::entities::{Lease, LockSettings, WaitAttempt};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::key_value_store::KeyValueStore;
use crate::domain::ports::time_service::TimeService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counts reported by a finished renewal loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalOutcome {
    pub refreshed: u32,
    pub failed: u32,
    pub lost: bool,
}

/// Lease-based mutual exclusion over a shared [`KeyValueStore`].
///
/// Mutual exclusion comes entirely from the store's atomic set-if-absent.
/// Each acquisition writes a fresh owner token as the lease value, and both
/// renewal and release are conditional on that token, so a holder whose lease
/// already expired cannot extend or evict somebody else's lease.
#[derive(Clone)]
pub struct LeaseMutex {
    store: Arc<dyn KeyValueStore>,
    time: Arc<dyn TimeService>,
}

impl LeaseMutex {
    pub fn new(store: Arc<dyn KeyValueStore>, time: Arc<dyn TimeService>) -> Self {
        Self { store, time }
    }

    /// Single set-if-absent attempt.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> DomainResult<Option<Lease>> {
        let lease = Lease::new(key, ttl);
        metrics::counter!("lock_acquire_attempts_total").increment(1);

        if self
            .store
            .set_if_absent(key, lease.token.as_bytes(), ttl)
            .await?
        {
            metrics::counter!("lock_acquired_total").increment(1);
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }

    /// Poll until the lock is acquired or `settings.max_wait` has elapsed.
    ///
    /// Store errors are logged and retried like contention. When the wait runs
    /// out and the last attempt failed on the store rather than on contention,
    /// the store error is returned instead of `LockTimeout`.
    pub async fn acquire(&self, key: &str, settings: &LockSettings) -> DomainResult<LeaseGuard> {
        let mut wait = WaitAttempt::start(self.time.now(), settings);

        loop {
            wait.attempts += 1;

            let last_error = match self.try_acquire(key, settings.ttl).await {
                Ok(Some(lease)) => {
                    tracing::debug!(
                        "Acquired lock {} after {} attempt(s) in {:?}",
                        key,
                        wait.attempts,
                        wait.elapsed(self.time.now())
                    );
                    return Ok(LeaseGuard::new(self.clone(), lease));
                }
                Ok(None) => {
                    tracing::info!("Lock {} is held, waiting...", key);
                    None
                }
                Err(e) => {
                    tracing::warn!("Error acquiring lock {}: {}", key, e);
                    Some(e)
                }
            };

            let now = self.time.now();
            if wait.is_expired(now) {
                let waited = wait.elapsed(now);
                return Err(match last_error {
                    Some(err @ DomainError::StoreUnavailable(_)) => err,
                    _ => {
                        metrics::counter!("lock_timeouts_total").increment(1);
                        tracing::warn!(
                            "Gave up on lock {} after {} attempt(s) in {:?}",
                            key,
                            wait.attempts,
                            waited
                        );
                        DomainError::LockTimeout {
                            key: key.to_string(),
                            waited,
                        }
                    }
                });
            }

            self.time.sleep(wait.next_sleep(now)).await;
        }
    }

    /// Delete the lease only if it still carries our token.
    /// Returns false when the lease had already expired or changed hands.
    pub async fn release(&self, lease: &Lease) -> DomainResult<bool> {
        let released = self
            .store
            .compare_and_delete(&lease.key, lease.token.as_bytes())
            .await?;

        if !released {
            tracing::warn!(
                "Lock {} no longer held by this owner at release, leaving it alone",
                lease.key
            );
        }
        Ok(released)
    }

    /// Unconditional, idempotent delete of `key`. Evicts whichever holder is current.
    pub async fn force_release(&self, key: &str) -> DomainResult<()> {
        tracing::warn!("Force releasing lock {}", key);
        self.store.delete(key).await
    }

    /// Refresh the lease every `ttl / 2` until `stop` is cancelled.
    ///
    /// Store errors are logged and the loop keeps going. The loop ends early
    /// only when the store reports the lease is no longer ours.
    pub async fn renew(&self, lease: &Lease, stop: CancellationToken) -> RenewalOutcome {
        let mut outcome = RenewalOutcome::default();
        let mut ticker = tokio::time::interval(lease.renewal_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the lease was just written.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return outcome,
                _ = ticker.tick() => {}
            }

            match self
                .store
                .compare_and_expire(&lease.key, lease.token.as_bytes(), lease.ttl)
                .await
            {
                Ok(true) => {
                    outcome.refreshed += 1;
                    metrics::counter!("lock_renewals_total").increment(1);
                    tracing::trace!("Renewed lock {} for {:?}", lease.key, lease.ttl);
                }
                Ok(false) => {
                    outcome.lost = true;
                    tracing::warn!(
                        "Lock {} expired or changed hands while held, stopping renewal",
                        lease.key
                    );
                    return outcome;
                }
                Err(e) => {
                    outcome.failed += 1;
                    metrics::counter!("lock_renewal_failures_total").increment(1);
                    tracing::warn!("Failed to renew lock {}: {}", lease.key, e);
                }
            }
        }
    }
}

struct RenewalTask {
    stop: CancellationToken,
    handle: JoinHandle<RenewalOutcome>,
}

/// Scoped ownership of an acquired lease.
///
/// Call [`LeaseGuard::release`] on every path. A guard dropped without it
/// still stops renewal and schedules a conditional release on the runtime.
pub struct LeaseGuard {
    mutex: LeaseMutex,
    lease: Lease,
    renewal: Option<RenewalTask>,
    lost: Arc<AtomicBool>,
    released: bool,
}

impl LeaseGuard {
    fn new(mutex: LeaseMutex, lease: Lease) -> Self {
        Self {
            mutex,
            lease,
            renewal: None,
            lost: Arc::new(AtomicBool::new(false)),
            released: false,
        }
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// True once renewal observed that the lease is no longer ours.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Spawn the background renewal loop. Calling it twice is a no-op.
    pub fn start_renewal(&mut self) {
        if self.renewal.is_some() {
            return;
        }

        let stop = CancellationToken::new();
        let mutex = self.mutex.clone();
        let lease = self.lease.clone();
        let lost = self.lost.clone();
        let task_stop = stop.clone();

        let handle = tokio::spawn(async move {
            let outcome = mutex.renew(&lease, task_stop).await;
            if outcome.lost {
                lost.store(true, Ordering::SeqCst);
            }
            outcome
        });

        self.renewal = Some(RenewalTask { stop, handle });
    }

    /// Stop renewal and wait for the loop to exit.
    pub async fn stop_renewal(&mut self) -> Option<RenewalOutcome> {
        let task = self.renewal.take()?;
        task.stop.cancel();
        match task.handle.await {
            Ok(outcome) => {
                if outcome.lost {
                    self.lost.store(true, Ordering::SeqCst);
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("Renewal task for lock {} failed: {}", self.lease.key, e);
                None
            }
        }
    }

    /// Stop renewal, then release the lease unless it is known to be lost.
    /// Returns whether the lease was deleted by this call.
    ///
    /// `released` is only set once the store call has returned, so a release
    /// future dropped at either await still falls back to the `Drop` path.
    pub async fn release(mut self) -> DomainResult<bool> {
        self.stop_renewal().await;

        if self.is_lost() {
            self.released = true;
            tracing::warn!(
                "Skipping release of lock {}: ownership was lost during the critical section",
                self.lease.key
            );
            return Ok(false);
        }

        let result = self.mutex.release(&self.lease).await;
        self.released = true;
        result
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        if let Some(task) = self.renewal.take() {
            task.stop.cancel();
        }

        if self.is_lost() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let mutex = self.mutex.clone();
                let lease = self.lease.clone();
                tracing::warn!("Lock guard for {} dropped without release", lease.key);
                handle.spawn(async move {
                    if let Err(e) = mutex.release(&lease).await {
                        tracing::error!("Deferred release of lock {} failed: {}", lease.key, e);
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    "Lock guard for {} dropped outside a runtime, lease left to expire",
                    self.lease.key
                );
            }
        }
    }
}
