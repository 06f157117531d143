use std::time::Duration;
use tokio::time::Instant;

/// Timing parameters for one named lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub ttl: Duration,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl LockSettings {
    pub fn new(ttl: Duration, max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            ttl,
            max_wait,
            poll_interval,
        }
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Per-request wait bookkeeping for an acquire loop. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct WaitAttempt {
    pub started_at: Instant,
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub attempts: u32,
}

impl WaitAttempt {
    pub fn start(now: Instant, settings: &LockSettings) -> Self {
        Self {
            started_at: now,
            max_wait: settings.max_wait,
            poll_interval: settings.poll_interval,
            attempts: 0,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.max_wait
    }

    /// Sleep before the next attempt, clipped so the loop never overshoots `max_wait`.
    pub fn next_sleep(&self, now: Instant) -> Duration {
        self.poll_interval
            .min(self.max_wait.saturating_sub(self.elapsed(now)))
    }
}

/// A lease currently believed to be held by this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    /// Per-acquisition owner token, stored as the lease value.
    pub token: String,
    pub ttl: Duration,
}

impl Lease {
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            token: uuid::Uuid::new_v4().to_string(),
            ttl,
        }
    }

    /// Period of the background refresh: half the TTL, never zero.
    pub fn renewal_interval(&self) -> Duration {
        (self.ttl / 2).max(Duration::from_millis(1))
    }
}

/// Phases of a single write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Waiting,
    LockHeld,
    Renewing,
    Writing,
    Released,
    TimedOut,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPhase::Waiting => "waiting",
            UploadPhase::LockHeld => "lock_held",
            UploadPhase::Renewing => "renewing",
            UploadPhase::Writing => "writing",
            UploadPhase::Released => "released",
            UploadPhase::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
