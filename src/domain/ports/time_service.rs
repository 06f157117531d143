use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait TimeService: Send + Sync {
    async fn sleep(&self, duration: Duration);

    /// Monotonic timestamp used to measure lock wait time.
    fn now(&self) -> Instant;
}
