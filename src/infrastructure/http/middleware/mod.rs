pub mod error;

pub use error::{ApiError, ApiResult};

use crate::application::services::UploadOrchestrator;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
    pub started_at: Instant,
    pub max_upload_bytes: usize,
    /// Prometheus recorder handle, absent when no recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(orchestrator: UploadOrchestrator, max_upload_bytes: usize) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            started_at: Instant::now(),
            max_upload_bytes,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
