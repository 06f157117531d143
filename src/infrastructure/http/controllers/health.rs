use crate::infrastructure::http::middleware::AppState;
use axum::extract::State;

/// GET /healthz/liveness
pub async fn liveness() -> &'static str {
    "ok"
}

/// GET /healthz/readiness - Always ready; an unreachable store is only logged
/// since acquire already retries through store outages.
pub async fn readiness(State(state): State<AppState>) -> &'static str {
    if let Err(e) = state.orchestrator.check_store().await {
        tracing::warn!("Readiness check could not reach the store: {}", e);
    }
    "ok"
}

/// GET /metrics - Uptime followed by the Prometheus exposition, if installed
pub async fn metrics(State(state): State<AppState>) -> String {
    let mut body = format!(
        "uptime: {:?}\nmutex: ok\n",
        state.started_at.elapsed()
    );

    if let Some(handle) = &state.metrics {
        body.push_str(&handle.render());
    }

    body
}
