use crate::infrastructure::http::controllers::{health, images};
use crate::infrastructure::http::middleware::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .route("/upload", post(images::upload_image))
        .route("/image", get(images::get_image))
        .route("/healthz/liveness", get(health::liveness))
        .route("/healthz/readiness", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
