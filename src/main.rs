use imgmutex::bootstrap;
use imgmutex::config::Config;
use imgmutex::infrastructure::http::router::build_router;
use imgmutex::infrastructure::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Invalid configuration aborts startup before anything else runs
    let config = Config::from_env()?;

    let telemetry = observability::init(&config)?;
    tracing::info!("Service configuration loaded successfully");

    let mut state = bootstrap::build_app_state(&config).await?;
    if let Some(handle) = telemetry.metrics_handle() {
        state = state.with_metrics(handle);
    }

    let app = build_router(state);

    let addr = config.server_address();
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
