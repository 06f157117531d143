use crate::application::services::{LeaseMutex, ResourceStore, UploadOrchestrator};
use crate::config::{Config, StoreBackend};
use crate::domain::ports::key_value_store::KeyValueStore;
use crate::domain::ports::time_service::TimeService;
use crate::infrastructure::http::middleware::AppState;
use crate::infrastructure::persistence::{
    Database, InMemoryKeyValueStore, RedisKeyValueStore, SqliteKeyValueStore,
};
use crate::infrastructure::runtime::tokio::TokioTimeService;
use std::sync::Arc;
use std::time::Duration;

const SQLITE_PURGE_PERIOD: Duration = Duration::from_secs(60);

/// Connect the configured key-value backend.
pub async fn connect_store(
    config: &Config,
) -> Result<Arc<dyn KeyValueStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn KeyValueStore> = match config.store_backend {
        StoreBackend::Redis => {
            tracing::info!(
                "Using redis store at {}:{} db {}",
                config.redis_host,
                config.redis_port,
                config.redis_db
            );
            Arc::new(RedisKeyValueStore::connect(&config.redis_url()).await?)
        }
        StoreBackend::Sqlite => {
            let db = Database::connect(&config.database_url).await?;
            db.run_migrations().await?;
            tracing::info!("Using sqlite store, migrations applied");
            let store = SqliteKeyValueStore::new(db);
            store.start_purge_task(SQLITE_PURGE_PERIOD);
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; the lock only covers this process");
            Arc::new(InMemoryKeyValueStore::new())
        }
    };

    Ok(store)
}

/// Wire the mutex, resource store and orchestrator over `store`.
pub fn build_orchestrator(config: &Config, store: Arc<dyn KeyValueStore>) -> UploadOrchestrator {
    let time_service = Arc::new(TokioTimeService::new()) as Arc<dyn TimeService>;
    let mutex = LeaseMutex::new(store.clone(), time_service);
    let resources = ResourceStore::new(store);

    let settings = config.lock_settings();
    tracing::info!(
        "Upload lock {} configured: ttl {:?}, max wait {:?}, poll {:?}",
        config.lock_key(),
        settings.ttl,
        settings.max_wait,
        settings.poll_interval
    );

    UploadOrchestrator::new(
        mutex,
        resources,
        config.lock_key(),
        config.resource_key(),
        settings,
    )
}

pub async fn build_app_state(config: &Config) -> Result<AppState, Box<dyn std::error::Error>> {
    let store = connect_store(config).await?;
    let orchestrator = build_orchestrator(config, store);
    Ok(AppState::new(orchestrator, config.max_upload_bytes))
}
