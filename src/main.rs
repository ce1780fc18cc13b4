use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eventrank::{
    api::{create_router, AppState},
    config::{Config, StorageBackend},
    db::{
        create_pool, create_redis_client, CacheWriterHandle, MemoryStore, PgStore,
        RedisCacheStore, Stores,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eventrank=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (state, cache_writer) = build_state(&config).await?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, backend = ?config.storage_backend, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(writer) = cache_writer {
        writer.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// Connects the configured backend and wires the services over it
async fn build_state(config: &Config) -> anyhow::Result<(AppState, Option<CacheWriterHandle>)> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok((AppState::in_memory(config, Arc::new(MemoryStore::new())), None))
        }
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url).await?;
            if config.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database migrations applied");
            }

            let redis_client = create_redis_client(&config.redis_url)?;
            let (cache_store, writer) = RedisCacheStore::new(redis_client).await?;

            let stores = Stores::postgres(Arc::new(PgStore::new(pool)));
            Ok((
                AppState::new(config, stores, Arc::new(cache_store)),
                Some(writer),
            ))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
