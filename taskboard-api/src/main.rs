//! # Taskboard API Server
//!
//! Serves the Tasks/Users REST API over the configured document store.
//!
//! ## Usage
//!
//! ```bash
//! STORE_BACKEND=memory cargo run -p taskboard-api
//! ```

use std::sync::Arc;
use taskboard_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat, StoreBackend},
};
use taskboard_shared::db::{
    migrations::run_migrations,
    pool::{create_pool, DatabaseConfig},
};
use taskboard_shared::store::{memory::MemoryStore, postgres::PgDocumentStore, DocumentStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "taskboard_api=debug,taskboard_shared=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let database = config
                .store
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("postgres backend selected without DATABASE_URL"))?;

            let pool = create_pool(DatabaseConfig {
                url: database.url.clone(),
                max_connections: database.max_connections,
                ..Default::default()
            })
            .await?;
            run_migrations(&pool).await?;

            Ok(Arc::new(PgDocumentStore::new(pool)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.logging.format);

    tracing::info!(
        "Taskboard API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let store = connect_store(&config).await?;
    tracing::info!(backend = store.backend(), "Document store ready");

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
