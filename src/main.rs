// src/main.rs
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum_server::Handle;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use polls::{
    build_app,
    config::{Config, StorageBackend},
    db,
    store::{MemoryStore, PgStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // Load environment variables from .env file

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("polls=info,tower_http=info"));
    fmt().with_env_filter(filter).init();

    let config = Config::load()?;

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = db::create_pool(database_url, &config)
                .await
                .context("Failed to connect to the database")?;
            db::migrate(&pool).await?;
            info!("Connected to the database");

            Arc::new(PgStore::new(pool, config.db_timeout))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage, data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = build_app(store, config);

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!(%address, "Server running");
    axum_server::bind(address)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
