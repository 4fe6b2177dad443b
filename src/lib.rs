pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use api::{create_router, AppState};
pub use config::AppConfig;
pub use model::{Record, TableRegistry};
pub use store::{MemoryStore, PostgresStore, RecordStore, Store};

/// Load configuration, reflect the database schema, and serve the API.
pub async fn run_server() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    let store = PostgresStore::connect(&config.database_url(), config.max_connections()).await?;
    let registry = store.registry();
    log::info!("serving {} auto-discovered tables", registry.len());
    if registry.is_empty() {
        log::warn!("no tables found in the public schema");
    }

    let state = AppState::new(Arc::new(store), config.pagination.clone());
    let app = create_router().with_state(state);

    let address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    log::info!("listening on http://{address}/api/v1/");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
