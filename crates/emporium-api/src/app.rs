//! Application builder: wires router, middleware, and state into an Axum app.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use emporium_core::config::AppConfig;
use emporium_core::error::AppError;
use emporium_database::DatabasePool;
use emporium_plugin::PluginManager;
use emporium_storage::LocalAssetStorage;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    build_router(state)
}

/// Builds the plugin runtime over PostgreSQL and local asset storage.
///
/// When `plugins.validate_on_startup` is set, every persisted handler is
/// loaded once and the broken ones are logged.
pub async fn build_runtime(config: &AppConfig, db: &DatabasePool) -> Result<PluginManager, AppError> {
    let storage = LocalAssetStorage::new(&config.plugins.asset_root).await?;
    tracing::info!(
        asset_root = %config.plugins.asset_root,
        plugin_directory = %config.plugins.directory,
        backup_directory = %config.plugins.backup_directory,
        "Asset storage ready"
    );

    let plugins = PluginManager::new(db.stores(), Arc::new(storage), &config.plugins);
    if config.plugins.validate_on_startup {
        plugins.validate_persisted().await?;
    }
    Ok(plugins)
}

/// Serves the administrative API until Ctrl-C.
pub async fn run_server(config: AppConfig, plugins: PluginManager) -> Result<(), AppError> {
    let address = config.server.bind_address();
    let app = build_app(AppState::new(config, plugins));

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {address}: {e}")))?;
    tracing::info!(address = %address, "Admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    tracing::info!("Admin API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
