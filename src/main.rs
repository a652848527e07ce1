//! Emporium server: plugin runtime plus its administrative API.
//!
//! Main entry point that wires all crates together and starts the server.

use tracing_subscriber::{EnvFilter, fmt};

use emporium_core::config::AppConfig;
use emporium_core::error::AppError;
use emporium_database::DatabasePool;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file, environment overlay, and variables
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("EMPORIUM_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let env = std::env::var("EMPORIUM_ENV").ok();

    AppConfig::load(&config_path, env.as_deref())
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Emporium v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db = DatabasePool::connect_and_migrate(&config.database).await?;
    tracing::info!("Database migrations complete");

    // ── Step 2: Plugin runtime ───────────────────────────────────
    let plugins = emporium_api::build_runtime(&config, &db).await?;
    let installed = plugins.registry().list().await?;
    tracing::info!(
        plugins = installed.len(),
        active = installed.iter().filter(|p| p.is_enabled).count(),
        "Plugin runtime ready"
    );

    // ── Step 3: Admin API ────────────────────────────────────────
    let result = emporium_api::run_server(config, plugins).await;
    db.close().await;
    result
}
