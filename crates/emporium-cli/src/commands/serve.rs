//! Start the administrative API server.

use clap::Args;

use emporium_core::config::AppConfig;
use emporium_core::error::AppError;
use emporium_database::DatabasePool;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override the server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the server host
    #[arg(long)]
    pub host: Option<String>,

    /// Skip database migrations on startup
    #[arg(long)]
    pub no_migrate: bool,
}

/// Execute the serve command
pub async fn execute(args: &ServeArgs, mut config: AppConfig) -> Result<(), AppError> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }

    println!("Starting Emporium admin API...");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);

    let db = if args.no_migrate {
        DatabasePool::connect(&config.database).await?
    } else {
        println!("Running database migrations...");
        DatabasePool::connect_and_migrate(&config.database).await?
    };

    let plugins = emporium_api::build_runtime(&config, &db).await?;
    let result = emporium_api::run_server(config, plugins).await;
    db.close().await;
    result
}
