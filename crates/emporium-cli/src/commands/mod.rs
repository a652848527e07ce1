//! CLI command definitions and dispatch.

pub mod migrate;
pub mod plugin;
pub mod serve;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use emporium_core::config::AppConfig;
use emporium_core::error::AppError;
use emporium_database::DatabasePool;
use emporium_plugin::PluginManager;

/// Emporium plugin runtime administration
#[derive(Debug, Parser)]
#[command(name = "emporium", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Environment overlay merged from `config/{env}.toml`
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the administrative API server
    Serve(serve::ServeArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Plugin management
    Plugin(plugin::PluginArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load(&self.config, self.env.as_deref())?;
        match &self.command {
            Commands::Serve(args) => serve::execute(args, config).await,
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Plugin(args) => plugin::execute(args, &config, self.format).await,
        }
    }
}

/// Helper: connect to the database and build the plugin runtime
pub async fn connect_runtime(config: &AppConfig) -> Result<PluginManager, AppError> {
    let db = DatabasePool::connect(&config.database).await?;
    emporium_api::build_runtime(config, &db).await
}
