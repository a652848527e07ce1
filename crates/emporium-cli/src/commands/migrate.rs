//! Database migration management commands.

use clap::{Args, Subcommand};

use crate::output;
use emporium_core::config::AppConfig;
use emporium_core::error::AppError;
use emporium_database::DatabasePool;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check database connectivity
    Check,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            let db = DatabasePool::connect_and_migrate(&config.database).await?;
            db.close().await;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Check => {
            let db = DatabasePool::connect(&config.database).await?;
            let healthy = db.health_check().await?;
            db.close().await;
            if healthy {
                output::print_success("Database reachable.");
            } else {
                output::print_warning("Database answered unexpectedly.");
            }
        }
    }

    Ok(())
}
