//! Plugin management CLI commands.

use clap::{Args, Subcommand};
use dialoguer::{Confirm, Select};

use crate::output::{self, InvalidHandlerRow, OutputFormat, PluginRow};
use emporium_core::config::AppConfig;
use emporium_core::error::AppError;
use emporium_entity::audit::{CleanupPolicy, UninstallOptions};

/// Arguments for plugin commands
#[derive(Debug, Args)]
pub struct PluginArgs {
    /// Plugin subcommand
    #[command(subcommand)]
    pub command: PluginCommand,
}

/// Plugin subcommands
#[derive(Debug, Subcommand)]
pub enum PluginCommand {
    /// List all plugins, including uninstalled ones
    List,
    /// Show a plugin with its hooks and listeners
    Show {
        /// Plugin ID
        id: String,
    },
    /// Install a plugin package
    Install {
        /// Package directory, or a bare name inside the plugin directory
        path: String,
    },
    /// Enable a plugin
    Enable {
        /// Plugin ID
        id: String,
    },
    /// Disable a plugin
    Disable {
        /// Plugin ID
        id: String,
    },
    /// Uninstall a plugin
    Uninstall(UninstallArgs),
    /// Load every persisted handler and report the broken ones
    Validate,
}

/// Arguments for `plugin uninstall`
#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// Plugin ID
    pub id: String,

    /// Skip dependency, in-use, and criticality checks
    #[arg(long)]
    pub force: bool,

    /// Do not write a backup before deleting anything
    #[arg(long)]
    pub no_backup: bool,

    /// Keep plugin data entries
    #[arg(long, conflicts_with = "remove_data")]
    pub keep_data: bool,

    /// Delete plugin data entries and run manifest cleanup directives
    #[arg(long)]
    pub remove_data: bool,

    /// Keep plugin-owned tables
    #[arg(long, conflicts_with = "remove_tables")]
    pub keep_tables: bool,

    /// Drop plugin-owned tables
    #[arg(long)]
    pub remove_tables: bool,

    /// Delete the plugin's code package
    #[arg(long)]
    pub remove_code: bool,

    /// Do not prompt; unanswered cleanup choices default to keep
    #[arg(short, long)]
    pub yes: bool,
}

impl UninstallArgs {
    /// Build options, prompting for cleanup choices the flags leave open.
    fn options(&self) -> Result<UninstallOptions, AppError> {
        let cleanup_data = match preset_policy(self.keep_data, self.remove_data, self.yes) {
            Some(policy) => policy,
            None => prompt_policy("plugin data entries")?,
        };
        let cleanup_tables = match preset_policy(self.keep_tables, self.remove_tables, self.yes) {
            Some(policy) => policy,
            None => prompt_policy("plugin-owned database tables")?,
        };

        Ok(UninstallOptions::new(cleanup_data, cleanup_tables)
            .with_force(self.force)
            .with_backup(!self.no_backup)
            .with_code_removal(self.remove_code))
    }
}

/// Policy fixed by flags, or `None` when the user must be asked.
fn preset_policy(keep: bool, remove: bool, assume_yes: bool) -> Option<CleanupPolicy> {
    if remove {
        Some(CleanupPolicy::Remove)
    } else if keep || assume_yes {
        Some(CleanupPolicy::Keep)
    } else {
        None
    }
}

fn prompt_policy(subject: &str) -> Result<CleanupPolicy, AppError> {
    let choice = Select::new()
        .with_prompt(format!("What should happen to the {subject}?"))
        .items(&["Keep", "Remove"])
        .default(0)
        .interact()
        .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;
    Ok(if choice == 1 {
        CleanupPolicy::Remove
    } else {
        CleanupPolicy::Keep
    })
}

/// Execute plugin commands
pub async fn execute(
    args: &PluginArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let plugins = super::connect_runtime(config).await?;
    let registry = plugins.registry();
    let lifecycle = plugins.lifecycle();

    match &args.command {
        PluginCommand::List => {
            let all = registry.list().await?;
            let rows: Vec<PluginRow> = all.iter().map(PluginRow::from).collect();
            output::print_list(&rows, format);
        }
        PluginCommand::Show { id } => {
            let plugin = registry.require(id).await?;
            let hooks = registry.hooks_for(id).await?;
            let listeners = registry.listeners_for(id).await?;

            if format == OutputFormat::Json {
                output::print_json(&serde_json::json!({
                    "plugin": plugin,
                    "hooks": hooks,
                    "listeners": listeners,
                }));
                return Ok(());
            }

            println!("{} ({})", plugin.name, plugin.id);
            output::print_kv("Version", &plugin.version);
            output::print_kv("Status", plugin.status.as_str());
            output::print_kv("Enabled", if plugin.is_enabled { "yes" } else { "no" });
            output::print_kv("Dependencies", &plugin.manifest.dependencies.join(", "));
            output::print_kv("Tables", &plugin.manifest.tables.join(", "));
            output::print_kv("Critical", if plugin.manifest.critical { "yes" } else { "no" });
            output::print_kv("Path", plugin.plugin_path.as_deref().unwrap_or("(none)"));
            for hook in &hooks {
                output::print_kv(
                    "Hook",
                    &format!(
                        "{} (priority {}{})",
                        hook.hook_name,
                        hook.priority,
                        if hook.is_enabled { "" } else { ", disabled" }
                    ),
                );
            }
            for listener in &listeners {
                output::print_kv(
                    "Listener",
                    &format!("{} ({})", listener.event_name, listener.file_name),
                );
            }
        }
        PluginCommand::Install { path } => {
            let dir = config.plugins.package_dir(path);
            let plugin = lifecycle.install_from_path(&dir).await?;
            output::print_success(&format!(
                "Installed {} {} from {}; enable it with `plugin enable {}`",
                plugin.id, plugin.version, dir, plugin.id
            ));
        }
        PluginCommand::Enable { id } => {
            lifecycle.enable(id).await?;
            output::print_success(&format!("Plugin '{}' enabled", id));
        }
        PluginCommand::Disable { id } => {
            lifecycle.disable(id).await?;
            output::print_success(&format!("Plugin '{}' disabled", id));
        }
        PluginCommand::Uninstall(uninstall) => {
            let options = uninstall.options()?;

            if !uninstall.yes {
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Uninstall '{}' (data: {}, tables: {}, backup: {})?",
                        uninstall.id,
                        options.cleanup_data,
                        options.cleanup_tables,
                        if options.create_backup { "yes" } else { "no" }
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let report = lifecycle.uninstall(&uninstall.id, options).await?;
            output::print_report(&report, format);
        }
        PluginCommand::Validate => {
            let invalid = plugins.validate_persisted().await?;
            if invalid.is_empty() && format == OutputFormat::Table {
                output::print_success("All persisted handlers load.");
            } else {
                let rows: Vec<InvalidHandlerRow> =
                    invalid.iter().map(InvalidHandlerRow::from).collect();
                output::print_list(&rows, format);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    fn uninstall_args(argv: &[&str]) -> UninstallArgs {
        let mut full = vec!["emporium", "plugin", "uninstall"];
        full.extend_from_slice(argv);
        let cli = Cli::try_parse_from(full).unwrap();
        match cli.command {
            Commands::Plugin(PluginArgs {
                command: PluginCommand::Uninstall(args),
            }) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_flags_fix_policies_without_prompting() {
        let args = uninstall_args(&[
            "loyalty",
            "--force",
            "--no-backup",
            "--remove-data",
            "--keep-tables",
            "--remove-code",
        ]);
        let options = args.options().unwrap();
        assert!(options.force);
        assert!(!options.create_backup);
        assert_eq!(options.cleanup_data, CleanupPolicy::Remove);
        assert_eq!(options.cleanup_tables, CleanupPolicy::Keep);
        assert!(options.remove_code);
    }

    #[test]
    fn test_yes_defaults_open_choices_to_keep() {
        let options = uninstall_args(&["loyalty", "--yes"]).options().unwrap();
        assert_eq!(options.cleanup_data, CleanupPolicy::Keep);
        assert_eq!(options.cleanup_tables, CleanupPolicy::Keep);
        assert!(options.create_backup);
    }

    #[test]
    fn test_conflicting_flags_are_rejected() {
        let parsed = Cli::try_parse_from([
            "emporium",
            "plugin",
            "uninstall",
            "loyalty",
            "--keep-data",
            "--remove-data",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unanswered_choice_needs_prompt() {
        assert_eq!(preset_policy(false, false, false), None);
        assert_eq!(preset_policy(true, false, false), Some(CleanupPolicy::Keep));
        assert_eq!(preset_policy(false, true, true), Some(CleanupPolicy::Remove));
    }
}
