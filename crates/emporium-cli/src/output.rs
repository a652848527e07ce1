//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use emporium_entity::plugin::Plugin;
use emporium_plugin::{InvalidHandler, UninstallReport};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Plugin display row for table output
#[derive(Debug, Serialize, Tabled)]
pub struct PluginRow {
    /// Plugin ID
    pub id: String,
    /// Name
    pub name: String,
    /// Version
    pub version: String,
    /// Status
    pub status: String,
    /// Enabled flag
    pub enabled: String,
    /// Declared dependencies
    pub dependencies: String,
}

impl From<&Plugin> for PluginRow {
    fn from(p: &Plugin) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            version: p.version.clone(),
            status: p.status.to_string(),
            enabled: if p.is_enabled { "yes" } else { "no" }.to_string(),
            dependencies: p.manifest.dependencies.join(", "),
        }
    }
}

/// Broken handler row
#[derive(Debug, Serialize, Tabled)]
pub struct InvalidHandlerRow {
    /// Owning plugin
    pub plugin: String,
    /// Hook or listener
    pub kind: String,
    /// Hook or event label
    pub handler: String,
    /// Load error
    pub error: String,
}

impl From<&InvalidHandler> for InvalidHandlerRow {
    fn from(h: &InvalidHandler) -> Self {
        Self {
            plugin: h.plugin_id.clone(),
            kind: format!("{:?}", h.kind).to_lowercase(),
            handler: h.label.clone(),
            error: h.error.clone(),
        }
    }
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputFormat::Json => print_json(items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    println!("{}", json);
}

/// Print an uninstall report
pub fn print_report(report: &UninstallReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(report);
        return;
    }

    let summary = &report.cleanup_summary;
    if report.success {
        print_success(&format!("Plugin '{}' uninstalled", report.plugin_id));
    } else {
        print_warning(&format!(
            "Plugin '{}' uninstall finished: {:?}",
            report.plugin_id, report.outcome
        ));
    }
    print_kv(
        "Backup",
        report.backup_path.as_deref().unwrap_or("(none)"),
    );
    print_kv("Data entries removed", &summary.data_entries_removed.to_string());
    print_kv("Directives run", &summary.directives_run.join(", "));
    print_kv("Tables dropped", &summary.tables_dropped.join(", "));
    print_kv("Tables kept", &summary.tables_kept.join(", "));
    print_kv("Code removed", if summary.code_removed { "yes" } else { "no" });
    for failure in &summary.failures {
        print_error(&format!(
            "{} {}: {}",
            failure.phase, failure.resource, failure.message
        ));
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {}", msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{}:", key), value);
}
