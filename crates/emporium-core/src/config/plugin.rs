//! Plugin runtime configuration.

use serde::{Deserialize, Serialize};

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Root of the asset storage; `directory` and `backup_directory` are relative to it.
    #[serde(default = "default_asset_root")]
    pub asset_root: String,
    /// Directory containing plugin code packages.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Directory where uninstall backups are written.
    #[serde(default = "default_backup_directory")]
    pub backup_directory: String,
    /// Wall-clock budget for a single handler invocation, in milliseconds.
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_ms: u64,
    /// Maximum number of script operations per handler invocation.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    /// Number of compiled handler scripts kept in memory.
    #[serde(default = "default_loader_cache_capacity")]
    pub loader_cache_capacity: u64,
    /// Additional table names that plugin cleanup must never touch.
    #[serde(default)]
    pub protected_tables: Vec<String>,
    /// Whether persisted handlers are validated when the server starts.
    #[serde(default = "default_true")]
    pub validate_on_startup: bool,
    /// Age after which an uninstall claim left by a crashed process may be
    /// taken over, in seconds.
    #[serde(default = "default_uninstall_claim_ttl")]
    pub uninstall_claim_ttl_seconds: u64,
}

impl PluginConfig {
    /// Package directory for `name`, relative to the asset root.
    ///
    /// A bare name resolves inside `directory`; anything containing a `/`
    /// is taken as a path already.
    pub fn package_dir(&self, name: &str) -> String {
        let name = name.trim().trim_end_matches('/');
        if name.contains('/') {
            name.to_string()
        } else {
            format!("{}/{name}", self.directory.trim_end_matches('/'))
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
            directory: default_plugin_directory(),
            backup_directory: default_backup_directory(),
            handler_timeout_ms: default_handler_timeout(),
            max_operations: default_max_operations(),
            loader_cache_capacity: default_loader_cache_capacity(),
            protected_tables: Vec::new(),
            validate_on_startup: default_true(),
            uninstall_claim_ttl_seconds: default_uninstall_claim_ttl(),
        }
    }
}

fn default_asset_root() -> String {
    ".".to_string()
}

fn default_plugin_directory() -> String {
    "plugins".to_string()
}

fn default_backup_directory() -> String {
    "data/plugin-backups".to_string()
}

fn default_handler_timeout() -> u64 {
    5_000
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_loader_cache_capacity() -> u64 {
    1_024
}

fn default_true() -> bool {
    true
}

fn default_uninstall_claim_ttl() -> u64 {
    3_600
}
