//! Plugin entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use super::manifest::PluginManifest;
use super::status::PluginStatus;
use crate::audit::UninstallAudit;

/// An installed (or formerly installed) plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Plugin {
    /// Opaque plugin identifier (e.g., `"loyalty-points"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: PluginStatus,
    /// Whether hooks and listeners of this plugin are dispatched.
    pub is_enabled: bool,
    /// Declared metadata.
    pub manifest: Json<PluginManifest>,
    /// Location of the plugin's code package in asset storage.
    pub plugin_path: Option<String>,
    /// When the plugin was (last) installed.
    pub installed_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the plugin was uninstalled.
    pub uninstalled_at: Option<DateTime<Utc>>,
    /// Set while an uninstall holds the plugin; cleared when it ends.
    pub uninstall_started_at: Option<DateTime<Utc>>,
    /// Outcome of the last uninstall attempt.
    pub uninstall_audit: Option<Json<UninstallAudit>>,
}

impl Plugin {
    /// Whether the plugin still counts as installed.
    pub fn is_installed(&self) -> bool {
        self.status.is_installed()
    }
}

/// Data required to create (or re-create) a plugin row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlugin {
    /// Plugin identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Optional description.
    pub description: Option<String>,
    /// Declared metadata.
    pub manifest: PluginManifest,
    /// Location of the code package in asset storage.
    pub plugin_path: Option<String>,
}
