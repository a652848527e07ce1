//! Backup record entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable record of a plugin snapshot written before uninstall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BackupRecord {
    /// Backup identifier.
    pub id: Uuid,
    /// Plugin the snapshot belongs to.
    pub plugin_id: String,
    /// Directory of the snapshot, relative to the asset storage root.
    pub location: String,
    /// Whether the plugin's code package was copied.
    pub includes_code: bool,
    /// Whether plugin data entries were exported.
    pub includes_data: bool,
    /// Plugin record and registrations at backup time.
    pub manifest_snapshot: serde_json::Value,
    /// Human-readable restore instructions.
    pub restore_instructions: String,
    /// When the backup was written.
    pub created_at: DateTime<Utc>,
}

/// Data required to persist a backup record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBackupRecord {
    /// Plugin the snapshot belongs to.
    pub plugin_id: String,
    /// Snapshot directory.
    pub location: String,
    /// Whether code was copied.
    pub includes_code: bool,
    /// Whether data was exported.
    pub includes_data: bool,
    /// Plugin record and registrations at backup time.
    pub manifest_snapshot: serde_json::Value,
    /// Restore instructions.
    pub restore_instructions: String,
}
