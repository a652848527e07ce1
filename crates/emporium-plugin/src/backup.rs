//! Snapshots written before a destructive uninstall.
//!
//! Layout under the backup directory:
//!
//! ```text
//! {plugin_id}/{timestamp}/
//!     code/           copy of the plugin's code package, when present
//!     manifest.json   plugin record plus hook and listener registrations
//!     data.json       plugin data entries (optional)
//!     RESTORE.md      restore instructions
//! ```

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use emporium_core::AppError;
use emporium_core::traits::AssetStorage;
use emporium_database::{PluginDataRepository, PluginStore};
use emporium_entity::backup::{BackupRecord, NewBackupRecord};
use emporium_entity::data::PluginDataEntry;
use emporium_entity::plugin::Plugin;

use crate::error::{PluginError, PluginResult};

const CODE_DIR: &str = "code";
const MANIFEST_FILE: &str = "manifest.json";
const DATA_FILE: &str = "data.json";
const RESTORE_FILE: &str = "RESTORE.md";

/// A backup read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// Persisted record.
    pub record: BackupRecord,
    /// Contents of `manifest.json`.
    pub manifest: Value,
    /// Contents of `data.json`, when the backup includes data.
    pub data: Option<Vec<PluginDataEntry>>,
    /// Contents of `RESTORE.md`.
    pub restore_instructions: String,
}

/// Writes and reads plugin backups.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    storage: Arc<dyn AssetStorage>,
    store: Arc<dyn PluginStore>,
    data: Arc<dyn PluginDataRepository>,
    backup_dir: String,
}

impl BackupWriter {
    /// Create a writer placing backups under `backup_dir` in `storage`.
    pub fn new(
        storage: Arc<dyn AssetStorage>,
        store: Arc<dyn PluginStore>,
        data: Arc<dyn PluginDataRepository>,
        backup_dir: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            store,
            data,
            backup_dir: backup_dir.into().trim_end_matches('/').to_string(),
        }
    }

    /// Snapshot a plugin. Any failure is a [`PluginError::Backup`]; partial
    /// output is removed on a best-effort basis.
    pub async fn create(&self, plugin: &Plugin, include_data: bool) -> PluginResult<BackupRecord> {
        let location = self.allocate(&plugin.id).await.map_err(|e| backup_error(plugin, e))?;

        match self.write_snapshot(plugin, &location, include_data).await {
            Ok(record) => {
                info!(
                    plugin_id = %plugin.id,
                    backup_id = %record.id,
                    location = %record.location,
                    includes_code = record.includes_code,
                    includes_data = record.includes_data,
                    "Plugin backup written"
                );
                Ok(record)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete_dir(&location).await {
                    warn!(
                        plugin_id = %plugin.id,
                        location = %location,
                        error = %cleanup,
                        "Failed to remove partial backup"
                    );
                }
                Err(backup_error(plugin, e))
            }
        }
    }

    /// Absolute location of a backup, for reports and audit records.
    pub fn locate(&self, record: &BackupRecord) -> String {
        self.storage.locate(&record.location)
    }

    /// Read a backup back from storage.
    pub async fn load_backup(&self, id: Uuid) -> PluginResult<BackupSnapshot> {
        let record = self
            .store
            .find_backup(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Backup {id} not found")))?;

        let manifest = self
            .storage
            .read_to_string(&format!("{}/{MANIFEST_FILE}", record.location))
            .await?;
        let manifest: Value = serde_json::from_str(&manifest).map_err(AppError::from)?;

        let data = if record.includes_data {
            let raw = self
                .storage
                .read_to_string(&format!("{}/{DATA_FILE}", record.location))
                .await?;
            Some(serde_json::from_str(&raw).map_err(AppError::from)?)
        } else {
            None
        };

        let restore_instructions = self
            .storage
            .read_to_string(&format!("{}/{RESTORE_FILE}", record.location))
            .await?;

        Ok(BackupSnapshot {
            record,
            manifest,
            data,
            restore_instructions,
        })
    }

    /// Backups of a plugin, newest first.
    pub async fn list(&self, plugin_id: &str) -> PluginResult<Vec<BackupRecord>> {
        Ok(self.store.find_backups_by_plugin(plugin_id).await?)
    }

    async fn allocate(&self, plugin_id: &str) -> Result<String, AppError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let base = format!("{}/{plugin_id}/{stamp}", self.backup_dir);
        let mut location = base.clone();
        let mut attempt = 1;
        while self.storage.exists(&location).await? {
            attempt += 1;
            location = format!("{base}-{attempt}");
        }
        self.storage.create_dir(&location).await?;
        Ok(location)
    }

    async fn write_snapshot(
        &self,
        plugin: &Plugin,
        location: &str,
        include_data: bool,
    ) -> Result<BackupRecord, AppError> {
        let mut includes_code = false;
        if let Some(path) = plugin.plugin_path.as_deref() {
            if self.storage.exists(path).await? {
                let files = self
                    .storage
                    .copy_dir(path, &format!("{location}/{CODE_DIR}"))
                    .await?;
                info!(plugin_id = %plugin.id, files, "Plugin code copied to backup");
                includes_code = true;
            }
        }

        let hooks = self.store.find_hooks_by_plugin(&plugin.id).await?;
        let listeners = self.store.find_listeners_by_plugin(&plugin.id).await?;
        let snapshot = json!({
            "plugin": plugin,
            "hooks": hooks,
            "listeners": listeners,
        });
        self.write_json(&format!("{location}/{MANIFEST_FILE}"), &snapshot)
            .await?;

        let includes_data = if include_data {
            let entries = self.data.find_all(&plugin.id, None).await?;
            self.write_json(&format!("{location}/{DATA_FILE}"), &entries)
                .await?;
            true
        } else {
            false
        };

        let restore_instructions = restore_instructions(plugin, includes_code, includes_data);
        self.storage
            .write(
                &format!("{location}/{RESTORE_FILE}"),
                Bytes::from(restore_instructions.clone()),
            )
            .await?;

        self.store
            .insert_backup(&NewBackupRecord {
                plugin_id: plugin.id.clone(),
                location: location.to_string(),
                includes_code,
                includes_data,
                manifest_snapshot: snapshot,
                restore_instructions,
            })
            .await
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), AppError> {
        let body = serde_json::to_vec_pretty(value)?;
        self.storage.write(path, Bytes::from(body)).await
    }
}

fn backup_error(plugin: &Plugin, err: AppError) -> PluginError {
    PluginError::Backup {
        plugin_id: plugin.id.clone(),
        message: err.to_string(),
    }
}

fn restore_instructions(plugin: &Plugin, includes_code: bool, includes_data: bool) -> String {
    let mut text = format!(
        "# Restoring {} ({})\n\nVersion {} was backed up on {}.\n\n",
        plugin.name,
        plugin.id,
        plugin.version,
        Utc::now().to_rfc3339()
    );
    let mut step = 1;
    if includes_code {
        text.push_str(&format!(
            "{step}. Copy `{CODE_DIR}/` back to the plugin directory{}.\n",
            plugin
                .plugin_path
                .as_deref()
                .map(|p| format!(" (`{p}`)"))
                .unwrap_or_default()
        ));
        step += 1;
    }
    text.push_str(&format!(
        "{step}. Reinstall the plugin with `emporium-cli plugin install <path>`; \
         hook and listener sources are listed in `{MANIFEST_FILE}`.\n"
    ));
    step += 1;
    if includes_data {
        text.push_str(&format!(
            "{step}. Re-import the entries in `{DATA_FILE}` through `PUT /api/plugins/{}/data/{{key}}`.\n",
            plugin.id
        ));
        step += 1;
    }
    text.push_str(&format!(
        "{step}. Enable the plugin once its dependencies are enabled.\n\n\
         Dropped tables are not part of this backup and must be restored from a database dump.\n"
    ));
    text
}
