//! Plugin registry repository implementation.

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use emporium_core::error::{AppError, ErrorKind};
use emporium_core::result::AppResult;
use emporium_entity::audit::UninstallAudit;
use emporium_entity::backup::{BackupRecord, NewBackupRecord};
use emporium_entity::handler::{
    EventListener, HookRegistration, NewEventListener, NewHookRegistration,
};
use emporium_entity::plugin::{NewPlugin, Plugin, PluginStatus};

use crate::store::PluginStore;

/// Repository for plugins, their registrations, and backups.
#[derive(Debug, Clone)]
pub struct PluginRepository {
    pool: PgPool,
}

impl PluginRepository {
    /// Create a new plugin repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PluginStore for PluginRepository {
    async fn install_plugin(
        &self,
        plugin: &NewPlugin,
        hooks: &[NewHookRegistration],
        listeners: &[NewEventListener],
    ) -> AppResult<Plugin> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        // Only an uninstalled row may be replaced; the WHERE clause turns any
        // other existing row into an empty result.
        let row = sqlx::query_as::<_, Plugin>(
            "INSERT INTO plugins (id, name, version, description, status, is_enabled, manifest, plugin_path) \
             VALUES ($1, $2, $3, $4, 'installed', FALSE, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                name = EXCLUDED.name, version = EXCLUDED.version, description = EXCLUDED.description, \
                status = 'installed', is_enabled = FALSE, manifest = EXCLUDED.manifest, \
                plugin_path = EXCLUDED.plugin_path, installed_at = NOW(), updated_at = NOW(), \
                uninstalled_at = NULL, uninstall_started_at = NULL \
             WHERE plugins.status = 'uninstalled' \
             RETURNING *",
        )
        .bind(&plugin.id)
        .bind(&plugin.name)
        .bind(&plugin.version)
        .bind(&plugin.description)
        .bind(Json(&plugin.manifest))
        .bind(&plugin.plugin_path)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create plugin", e))?;

        let Some(created) = row else {
            return Err(AppError::conflict(format!(
                "Plugin '{}' is already installed",
                plugin.id
            )));
        };

        for hook in hooks {
            sqlx::query(
                "INSERT INTO plugin_hooks (plugin_id, hook_name, priority, source) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&created.id)
            .bind(&hook.hook_name)
            .bind(hook.priority)
            .bind(&hook.source)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to create hook registration", e)
            })?;
        }

        for listener in listeners {
            sqlx::query(
                "INSERT INTO plugin_event_listeners (plugin_id, event_name, file_name, source) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&created.id)
            .bind(&listener.event_name)
            .bind(&listener.file_name)
            .bind(&listener.source)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to create event listener", e)
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit plugin install", e)
        })?;

        Ok(created)
    }

    async fn find_plugin(&self, id: &str) -> AppResult<Option<Plugin>> {
        sqlx::query_as::<_, Plugin>("SELECT * FROM plugins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find plugin", e))
    }

    async fn list_plugins(&self) -> AppResult<Vec<Plugin>> {
        sqlx::query_as::<_, Plugin>("SELECT * FROM plugins ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list plugins", e))
    }

    async fn set_plugin_state(
        &self,
        id: &str,
        status: PluginStatus,
        is_enabled: bool,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE plugins SET status = $2, is_enabled = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(is_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update plugin state", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_uninstalled(&self, id: &str) -> AppResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        sqlx::query("DELETE FROM plugin_hooks WHERE plugin_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete hook registrations", e)
            })?;

        sqlx::query("DELETE FROM plugin_event_listeners WHERE plugin_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete event listeners", e)
            })?;

        let result = sqlx::query(
            "UPDATE plugins SET status = 'uninstalled', is_enabled = FALSE, \
             uninstalled_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark plugin uninstalled", e)
        })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit plugin removal", e)
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_uninstall_audit(&self, id: &str, audit: &UninstallAudit) -> AppResult<()> {
        sqlx::query("UPDATE plugins SET uninstall_audit = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(audit))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to record uninstall audit", e)
            })?;
        Ok(())
    }

    async fn delete_plugin(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM plugins WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete plugin", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin_uninstall(&self, id: &str, stale_after: Duration) -> AppResult<bool> {
        let claimed = sqlx::query_scalar::<_, String>(
            "UPDATE plugins SET uninstall_started_at = NOW() \
             WHERE id = $1 AND status <> 'uninstalled' \
               AND (uninstall_started_at IS NULL \
                    OR uninstall_started_at < NOW() - make_interval(secs => $2)) \
             RETURNING id",
        )
        .bind(id)
        .bind(stale_after.num_milliseconds() as f64 / 1000.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to claim plugin for uninstall", e)
        })?;
        Ok(claimed.is_some())
    }

    async fn finish_uninstall(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE plugins SET uninstall_started_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to release uninstall claim", e)
            })?;
        Ok(())
    }

    async fn track_resource(&self, plugin_id: &str, resource: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO plugin_resources (plugin_id, resource) VALUES ($1, $2) \
             ON CONFLICT (plugin_id, resource) DO NOTHING",
        )
        .bind(plugin_id)
        .bind(resource)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to track resource", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_resource(&self, plugin_id: &str, resource: &str) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM plugin_resources WHERE plugin_id = $1 AND resource = $2")
                .bind(plugin_id)
                .bind(resource)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to release resource", e)
                })?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_resources(&self, plugin_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM plugin_resources WHERE plugin_id = $1")
            .bind(plugin_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to release resources", e)
            })?;
        Ok(result.rows_affected())
    }

    async fn find_resources(&self, plugin_id: &str) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT resource FROM plugin_resources WHERE plugin_id = $1 ORDER BY resource",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list resources", e))
    }

    async fn insert_hook(&self, hook: &NewHookRegistration) -> AppResult<HookRegistration> {
        sqlx::query_as::<_, HookRegistration>(
            "INSERT INTO plugin_hooks (plugin_id, hook_name, priority, source) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&hook.plugin_id)
        .bind(&hook.hook_name)
        .bind(hook.priority)
        .bind(&hook.source)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create hook registration", e)
        })
    }

    async fn find_active_hooks(&self, hook_name: &str) -> AppResult<Vec<HookRegistration>> {
        sqlx::query_as::<_, HookRegistration>(
            "SELECT h.* FROM plugin_hooks h \
             JOIN plugins p ON p.id = h.plugin_id \
             WHERE h.hook_name = $1 AND h.is_enabled = TRUE \
               AND p.is_enabled = TRUE AND p.status = 'active' \
             ORDER BY h.priority ASC, h.id ASC",
        )
        .bind(hook_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load hooks", e))
    }

    async fn find_hooks_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<HookRegistration>> {
        sqlx::query_as::<_, HookRegistration>(
            "SELECT * FROM plugin_hooks WHERE plugin_id = $1 ORDER BY hook_name, priority, id",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find plugin hooks", e))
    }

    async fn find_all_hooks(&self) -> AppResult<Vec<HookRegistration>> {
        sqlx::query_as::<_, HookRegistration>("SELECT * FROM plugin_hooks ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list hooks", e))
    }

    async fn set_hook_enabled(&self, id: i64, is_enabled: bool) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE plugin_hooks SET is_enabled = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(is_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update hook", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_listener(&self, listener: &NewEventListener) -> AppResult<EventListener> {
        sqlx::query_as::<_, EventListener>(
            "INSERT INTO plugin_event_listeners (plugin_id, event_name, file_name, source) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&listener.plugin_id)
        .bind(&listener.event_name)
        .bind(&listener.file_name)
        .bind(&listener.source)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create event listener", e)
        })
    }

    async fn find_active_listeners(&self, event_name: &str) -> AppResult<Vec<EventListener>> {
        sqlx::query_as::<_, EventListener>(
            "SELECT l.* FROM plugin_event_listeners l \
             JOIN plugins p ON p.id = l.plugin_id \
             WHERE l.event_name = $1 AND l.is_enabled = TRUE \
               AND p.is_enabled = TRUE AND p.status = 'active' \
             ORDER BY l.id ASC",
        )
        .bind(event_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load listeners", e))
    }

    async fn find_listeners_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<EventListener>> {
        sqlx::query_as::<_, EventListener>(
            "SELECT * FROM plugin_event_listeners WHERE plugin_id = $1 ORDER BY event_name, id",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find plugin listeners", e)
        })
    }

    async fn find_all_listeners(&self) -> AppResult<Vec<EventListener>> {
        sqlx::query_as::<_, EventListener>("SELECT * FROM plugin_event_listeners ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list listeners", e))
    }

    async fn insert_backup(&self, backup: &NewBackupRecord) -> AppResult<BackupRecord> {
        sqlx::query_as::<_, BackupRecord>(
            "INSERT INTO plugin_backups \
             (id, plugin_id, location, includes_code, includes_data, manifest_snapshot, restore_instructions) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&backup.plugin_id)
        .bind(&backup.location)
        .bind(backup.includes_code)
        .bind(backup.includes_data)
        .bind(&backup.manifest_snapshot)
        .bind(&backup.restore_instructions)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to record backup", e))
    }

    async fn find_backup(&self, id: Uuid) -> AppResult<Option<BackupRecord>> {
        sqlx::query_as::<_, BackupRecord>("SELECT * FROM plugin_backups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find backup", e))
    }

    async fn find_backups_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<BackupRecord>> {
        sqlx::query_as::<_, BackupRecord>(
            "SELECT * FROM plugin_backups WHERE plugin_id = $1 ORDER BY created_at DESC",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list backups", e))
    }
}
