//! Plugin data repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use emporium_core::error::{AppError, ErrorKind};
use emporium_core::result::AppResult;
use emporium_entity::data::PluginDataEntry;

use crate::store::PluginDataRepository;

/// SQLSTATE for `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL repository for plugin key/value data.
#[derive(Debug, Clone)]
pub struct PluginDataRepositoryPg {
    pool: PgPool,
}

impl PluginDataRepositoryPg {
    /// Create a new plugin data repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PluginDataRepository for PluginDataRepositoryPg {
    async fn upsert(
        &self,
        plugin_id: &str,
        key: &str,
        value: &serde_json::Value,
        data_type: &str,
    ) -> AppResult<PluginDataEntry> {
        sqlx::query_as::<_, PluginDataEntry>(
            "INSERT INTO plugin_data (plugin_id, data_key, data_value, data_type) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (plugin_id, data_key) DO UPDATE SET \
                data_value = EXCLUDED.data_value, data_type = EXCLUDED.data_type, updated_at = NOW() \
             RETURNING *",
        )
        .bind(plugin_id)
        .bind(key)
        .bind(value)
        .bind(data_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let fk_violation = e
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == FOREIGN_KEY_VIOLATION);
            if fk_violation {
                AppError::not_found(format!("Plugin '{plugin_id}' not found"))
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to store plugin data", e)
            }
        })
    }

    async fn find(&self, plugin_id: &str, key: &str) -> AppResult<Option<PluginDataEntry>> {
        sqlx::query_as::<_, PluginDataEntry>(
            "SELECT * FROM plugin_data WHERE plugin_id = $1 AND data_key = $2",
        )
        .bind(plugin_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find plugin data", e))
    }

    async fn find_all(
        &self,
        plugin_id: &str,
        data_type: Option<&str>,
    ) -> AppResult<Vec<PluginDataEntry>> {
        sqlx::query_as::<_, PluginDataEntry>(
            "SELECT * FROM plugin_data \
             WHERE plugin_id = $1 AND ($2::TEXT IS NULL OR data_type = $2) \
             ORDER BY data_key",
        )
        .bind(plugin_id)
        .bind(data_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list plugin data", e))
    }

    async fn delete(&self, plugin_id: &str, key: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM plugin_data WHERE plugin_id = $1 AND data_key = $2")
            .bind(plugin_id)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete plugin data", e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, plugin_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM plugin_data WHERE plugin_id = $1")
            .bind(plugin_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete plugin data", e)
            })?;
        Ok(result.rows_affected())
    }
}
