//! Plugin-scoped key/value data.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use emporium_core::AppError;
use emporium_database::PluginDataRepository;
use emporium_entity::data::{DEFAULT_DATA_TYPE, PluginDataEntry};

use crate::error::PluginResult;

/// Namespaced persistence for plugins. Every operation is scoped by plugin ID.
#[derive(Debug, Clone)]
pub struct PluginDataStore {
    repo: Arc<dyn PluginDataRepository>,
}

impl PluginDataStore {
    /// Create a data store over the given repository.
    pub fn new(repo: Arc<dyn PluginDataRepository>) -> Self {
        Self { repo }
    }

    /// Insert or replace the value stored under `key`.
    pub async fn set(
        &self,
        plugin_id: &str,
        key: &str,
        value: Value,
        data_type: Option<&str>,
    ) -> PluginResult<PluginDataEntry> {
        check_scope(plugin_id, Some(key))?;
        let data_type = data_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_DATA_TYPE);
        let entry = self.repo.upsert(plugin_id, key, &value, data_type).await?;
        debug!(plugin_id = %plugin_id, key = %key, data_type = %data_type, "Plugin data written");
        Ok(entry)
    }

    /// Value stored under `key`, if any.
    pub async fn get(&self, plugin_id: &str, key: &str) -> PluginResult<Option<Value>> {
        check_scope(plugin_id, Some(key))?;
        Ok(self
            .repo
            .find(plugin_id, key)
            .await?
            .map(|entry| entry.data_value))
    }

    /// Full entry stored under `key`, including its type tag and timestamps.
    pub async fn entry(&self, plugin_id: &str, key: &str) -> PluginResult<Option<PluginDataEntry>> {
        check_scope(plugin_id, Some(key))?;
        Ok(self.repo.find(plugin_id, key).await?)
    }

    /// All values of a plugin keyed by data key, optionally filtered by type.
    pub async fn get_all(
        &self,
        plugin_id: &str,
        data_type: Option<&str>,
    ) -> PluginResult<BTreeMap<String, Value>> {
        Ok(self
            .entries(plugin_id, data_type)
            .await?
            .into_iter()
            .map(|entry| (entry.data_key, entry.data_value))
            .collect())
    }

    /// All entries of a plugin, ordered by key.
    pub async fn entries(
        &self,
        plugin_id: &str,
        data_type: Option<&str>,
    ) -> PluginResult<Vec<PluginDataEntry>> {
        check_scope(plugin_id, None)?;
        Ok(self.repo.find_all(plugin_id, data_type).await?)
    }

    /// Delete a single key. Returns `true` if it existed.
    pub async fn delete(&self, plugin_id: &str, key: &str) -> PluginResult<bool> {
        check_scope(plugin_id, Some(key))?;
        Ok(self.repo.delete(plugin_id, key).await?)
    }

    /// Delete every key of a plugin. Returns the number removed.
    pub async fn delete_all(&self, plugin_id: &str) -> PluginResult<u64> {
        check_scope(plugin_id, None)?;
        Ok(self.repo.delete_all(plugin_id).await?)
    }
}

fn check_scope(plugin_id: &str, key: Option<&str>) -> Result<(), AppError> {
    if plugin_id.trim().is_empty() {
        return Err(AppError::validation("Plugin ID must not be empty"));
    }
    if key.is_some_and(|k| k.trim().is_empty()) {
        return Err(AppError::validation("Data key must not be empty"));
    }
    Ok(())
}
