//! Plugin data entry entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Data type tag used when a caller does not classify a value.
pub const DEFAULT_DATA_TYPE: &str = "json";

/// A value stored under `(plugin_id, data_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PluginDataEntry {
    /// Owning plugin.
    pub plugin_id: String,
    /// Key, unique per plugin.
    pub data_key: String,
    /// Opaque JSON value.
    pub data_value: serde_json::Value,
    /// Classification tag (e.g., `"config"`, `"cache"`, `"json"`).
    pub data_type: String,
    /// When the key was first written.
    pub created_at: DateTime<Utc>,
    /// When the value was last replaced.
    pub updated_at: DateTime<Utc>,
}
