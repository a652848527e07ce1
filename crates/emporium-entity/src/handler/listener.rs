//! Event listener entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A listener registered by a plugin for a named event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EventListener {
    /// Monotonic identifier; defines the delivery order.
    pub id: i64,
    /// Owning plugin.
    pub plugin_id: String,
    /// Event name (e.g., `"order.placed"`).
    pub event_name: String,
    /// File name or label for diagnostics.
    pub file_name: String,
    /// Whether this listener is invoked.
    pub is_enabled: bool,
    /// Persisted listener script.
    pub source: String,
    /// When the listener was registered.
    pub created_at: DateTime<Utc>,
}

impl EventListener {
    /// Label used in logs and diagnostics.
    pub fn label(&self) -> String {
        format!("{}/{}@{}", self.plugin_id, self.file_name, self.event_name)
    }
}

/// Data required to register an event listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventListener {
    /// Owning plugin.
    pub plugin_id: String,
    /// Event name.
    pub event_name: String,
    /// File name or label for diagnostics.
    pub file_name: String,
    /// Listener script.
    pub source: String,
}
