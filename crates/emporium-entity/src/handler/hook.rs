//! Hook registration entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Default priority for hook registrations that do not specify one.
pub const DEFAULT_HOOK_PRIORITY: i32 = 10;

/// A handler registered by a plugin on a named hook point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HookRegistration {
    /// Monotonic identifier; doubles as the creation-order tie-break.
    pub id: i64,
    /// Owning plugin.
    pub plugin_id: String,
    /// Extension point name (e.g., `"cart.processLoadedItems"`).
    pub hook_name: String,
    /// Lower numbers run first.
    pub priority: i32,
    /// Whether this registration is dispatched.
    pub is_enabled: bool,
    /// Persisted handler script.
    pub source: String,
    /// When the registration was created.
    pub created_at: DateTime<Utc>,
    /// When the registration was last changed.
    pub updated_at: DateTime<Utc>,
}

impl HookRegistration {
    /// Label used in logs and diagnostics.
    pub fn label(&self) -> String {
        format!("{}#{}@{}", self.plugin_id, self.id, self.hook_name)
    }
}

/// Data required to register a hook handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHookRegistration {
    /// Owning plugin.
    pub plugin_id: String,
    /// Extension point name.
    pub hook_name: String,
    /// Lower numbers run first.
    pub priority: i32,
    /// Handler script.
    pub source: String,
}
