//! Response DTOs.

use serde::{Deserialize, Serialize};

use emporium_entity::handler::{EventListener, HookRegistration};
use emporium_entity::plugin::Plugin;
use emporium_plugin::InvalidHandler;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
}

/// A plugin with its registrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDetailResponse {
    /// Plugin record.
    pub plugin: Plugin,
    /// Hook registrations.
    pub hooks: Vec<HookRegistration>,
    /// Event listeners.
    pub listeners: Vec<EventListener>,
    /// Whether an uninstall is running.
    pub uninstalling: bool,
}

/// What would block an uninstall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependentsResponse {
    /// Plugin queried.
    pub plugin_id: String,
    /// Installed plugins depending on it.
    pub dependents: Vec<String>,
    /// Live resources registered by it.
    pub resources: Vec<String>,
    /// Whether any resource is live.
    pub in_use: bool,
}

/// Result of validating every persisted handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    /// Whether every handler loads.
    pub valid: bool,
    /// Handlers that fail to load.
    pub invalid: Vec<InvalidHandler>,
}

/// Deletion outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Number of removed entries.
    pub removed: u64,
}
