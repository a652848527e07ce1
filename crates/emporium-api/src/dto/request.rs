//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use emporium_plugin::{HookContext, InstallRequest};

/// Install from a package directory in asset storage.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InstallFromPathRequest {
    /// Package directory containing `plugin.json`.
    #[validate(length(min = 1, max = 1024, message = "Package path is required"))]
    pub path: String,
}

/// Install request body: either a package path or an inline plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstallPluginRequest {
    /// `{ "path": "plugins/loyalty" }`
    Package(InstallFromPathRequest),
    /// Full plugin definition with bundled handler sources.
    Inline(Box<InstallRequest>),
}

/// Diagnostic hook application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyHookRequest {
    /// Initial value threaded through the handlers.
    pub value: Value,
    /// Context visible to handlers.
    #[serde(default)]
    pub context: HookContext,
}

/// Diagnostic event emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEventRequest {
    /// Payload delivered to every listener.
    #[serde(default)]
    pub payload: Value,
    /// Context visible to listeners.
    #[serde(default)]
    pub context: HookContext,
}

/// Upsert of one plugin data entry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetDataRequest {
    /// Stored value.
    pub value: Value,
    /// Optional classification, defaults to `json`.
    #[validate(length(min = 1, max = 50))]
    pub data_type: Option<String>,
}

/// Filter for listing plugin data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataQuery {
    /// Only entries of this type.
    pub data_type: Option<String>,
}
