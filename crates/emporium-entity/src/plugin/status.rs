//! Plugin lifecycle status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an installed plugin.
///
/// Enablement is tracked separately on the plugin row; `Active` is the
/// status of an enabled plugin and `Installed` the status of a disabled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plugin_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Installed but not enabled.
    Installed,
    /// Installed and enabled.
    Active,
    /// A lifecycle transition failed unrecoverably.
    Error,
    /// Removed from the registry; the row is kept for its audit trail.
    Uninstalled,
}

impl PluginStatus {
    /// Whether the plugin still counts as installed.
    pub fn is_installed(&self) -> bool {
        !matches!(self, Self::Uninstalled)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Active => "active",
            Self::Error => "error",
            Self::Uninstalled => "uninstalled",
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PluginStatus {
    type Err = emporium_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "installed" => Ok(Self::Installed),
            "active" => Ok(Self::Active),
            "error" => Ok(Self::Error),
            "uninstalled" => Ok(Self::Uninstalled),
            _ => Err(emporium_core::AppError::validation(format!(
                "Invalid plugin status: '{s}'. Expected one of: installed, active, error, uninstalled"
            ))),
        }
    }
}
