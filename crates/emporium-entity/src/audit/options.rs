//! Caller-supplied uninstall options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with plugin-owned data or schema during uninstall.
///
/// Interactive confirmation is resolved by the administrative surface
/// before the uninstall starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Leave the resources in place.
    Keep,
    /// Delete the resources.
    Remove,
}

impl CleanupPolicy {
    /// Whether resources should be deleted.
    pub fn removes(&self) -> bool {
        matches!(self, Self::Remove)
    }

    /// Return the policy as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CleanupPolicy {
    type Err = emporium_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "remove" => Ok(Self::Remove),
            _ => Err(emporium_core::AppError::validation(format!(
                "Invalid cleanup policy: '{s}'. Expected one of: keep, remove"
            ))),
        }
    }
}

/// Options controlling a guarded uninstall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallOptions {
    /// Skip dependency, in-use, and criticality checks.
    #[serde(default)]
    pub force: bool,
    /// Snapshot code, manifest, and optionally data before deleting anything.
    #[serde(default = "default_true")]
    pub create_backup: bool,
    /// Include plugin data entries in the backup.
    #[serde(default = "default_true")]
    pub backup_data: bool,
    /// Policy for plugin data entries and manifest cleanup directives.
    pub cleanup_data: CleanupPolicy,
    /// Policy for plugin-owned tables.
    pub cleanup_tables: CleanupPolicy,
    /// Delete the plugin's code package from asset storage.
    #[serde(default)]
    pub remove_code: bool,
}

impl UninstallOptions {
    /// Options with the given cleanup policies and default flags
    /// (backup on, no force, code kept).
    pub fn new(cleanup_data: CleanupPolicy, cleanup_tables: CleanupPolicy) -> Self {
        Self {
            force: false,
            create_backup: true,
            backup_data: true,
            cleanup_data,
            cleanup_tables,
            remove_code: false,
        }
    }

    /// Set the force flag.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable or disable the backup phase.
    pub fn with_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    /// Enable or disable code removal.
    pub fn with_code_removal(mut self, remove_code: bool) -> Self {
        self.remove_code = remove_code;
        self
    }
}

fn default_true() -> bool {
    true
}
