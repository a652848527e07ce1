//! Uninstall audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::options::UninstallOptions;

/// Phase of the uninstall pipeline a cleanup failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPhase {
    /// Writing the pre-uninstall backup.
    Backup,
    /// Disabling the plugin before teardown.
    Disable,
    /// Deleting plugin data entries.
    Data,
    /// Running manifest cleanup directives.
    Directive,
    /// Dropping plugin-owned tables.
    Tables,
    /// Removing the plugin from the registry.
    Registry,
    /// Deleting the plugin's code package.
    Code,
}

impl fmt::Display for CleanupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Backup => "backup",
            Self::Disable => "disable",
            Self::Data => "data",
            Self::Directive => "directive",
            Self::Tables => "tables",
            Self::Registry => "registry",
            Self::Code => "code",
        };
        write!(f, "{name}")
    }
}

/// A single resource that could not be cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    /// Pipeline phase.
    pub phase: CleanupPhase,
    /// Resource the step operated on (table name, path, key).
    pub resource: String,
    /// Error message reported by the collaborator.
    pub message: String,
}

/// What an uninstall actually cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    /// Number of plugin data entries deleted.
    pub data_entries_removed: u64,
    /// Manifest cleanup directives that ran successfully.
    pub directives_run: Vec<String>,
    /// Tables dropped, in drop order.
    pub tables_dropped: Vec<String>,
    /// Candidate tables left in place by policy.
    pub tables_kept: Vec<String>,
    /// Whether the code package was deleted.
    pub code_removed: bool,
    /// Per-resource failures; cleanup continued past each of them.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupSummary {
    /// Record a failure.
    pub fn fail(
        &mut self,
        phase: CleanupPhase,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.failures.push(CleanupFailure {
            phase,
            resource: resource.into(),
            message: message.into(),
        });
    }

    /// Whether every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Terminal outcome of an uninstall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UninstallOutcome {
    /// All phases completed without failures.
    Succeeded,
    /// The plugin was removed but some cleanup steps failed.
    CompletedWithErrors,
    /// The plugin could not be removed from the registry.
    Failed,
}

/// Audit record written onto the plugin row at the end of an uninstall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallAudit {
    /// Terminal outcome.
    pub outcome: UninstallOutcome,
    /// Options the caller supplied.
    pub options: UninstallOptions,
    /// Backup location, when a backup was written.
    pub backup_path: Option<String>,
    /// What was cleaned up.
    pub summary: CleanupSummary,
    /// When the uninstall finished.
    pub completed_at: DateTime<Utc>,
}
