//! Uninstall options and the audit trail written onto the plugin record.

pub mod model;
pub mod options;

pub use model::{CleanupFailure, CleanupPhase, CleanupSummary, UninstallAudit, UninstallOutcome};
pub use options::{CleanupPolicy, UninstallOptions};
