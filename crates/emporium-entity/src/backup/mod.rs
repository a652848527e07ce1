//! Backups taken before destructive uninstalls.

pub mod model;

pub use model::{BackupRecord, NewBackupRecord};
