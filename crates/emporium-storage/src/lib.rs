//! # emporium-storage
//!
//! Static asset storage for plugin code packages and uninstall backups.
//! Currently backed by the local filesystem.

pub mod providers;

pub use providers::LocalAssetStorage;
