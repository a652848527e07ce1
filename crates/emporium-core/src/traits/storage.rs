//! Static asset storage trait for plugin code packages and backups.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// A single entry returned by [`AssetStorage::list`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AssetEntry {
    /// Path relative to the storage root.
    pub path: String,
    /// File name (last path segment).
    pub name: String,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Size in bytes (zero for directories).
    pub size_bytes: u64,
}

/// Storage collaborator holding plugin code and backup snapshots.
///
/// Paths are relative to the provider root. The runtime never interprets
/// file contents beyond locating a package manifest and migration scripts.
#[async_trait]
pub trait AssetStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Absolute location of a relative path, for display and audit records.
    fn locate(&self, path: &str) -> String;

    /// Check whether a file or directory exists at the given path.
    async fn exists(&self, path: &str) -> AppResult<bool>;

    /// Read a whole file as UTF-8 text.
    async fn read_to_string(&self, path: &str) -> AppResult<String>;

    /// Write bytes to a file, creating missing parent directories.
    async fn write(&self, path: &str, data: Bytes) -> AppResult<()>;

    /// List the direct children of a directory.
    async fn list(&self, path: &str) -> AppResult<Vec<AssetEntry>>;

    /// Recursively copy a directory. Returns the number of files copied.
    async fn copy_dir(&self, from: &str, to: &str) -> AppResult<u64>;

    /// Delete a directory and all its contents recursively.
    async fn delete_dir(&self, path: &str) -> AppResult<()>;

    /// Create a directory (and any missing parents).
    async fn create_dir(&self, path: &str) -> AppResult<()>;
}
