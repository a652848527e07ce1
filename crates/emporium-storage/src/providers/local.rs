//! Local filesystem asset storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use emporium_core::error::{AppError, ErrorKind};
use emporium_core::result::AppResult;
use emporium_core::traits::storage::{AssetEntry, AssetStorage};

/// Local filesystem asset storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalAssetStorage {
    /// Root directory for all assets.
    root: PathBuf,
}

impl LocalAssetStorage {
    /// Create a new local asset storage rooted at the given path.
    pub async fn new(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Parent-directory components are rejected so a path can never escape
    /// the root.
    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        let clean = path.trim_start_matches('/');
        let relative = Path::new(clean);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(AppError::validation(format!(
                "Path escapes storage root: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStorage for LocalAssetStorage {
    fn provider_type(&self) -> &str {
        "local"
    }

    fn locate(&self, path: &str) -> String {
        self.root
            .join(path.trim_start_matches('/'))
            .display()
            .to_string()
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        let full_path = self.resolve(path)?;
        fs::try_exists(&full_path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to check path: {path}"),
                e,
            )
        })
    }

    async fn read_to_string(&self, path: &str) -> AppResult<String> {
        let full_path = self.resolve(path)?;
        fs::read_to_string(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("File not found: {path}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read file: {path}"),
                    e,
                )
            }
        })
    }

    async fn write(&self, path: &str, data: Bytes) -> AppResult<()> {
        let full_path = self.resolve(path)?;
        self.ensure_parent(&full_path).await?;

        fs::write(&full_path, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write file: {path}"),
                e,
            )
        })?;

        debug!(path, bytes = data.len(), "Wrote file");
        Ok(())
    }

    async fn list(&self, path: &str) -> AppResult<Vec<AssetEntry>> {
        let full_path = self.resolve(path)?;
        if !fs::try_exists(&full_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to list directory: {path}"),
                e,
            )
        })?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
        })? {
            let entry_meta = entry.metadata().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to get entry metadata", e)
            })?;

            let name = entry.file_name().to_string_lossy().to_string();
            let entry_path = if path.is_empty() || path == "/" {
                name.clone()
            } else {
                format!("{}/{}", path.trim_end_matches('/'), name)
            };

            entries.push(AssetEntry {
                path: entry_path,
                name,
                is_directory: entry_meta.is_dir(),
                size_bytes: if entry_meta.is_file() {
                    entry_meta.len()
                } else {
                    0
                },
            });
        }

        entries.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then(a.path.cmp(&b.path))
        });

        Ok(entries)
    }

    async fn copy_dir(&self, from: &str, to: &str) -> AppResult<u64> {
        let from_root = self.resolve(from)?;
        let to_root = self.resolve(to)?;
        if !fs::metadata(&from_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(AppError::not_found(format!("Directory not found: {from}")));
        }

        let mut copied = 0u64;
        let mut pending = vec![(from_root, to_root)];
        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create directory: {}", dst.display()),
                    e,
                )
            })?;

            let mut dir = fs::read_dir(&src).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to list directory: {}", src.display()),
                    e,
                )
            })?;
            while let Some(entry) = dir.next_entry().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
            })? {
                let file_type = entry.file_type().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Failed to get entry type", e)
                })?;
                let target = dst.join(entry.file_name());
                if file_type.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    fs::copy(entry.path(), &target).await.map_err(|e| {
                        AppError::with_source(
                            ErrorKind::Storage,
                            format!("Failed to copy {}", entry.path().display()),
                            e,
                        )
                    })?;
                    copied += 1;
                }
            }
        }

        debug!(from, to, files = copied, "Copied directory");
        Ok(copied)
    }

    async fn delete_dir(&self, path: &str) -> AppResult<()> {
        let full_path = self.resolve(path)?;
        if full_path == self.root {
            return Err(AppError::validation("Refusing to delete the storage root"));
        }
        if fs::try_exists(&full_path).await.unwrap_or(false) {
            fs::remove_dir_all(&full_path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete directory: {path}"),
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> AppResult<()> {
        let full_path = self.resolve(path)?;
        fs::create_dir_all(&full_path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create directory: {path}"),
                e,
            )
        })?;
        Ok(())
    }
}
