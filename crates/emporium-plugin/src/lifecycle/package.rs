//! Plugin packages on asset storage and the install request built from them.
//!
//! A package is a directory holding `plugin.json`:
//!
//! ```json
//! {
//!   "id": "loyalty",
//!   "name": "Loyalty Points",
//!   "version": "1.2.0",
//!   "dependencies": ["customers-core"],
//!   "tables": ["loyalty_points"],
//!   "hooks": [
//!     { "hook": "cart.processLoadedItems", "priority": 5, "file": "hooks/cart.rhai" }
//!   ],
//!   "listeners": [
//!     { "event": "order.placed", "source": "fn handle(order, ctx) { log(`order ${order.id}`); }" }
//!   ]
//! }
//! ```
//!
//! Manifest fields (`dependencies`, `tables`, `critical`, `dataCleanup`) sit
//! at the top level. Handler source is given inline or as a `file` relative
//! to the package directory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use emporium_core::AppError;
use emporium_core::result::AppResult;
use emporium_core::traits::AssetStorage;
use emporium_entity::handler::hook::DEFAULT_HOOK_PRIORITY;
use emporium_entity::handler::{NewEventListener, NewHookRegistration};
use emporium_entity::plugin::{NewPlugin, PluginManifest};

/// Package manifest file name.
pub const PACKAGE_FILE: &str = "plugin.json";

/// Directory inside a package holding migration scripts.
pub const MIGRATIONS_DIR: &str = "migrations";

/// A hook handler bundled with an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSource {
    /// Extension point name.
    pub hook: String,
    /// Lower numbers run first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Handler script.
    pub source: String,
}

/// An event listener bundled with an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSource {
    /// Event name.
    pub event: String,
    /// Diagnostic label, usually the script's file name.
    #[serde(default = "default_listener_file")]
    pub file: String,
    /// Listener script.
    pub source: String,
}

/// Everything needed to install a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Plugin identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Declared metadata.
    #[serde(default)]
    pub manifest: PluginManifest,
    /// Location of the code package in asset storage.
    #[serde(default)]
    pub plugin_path: Option<String>,
    /// Bundled hook handlers.
    #[serde(default)]
    pub hooks: Vec<HookSource>,
    /// Bundled event listeners.
    #[serde(default)]
    pub listeners: Vec<ListenerSource>,
}

impl InstallRequest {
    /// Split the request into the rows the store creates.
    pub fn into_rows(self) -> (NewPlugin, Vec<NewHookRegistration>, Vec<NewEventListener>) {
        let hooks = self
            .hooks
            .into_iter()
            .map(|h| NewHookRegistration {
                plugin_id: self.id.clone(),
                hook_name: h.hook,
                priority: h.priority,
                source: h.source,
            })
            .collect();
        let listeners = self
            .listeners
            .into_iter()
            .map(|l| NewEventListener {
                plugin_id: self.id.clone(),
                event_name: l.event,
                file_name: l.file,
                source: l.source,
            })
            .collect();
        let plugin = NewPlugin {
            id: self.id,
            name: self.name,
            version: self.version,
            description: self.description,
            manifest: self.manifest,
            plugin_path: self.plugin_path,
        };
        (plugin, hooks, listeners)
    }
}

#[derive(Debug, Deserialize)]
struct PackageFile {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(flatten)]
    manifest: PluginManifest,
    #[serde(default)]
    hooks: Vec<PackageHook>,
    #[serde(default)]
    listeners: Vec<PackageListener>,
}

#[derive(Debug, Deserialize)]
struct PackageHook {
    hook: String,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageListener {
    event: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Read `plugin.json` from `package_dir` and resolve every handler source.
pub async fn read_package(
    storage: &Arc<dyn AssetStorage>,
    package_dir: &str,
) -> AppResult<InstallRequest> {
    let dir = package_dir.trim_end_matches('/');
    let raw = storage
        .read_to_string(&format!("{dir}/{PACKAGE_FILE}"))
        .await?;
    let package: PackageFile = serde_json::from_str(&raw).map_err(|e| {
        AppError::validation(format!("Invalid {PACKAGE_FILE} in '{dir}': {e}"))
    })?;

    let mut hooks = Vec::with_capacity(package.hooks.len());
    for hook in package.hooks {
        let source = resolve_source(storage, dir, hook.file.as_deref(), hook.source, &hook.hook).await?;
        hooks.push(HookSource {
            hook: hook.hook,
            priority: hook.priority,
            source,
        });
    }

    let mut listeners = Vec::with_capacity(package.listeners.len());
    for listener in package.listeners {
        let source = resolve_source(
            storage,
            dir,
            listener.file.as_deref(),
            listener.source,
            &listener.event,
        )
        .await?;
        listeners.push(ListenerSource {
            event: listener.event,
            file: listener.file.unwrap_or_else(default_listener_file),
            source,
        });
    }

    Ok(InstallRequest {
        id: package.id,
        name: package.name,
        version: package.version,
        description: package.description,
        manifest: package.manifest,
        plugin_path: Some(dir.to_string()),
        hooks,
        listeners,
    })
}

/// SQL text of every `*.sql` file in the package's migrations directory,
/// in file-name order. A package without migrations yields nothing.
pub async fn read_migrations(
    storage: &Arc<dyn AssetStorage>,
    package_dir: &str,
) -> AppResult<Vec<String>> {
    let dir = format!("{}/{MIGRATIONS_DIR}", package_dir.trim_end_matches('/'));
    if !storage.exists(&dir).await? {
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = storage
        .list(&dir)
        .await?
        .into_iter()
        .filter(|e| !e.is_directory && e.name.to_lowercase().ends_with(".sql"))
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let mut scripts = Vec::with_capacity(files.len());
    for file in files {
        scripts.push(storage.read_to_string(&file.path).await?);
    }
    Ok(scripts)
}

async fn resolve_source(
    storage: &Arc<dyn AssetStorage>,
    dir: &str,
    file: Option<&str>,
    inline: Option<String>,
    name: &str,
) -> AppResult<String> {
    match (inline, file) {
        (Some(source), _) => Ok(source),
        (None, Some(file)) => storage.read_to_string(&format!("{dir}/{file}")).await,
        (None, None) => Err(AppError::validation(format!(
            "Handler for '{name}' declares neither 'source' nor 'file'"
        ))),
    }
}

fn default_priority() -> i32 {
    DEFAULT_HOOK_PRIORITY
}

fn default_listener_file() -> String {
    "inline".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use emporium_storage::LocalAssetStorage;

    async fn storage(dir: &std::path::Path) -> Arc<dyn AssetStorage> {
        Arc::new(LocalAssetStorage::new(dir).await.unwrap())
    }

    #[tokio::test]
    async fn test_read_package_resolves_files_and_inline_sources() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        storage
            .write(
                "plugins/loyalty/plugin.json",
                Bytes::from_static(
                    br#"{
                        "id": "loyalty",
                        "name": "Loyalty Points",
                        "version": "1.2.0",
                        "dependencies": ["customers-core"],
                        "tables": ["loyalty_points"],
                        "hooks": [
                            { "hook": "cart.processLoadedItems", "priority": 5, "file": "hooks/cart.rhai" },
                            { "hook": "product.title", "source": "fn handle(t, c) { t }" }
                        ],
                        "listeners": [
                            { "event": "order.placed", "file": "listeners/placed.rhai" }
                        ]
                    }"#,
                ),
            )
            .await
            .unwrap();
        storage
            .write("plugins/loyalty/hooks/cart.rhai", Bytes::from_static(b"fn handle(v, c) { v }"))
            .await
            .unwrap();
        storage
            .write("plugins/loyalty/listeners/placed.rhai", Bytes::from_static(b"fn handle(p, c) { }"))
            .await
            .unwrap();

        let request = read_package(&storage, "plugins/loyalty/").await.unwrap();
        assert_eq!(request.id, "loyalty");
        assert_eq!(request.plugin_path.as_deref(), Some("plugins/loyalty"));
        assert!(request.manifest.depends_on("customers-core"));
        assert_eq!(request.hooks[0].source, "fn handle(v, c) { v }");
        assert_eq!(request.hooks[1].priority, DEFAULT_HOOK_PRIORITY);
        assert_eq!(request.listeners[0].file, "listeners/placed.rhai");

        let (plugin, hooks, listeners) = request.into_rows();
        assert_eq!(plugin.id, "loyalty");
        assert!(hooks.iter().all(|h| h.plugin_id == "loyalty"));
        assert_eq!(listeners[0].event_name, "order.placed");
    }

    #[tokio::test]
    async fn test_handler_without_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        storage
            .write(
                "pkg/plugin.json",
                Bytes::from_static(
                    br#"{ "id": "x", "name": "X", "version": "1", "hooks": [{ "hook": "h" }] }"#,
                ),
            )
            .await
            .unwrap();

        let err = read_package(&storage, "pkg").await.unwrap_err();
        assert_eq!(err.kind, emporium_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_read_migrations_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        assert!(read_migrations(&storage, "pkg").await.unwrap().is_empty());

        storage
            .write("pkg/migrations/002_tiers.sql", Bytes::from_static(b"CREATE TABLE b (id INT);"))
            .await
            .unwrap();
        storage
            .write("pkg/migrations/001_points.sql", Bytes::from_static(b"CREATE TABLE a (id INT);"))
            .await
            .unwrap();
        storage
            .write("pkg/migrations/README.md", Bytes::from_static(b"notes"))
            .await
            .unwrap();

        let scripts = read_migrations(&storage, "pkg").await.unwrap();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].contains("TABLE a"));
    }
}
