//! Plugin registry: catalog access plus the dependents and in-use queries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use emporium_database::PluginStore;
use emporium_entity::handler::{
    EventListener, HookRegistration, NewEventListener, NewHookRegistration,
};
use emporium_entity::plugin::Plugin;

use crate::error::{LoadError, PluginError, PluginResult};
use crate::loader::ScriptLoader;
use crate::tracker::ResourceTracker;

/// Which kind of persisted handler a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Hook registration.
    Hook,
    /// Event listener.
    Listener,
}

/// A persisted handler whose source no longer loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidHandler {
    /// Handler kind.
    pub kind: HandlerKind,
    /// Registration ID.
    pub id: i64,
    /// Owning plugin.
    pub plugin_id: String,
    /// Registration label.
    pub label: String,
    /// Load failure.
    pub error: String,
}

/// Catalog of plugins and their registrations.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    store: Arc<dyn PluginStore>,
    loader: Arc<ScriptLoader>,
    tracker: Arc<ResourceTracker>,
}

impl PluginRegistry {
    /// Create a registry over the given store.
    pub fn new(
        store: Arc<dyn PluginStore>,
        loader: Arc<ScriptLoader>,
        tracker: Arc<ResourceTracker>,
    ) -> Self {
        Self {
            store,
            loader,
            tracker,
        }
    }

    /// Live resource tracker used by [`is_in_use`](Self::is_in_use).
    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn PluginStore> {
        &self.store
    }

    /// Find a plugin row, including uninstalled ones.
    pub async fn get(&self, plugin_id: &str) -> PluginResult<Option<Plugin>> {
        Ok(self.store.find_plugin(plugin_id).await?)
    }

    /// Find an installed plugin or fail with `NotInstalled`.
    pub async fn require(&self, plugin_id: &str) -> PluginResult<Plugin> {
        match self.store.find_plugin(plugin_id).await? {
            Some(plugin) if plugin.is_installed() => Ok(plugin),
            _ => Err(PluginError::NotInstalled(plugin_id.to_string())),
        }
    }

    /// All plugin rows ordered by ID.
    pub async fn list(&self) -> PluginResult<Vec<Plugin>> {
        Ok(self.store.list_plugins().await?)
    }

    /// Installed plugins whose manifest lists `plugin_id` as a dependency.
    pub async fn find_dependents(&self, plugin_id: &str) -> PluginResult<Vec<String>> {
        Ok(self
            .store
            .list_plugins()
            .await?
            .into_iter()
            .filter(|p| p.id != plugin_id && p.is_installed() && p.manifest.depends_on(plugin_id))
            .map(|p| p.id)
            .collect())
    }

    /// Whether the host has live routes or services registered for the plugin.
    pub async fn is_in_use(&self, plugin_id: &str) -> PluginResult<bool> {
        self.tracker.is_in_use(plugin_id).await
    }

    /// Register a hook handler after validating its source.
    pub async fn register_hook(
        &self,
        plugin_id: &str,
        hook_name: &str,
        priority: i32,
        source: &str,
    ) -> PluginResult<HookRegistration> {
        self.require(plugin_id).await?;
        self.loader.validate(source)?;
        let hook = self
            .store
            .insert_hook(&NewHookRegistration {
                plugin_id: plugin_id.to_string(),
                hook_name: hook_name.to_string(),
                priority,
                source: source.to_string(),
            })
            .await?;
        info!(
            plugin_id = %plugin_id,
            hook = %hook_name,
            priority,
            handler_id = hook.id,
            "Hook handler registered"
        );
        Ok(hook)
    }

    /// Register an event listener after validating its source.
    pub async fn register_listener(
        &self,
        plugin_id: &str,
        event_name: &str,
        file_name: &str,
        source: &str,
    ) -> PluginResult<EventListener> {
        self.require(plugin_id).await?;
        self.loader.validate(source)?;
        let listener = self
            .store
            .insert_listener(&NewEventListener {
                plugin_id: plugin_id.to_string(),
                event_name: event_name.to_string(),
                file_name: file_name.to_string(),
                source: source.to_string(),
            })
            .await?;
        info!(
            plugin_id = %plugin_id,
            event = %event_name,
            handler_id = listener.id,
            "Event listener registered"
        );
        Ok(listener)
    }

    /// Enable or disable a single hook registration.
    pub async fn set_hook_enabled(&self, hook_id: i64, is_enabled: bool) -> PluginResult<()> {
        if self.store.set_hook_enabled(hook_id, is_enabled).await? {
            Ok(())
        } else {
            Err(PluginError::Store(emporium_core::AppError::not_found(
                format!("Hook registration {hook_id} not found"),
            )))
        }
    }

    /// Hook registrations owned by a plugin.
    pub async fn hooks_for(&self, plugin_id: &str) -> PluginResult<Vec<HookRegistration>> {
        Ok(self.store.find_hooks_by_plugin(plugin_id).await?)
    }

    /// Event listeners owned by a plugin.
    pub async fn listeners_for(&self, plugin_id: &str) -> PluginResult<Vec<EventListener>> {
        Ok(self.store.find_listeners_by_plugin(plugin_id).await?)
    }

    /// Every persisted hook or listener whose source fails to load.
    pub async fn validate_all(&self) -> PluginResult<Vec<InvalidHandler>> {
        let mut invalid = Vec::new();

        for hook in self.store.find_all_hooks().await? {
            if let Err(e) = self.loader.validate(&hook.source) {
                invalid.push(self.invalid(HandlerKind::Hook, hook.id, &hook.plugin_id, hook.label(), e));
            }
        }
        for listener in self.store.find_all_listeners().await? {
            if let Err(e) = self.loader.validate(&listener.source) {
                invalid.push(self.invalid(
                    HandlerKind::Listener,
                    listener.id,
                    &listener.plugin_id,
                    listener.label(),
                    e,
                ));
            }
        }

        Ok(invalid)
    }

    /// Physically delete a plugin; registrations, data, and tracked
    /// resources cascade.
    pub async fn delete(&self, plugin_id: &str) -> PluginResult<()> {
        if !self.store.delete_plugin(plugin_id).await? {
            return Err(PluginError::NotInstalled(plugin_id.to_string()));
        }
        info!(plugin_id = %plugin_id, "Plugin record deleted");
        Ok(())
    }

    fn invalid(
        &self,
        kind: HandlerKind,
        id: i64,
        plugin_id: &str,
        label: String,
        error: LoadError,
    ) -> InvalidHandler {
        warn!(plugin_id = %plugin_id, handler = %label, error = %error, "Persisted handler does not load");
        InvalidHandler {
            kind,
            id,
            plugin_id: plugin_id.to_string(),
            label,
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderLimits;
    use emporium_database::MemoryStore;
    use emporium_entity::plugin::{NewPlugin, PluginManifest};

    fn new_plugin(id: &str, dependencies: &[&str]) -> NewPlugin {
        NewPlugin {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            manifest: PluginManifest {
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                ..PluginManifest::default()
            },
            plugin_path: None,
        }
    }

    fn registry(store: Arc<MemoryStore>) -> PluginRegistry {
        PluginRegistry::new(
            store.clone(),
            Arc::new(ScriptLoader::new(LoaderLimits::default())),
            Arc::new(ResourceTracker::new(store)),
        )
    }

    #[tokio::test]
    async fn test_find_dependents_ignores_uninstalled() {
        let store = Arc::new(MemoryStore::new());
        store.install_plugin(&new_plugin("core", &[]), &[], &[]).await.unwrap();
        store.install_plugin(&new_plugin("a", &["core"]), &[], &[]).await.unwrap();
        store.install_plugin(&new_plugin("b", &["core"]), &[], &[]).await.unwrap();
        store.install_plugin(&new_plugin("c", &[]), &[], &[]).await.unwrap();
        store.mark_uninstalled("b").await.unwrap();

        let registry = registry(store);
        assert_eq!(registry.find_dependents("core").await.unwrap(), vec!["a".to_string()]);
        assert!(registry.find_dependents("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_hook_validates_source_first() {
        let store = Arc::new(MemoryStore::new());
        store.install_plugin(&new_plugin("seo", &[]), &[], &[]).await.unwrap();
        let registry = registry(store);

        let err = registry
            .register_hook("seo", "product.title", 10, "// test")
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Load(LoadError::Placeholder)));
        assert!(registry.hooks_for("seo").await.unwrap().is_empty());

        let hook = registry
            .register_hook("seo", "product.title", 10, "fn handle(t, c) { t + \" | Shop\" }")
            .await
            .unwrap();
        assert_eq!(hook.priority, 10);

        let missing = registry
            .register_hook("ghost", "product.title", 10, "fn handle(t, c) { t }")
            .await
            .unwrap_err();
        assert!(matches!(missing, PluginError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn test_validate_all_reports_broken_persisted_handlers() {
        let store = Arc::new(MemoryStore::new());
        let broken = NewHookRegistration {
            plugin_id: "legacy".to_string(),
            hook_name: "cart.total".to_string(),
            priority: 10,
            source: "fn handle(v, c) { v +".to_string(),
        };
        let fine = NewEventListener {
            plugin_id: "legacy".to_string(),
            event_name: "order.placed".to_string(),
            file_name: "notify.rhai".to_string(),
            source: "fn handle(p, c) { }".to_string(),
        };
        store
            .install_plugin(&new_plugin("legacy", &[]), &[broken], &[fine])
            .await
            .unwrap();

        let invalid = registry(store).validate_all().await.unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].kind, HandlerKind::Hook);
        assert_eq!(invalid[0].plugin_id, "legacy");
    }

    #[tokio::test]
    async fn test_in_use_follows_tracker_and_delete_releases() {
        let store = Arc::new(MemoryStore::new());
        store.install_plugin(&new_plugin("pay", &[]), &[], &[]).await.unwrap();
        let registry = registry(store);

        registry
            .tracker()
            .track("pay", "route:POST /pay/callback")
            .await
            .unwrap();
        assert!(registry.is_in_use("pay").await.unwrap());

        registry.delete("pay").await.unwrap();
        assert!(!registry.is_in_use("pay").await.unwrap());
        assert!(registry.get("pay").await.unwrap().is_none());
        assert!(matches!(
            registry.delete("pay").await.unwrap_err(),
            PluginError::NotInstalled(_)
        ));
    }
}
