//! Plugin manager: owns and wires every runtime component.

use std::sync::Arc;

use tracing::{info, warn};

use emporium_core::config::PluginConfig;
use emporium_core::traits::AssetStorage;
use emporium_database::StoreSet;

use crate::data::PluginDataStore;
use crate::error::PluginResult;
use crate::events::EventBus;
use crate::hooks::HookDispatcher;
use crate::lifecycle::LifecycleManager;
use crate::loader::ScriptLoader;
use crate::registry::{InvalidHandler, PluginRegistry};
use crate::tracker::ResourceTracker;

/// The plugin runtime, constructed once at process start and shared by
/// the host's extension points and the administrative surface.
#[derive(Debug, Clone)]
pub struct PluginManager {
    /// Plugin registry.
    registry: Arc<PluginRegistry>,
    /// Hook dispatcher.
    dispatcher: Arc<HookDispatcher>,
    /// Event bus.
    events: Arc<EventBus>,
    /// Plugin data store.
    data: Arc<PluginDataStore>,
    /// Lifecycle manager.
    lifecycle: Arc<LifecycleManager>,
    /// Handler loader.
    loader: Arc<ScriptLoader>,
}

impl PluginManager {
    /// Build the runtime over the given stores and asset storage.
    pub fn new(stores: StoreSet, storage: Arc<dyn AssetStorage>, config: &PluginConfig) -> Self {
        let loader = Arc::new(ScriptLoader::from_config(config));
        let tracker = Arc::new(ResourceTracker::new(stores.plugins.clone()));
        let registry = Arc::new(PluginRegistry::new(
            stores.plugins.clone(),
            loader.clone(),
            tracker,
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            registry.clone(),
            &stores,
            storage,
            loader.clone(),
            config,
        ));

        Self {
            dispatcher: Arc::new(HookDispatcher::new(stores.plugins.clone(), loader.clone())),
            events: Arc::new(EventBus::new(stores.plugins.clone(), loader.clone())),
            data: Arc::new(PluginDataStore::new(stores.data.clone())),
            registry,
            lifecycle,
            loader,
        }
    }

    /// Returns the hook dispatcher for host extension points.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Returns the event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the plugin data store.
    pub fn data(&self) -> &Arc<PluginDataStore> {
        &self.data
    }

    /// Returns the lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Returns the handler loader.
    pub fn loader(&self) -> &Arc<ScriptLoader> {
        &self.loader
    }

    /// Validate every persisted handler and log the broken ones.
    pub async fn validate_persisted(&self) -> PluginResult<Vec<InvalidHandler>> {
        let invalid = self.registry.validate_all().await?;
        if invalid.is_empty() {
            info!("All persisted plugin handlers load");
        } else {
            for handler in &invalid {
                warn!(
                    plugin_id = %handler.plugin_id,
                    handler = %handler.label,
                    kind = ?handler.kind,
                    error = %handler.error,
                    "Broken plugin handler will be skipped at dispatch"
                );
            }
            warn!(count = invalid.len(), "Persisted plugin handlers failed validation");
        }
        Ok(invalid)
    }
}
