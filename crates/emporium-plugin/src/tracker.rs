//! Live resource tracking for the in-use check.
//!
//! Resources are persisted through the [`PluginStore`], so every runtime
//! sharing the database (the server and any CLI invocation) sees the same
//! set when deciding whether a plugin is in use.

use std::sync::Arc;

use tracing::debug;

use emporium_database::PluginStore;

use crate::error::PluginResult;

/// Routes, services, and other live resources the host has wired up for
/// each plugin. A plugin with tracked resources is "in use".
#[derive(Debug, Clone)]
pub struct ResourceTracker {
    store: Arc<dyn PluginStore>,
}

impl ResourceTracker {
    /// Create a tracker over the shared store.
    pub fn new(store: Arc<dyn PluginStore>) -> Self {
        Self { store }
    }

    /// Record a live resource (e.g. `"route:GET /loyalty/points"`).
    pub async fn track(&self, plugin_id: &str, resource: impl Into<String>) -> PluginResult<()> {
        let resource = resource.into();
        debug!(plugin_id = %plugin_id, resource = %resource, "Tracking plugin resource");
        self.store.track_resource(plugin_id, &resource).await?;
        Ok(())
    }

    /// Forget a single resource. Returns `true` if it was tracked.
    pub async fn release(&self, plugin_id: &str, resource: &str) -> PluginResult<bool> {
        Ok(self.store.release_resource(plugin_id, resource).await?)
    }

    /// Forget every resource of a plugin. Returns how many were tracked.
    pub async fn release_all(&self, plugin_id: &str) -> PluginResult<u64> {
        Ok(self.store.release_resources(plugin_id).await?)
    }

    /// Resources currently tracked for a plugin, sorted.
    pub async fn resources(&self, plugin_id: &str) -> PluginResult<Vec<String>> {
        Ok(self.store.find_resources(plugin_id).await?)
    }

    /// Whether the plugin has any live resources.
    pub async fn is_in_use(&self, plugin_id: &str) -> PluginResult<bool> {
        Ok(!self.resources(plugin_id).await?.is_empty())
    }
}
