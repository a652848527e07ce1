//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use emporium_core::config::AppConfig;
use emporium_plugin::PluginManager;

/// Application state passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Plugin runtime
    pub plugins: PluginManager,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Creates the state for a configured runtime.
    pub fn new(config: AppConfig, plugins: PluginManager) -> Self {
        Self {
            config: Arc::new(config),
            plugins,
            started_at: Instant::now(),
        }
    }
}
