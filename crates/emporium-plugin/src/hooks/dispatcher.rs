//! Hook dispatcher: threads a value through every enabled handler of a hook.
//!
//! Handlers are read from the store on every call (enabled plugin and
//! enabled registration), ordered by priority ascending and then by
//! registration order. Each handler receives the previous handler's
//! output. A handler that fails to load, throws, times out, or returns a
//! value that cannot be represented as JSON is logged and skipped; the
//! value it received is passed on unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use emporium_database::PluginStore;
use emporium_entity::handler::HookRegistration;

use super::context::HookContext;
use crate::error::{HandlerFailure, PluginResult};
use crate::loader::ScriptLoader;

/// Outcome of a dispatch, for callers that want to observe skipped handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Final value of the chain.
    pub value: Value,
    /// Number of handlers that ran successfully.
    pub executed: usize,
    /// Handlers that were skipped, in dispatch order.
    pub skipped: Vec<HandlerFailure>,
}

/// Dispatches hooks to persisted handlers.
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    store: Arc<dyn PluginStore>,
    loader: Arc<ScriptLoader>,
}

impl HookDispatcher {
    /// Create a new dispatcher.
    pub fn new(store: Arc<dyn PluginStore>, loader: Arc<ScriptLoader>) -> Self {
        Self { store, loader }
    }

    /// Apply every enabled handler of `hook_name` to `value`.
    ///
    /// Returns `value` unchanged when no handler is registered. Handler
    /// failures never surface here; only a failure to read registrations
    /// from the store does, in which case the input is returned as-is.
    pub async fn apply(&self, hook_name: &str, value: Value, context: &HookContext) -> Value {
        match self.apply_with_report(hook_name, value.clone(), context).await {
            Ok(report) => report.value,
            Err(e) => {
                warn!(hook = %hook_name, error = %e, "Failed to load hook registrations; returning input");
                value
            }
        }
    }

    /// Apply the hook and report which handlers ran and which were skipped.
    pub async fn apply_with_report(
        &self,
        hook_name: &str,
        value: Value,
        context: &HookContext,
    ) -> PluginResult<DispatchReport> {
        let handlers = self.store.find_active_hooks(hook_name).await?;

        let mut report = DispatchReport {
            value,
            executed: 0,
            skipped: Vec::new(),
        };
        if handlers.is_empty() {
            return Ok(report);
        }

        debug!(
            hook = %hook_name,
            handler_count = handlers.len(),
            "Dispatching hook"
        );

        for handler in &handlers {
            match self.run(handler, &report.value, context).await {
                Ok(Some(next)) => {
                    report.value = next;
                    report.executed += 1;
                }
                Ok(None) => report.executed += 1,
                Err(message) => {
                    warn!(
                        hook = %hook_name,
                        plugin_id = %handler.plugin_id,
                        handler_id = handler.id,
                        error = %message,
                        "Hook handler skipped"
                    );
                    report.skipped.push(HandlerFailure {
                        plugin_id: handler.plugin_id.clone(),
                        handler_id: handler.id,
                        handler: handler.label(),
                        message,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn run(
        &self,
        handler: &HookRegistration,
        value: &Value,
        context: &HookContext,
    ) -> Result<Option<Value>, String> {
        let script = self.loader.load(&handler.source).map_err(|e| e.to_string())?;
        let meta = json!({
            "plugin": handler.plugin_id,
            "hook": handler.hook_name,
            "handler_id": handler.id,
            "priority": handler.priority,
        });
        self.loader
            .invoke(
                &script,
                &handler.plugin_id,
                &handler.label(),
                value.clone(),
                context.render(meta),
            )
            .await
            .map_err(|e| e.to_string())
    }
}
