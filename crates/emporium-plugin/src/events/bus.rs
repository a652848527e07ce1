//! Event bus: notify every enabled listener of an event.
//!
//! Delivery is fire-and-await-all. Listeners run one after another in
//! registration order with the same payload; return values are ignored and
//! one listener's failure never prevents the next from running.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use emporium_database::PluginStore;
use emporium_entity::handler::EventListener;

use crate::error::{HandlerFailure, PluginError, PluginResult};
use crate::hooks::HookContext;
use crate::loader::ScriptLoader;

/// Outcome of an emit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitReport {
    /// Number of listeners that completed successfully.
    pub delivered: usize,
    /// Listeners that failed, in delivery order.
    pub failures: Vec<HandlerFailure>,
}

impl EmitReport {
    /// Whether every listener succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delivers events to persisted listeners.
#[derive(Debug, Clone)]
pub struct EventBus {
    store: Arc<dyn PluginStore>,
    loader: Arc<ScriptLoader>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new(store: Arc<dyn PluginStore>, loader: Arc<ScriptLoader>) -> Self {
        Self { store, loader }
    }

    /// Deliver `payload` to every enabled listener of `event_name`.
    ///
    /// Listener failures are logged and collected in the report. Only a
    /// failure to read listeners from the store is returned as an error.
    pub async fn emit(
        &self,
        event_name: &str,
        payload: Value,
        context: &HookContext,
    ) -> PluginResult<EmitReport> {
        let listeners = self.store.find_active_listeners(event_name).await?;
        let mut report = EmitReport::default();
        if listeners.is_empty() {
            return Ok(report);
        }

        debug!(
            event = %event_name,
            listener_count = listeners.len(),
            "Emitting event"
        );

        for listener in &listeners {
            match self.deliver(listener, &payload, context).await {
                Ok(()) => report.delivered += 1,
                Err(message) => {
                    warn!(
                        event = %event_name,
                        plugin_id = %listener.plugin_id,
                        handler_id = listener.id,
                        file = %listener.file_name,
                        error = %message,
                        "Event listener failed"
                    );
                    report.failures.push(HandlerFailure {
                        plugin_id: listener.plugin_id.clone(),
                        handler_id: listener.id,
                        handler: listener.label(),
                        message,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Like [`emit`](Self::emit), but returns the first listener failure as
    /// an error after every listener has run.
    pub async fn emit_strict(
        &self,
        event_name: &str,
        payload: Value,
        context: &HookContext,
    ) -> PluginResult<EmitReport> {
        let mut report = self.emit(event_name, payload, context).await?;
        if report.failures.is_empty() {
            return Ok(report);
        }
        let first = report.failures.swap_remove(0);
        Err(PluginError::HandlerRuntime {
            plugin_id: first.plugin_id,
            handler: first.handler,
            message: first.message,
        })
    }

    async fn deliver(
        &self,
        listener: &EventListener,
        payload: &Value,
        context: &HookContext,
    ) -> Result<(), String> {
        let script = self.loader.load(&listener.source).map_err(|e| e.to_string())?;
        let meta = json!({
            "plugin": listener.plugin_id,
            "event": listener.event_name,
            "file": listener.file_name,
            "listener_id": listener.id,
        });
        self.loader
            .invoke(
                &script,
                &listener.plugin_id,
                &listener.label(),
                payload.clone(),
                context.render(meta),
            )
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
