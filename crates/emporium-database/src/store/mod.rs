//! Persistence ports used by the plugin runtime.
//!
//! The relational store is the system of record for plugins, their
//! registrations, and their data. Every method is a single structured
//! command; errors surface as [`AppError`] with kind `Database`.

pub mod identifier;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use emporium_core::result::AppResult;
use emporium_entity::audit::UninstallAudit;
use emporium_entity::backup::{BackupRecord, NewBackupRecord};
use emporium_entity::data::PluginDataEntry;
use emporium_entity::handler::{
    EventListener, HookRegistration, NewEventListener, NewHookRegistration,
};
use emporium_entity::plugin::{NewPlugin, Plugin, PluginStatus};

use crate::memory::MemoryStore;
use crate::repositories::{PluginDataRepositoryPg, PluginRepository, SchemaRepository};

pub use identifier::{ensure_safe_identifier, is_safe_identifier};

/// Registry of plugins, their hook registrations, listeners, and backups.
#[async_trait]
pub trait PluginStore: Send + Sync + std::fmt::Debug + 'static {
    /// Create a plugin together with its registrations in one step.
    ///
    /// An existing row is replaced only when it is `uninstalled`; any other
    /// existing row yields a `Conflict` error.
    async fn install_plugin(
        &self,
        plugin: &NewPlugin,
        hooks: &[NewHookRegistration],
        listeners: &[NewEventListener],
    ) -> AppResult<Plugin>;

    /// Find a plugin by ID.
    async fn find_plugin(&self, id: &str) -> AppResult<Option<Plugin>>;

    /// List all plugin rows, including uninstalled ones, ordered by ID.
    async fn list_plugins(&self) -> AppResult<Vec<Plugin>>;

    /// Update status and enablement. Returns `false` if the plugin does not exist.
    async fn set_plugin_state(
        &self,
        id: &str,
        status: PluginStatus,
        is_enabled: bool,
    ) -> AppResult<bool>;

    /// Mark a plugin uninstalled and delete its hook and listener registrations.
    async fn mark_uninstalled(&self, id: &str) -> AppResult<bool>;

    /// Persist the audit of an uninstall attempt onto the plugin row.
    async fn record_uninstall_audit(&self, id: &str, audit: &UninstallAudit) -> AppResult<()>;

    /// Physically delete a plugin; registrations and data cascade.
    async fn delete_plugin(&self, id: &str) -> AppResult<bool>;

    /// Claim an installed plugin for uninstall. Returns `false` if the plugin
    /// is missing, already uninstalled, or claimed by another runtime. A
    /// claim older than `stale_after` is treated as abandoned and taken over.
    async fn begin_uninstall(&self, id: &str, stale_after: Duration) -> AppResult<bool>;

    /// Release the uninstall claim.
    async fn finish_uninstall(&self, id: &str) -> AppResult<()>;

    /// Record a live resource of a plugin. Returns `false` if already tracked.
    async fn track_resource(&self, plugin_id: &str, resource: &str) -> AppResult<bool>;

    /// Forget one resource. Returns `true` if it was tracked.
    async fn release_resource(&self, plugin_id: &str, resource: &str) -> AppResult<bool>;

    /// Forget every resource of a plugin. Returns how many were tracked.
    async fn release_resources(&self, plugin_id: &str) -> AppResult<u64>;

    /// Tracked resources of a plugin, sorted.
    async fn find_resources(&self, plugin_id: &str) -> AppResult<Vec<String>>;

    /// Register a hook handler.
    async fn insert_hook(&self, hook: &NewHookRegistration) -> AppResult<HookRegistration>;

    /// Enabled registrations of enabled plugins for a hook, in dispatch order
    /// (priority ascending, then creation order).
    async fn find_active_hooks(&self, hook_name: &str) -> AppResult<Vec<HookRegistration>>;

    /// All registrations owned by a plugin.
    async fn find_hooks_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<HookRegistration>>;

    /// Every persisted hook registration.
    async fn find_all_hooks(&self) -> AppResult<Vec<HookRegistration>>;

    /// Enable or disable a single registration.
    async fn set_hook_enabled(&self, id: i64, is_enabled: bool) -> AppResult<bool>;

    /// Register an event listener.
    async fn insert_listener(&self, listener: &NewEventListener) -> AppResult<EventListener>;

    /// Enabled listeners of enabled plugins for an event, in registration order.
    async fn find_active_listeners(&self, event_name: &str) -> AppResult<Vec<EventListener>>;

    /// All listeners owned by a plugin.
    async fn find_listeners_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<EventListener>>;

    /// Every persisted listener.
    async fn find_all_listeners(&self) -> AppResult<Vec<EventListener>>;

    /// Persist a backup record.
    async fn insert_backup(&self, backup: &NewBackupRecord) -> AppResult<BackupRecord>;

    /// Find a backup record by ID.
    async fn find_backup(&self, id: Uuid) -> AppResult<Option<BackupRecord>>;

    /// Backups of a plugin, newest first.
    async fn find_backups_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<BackupRecord>>;
}

/// Key/value data scoped by plugin.
#[async_trait]
pub trait PluginDataRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert or replace the value under `(plugin_id, key)`.
    async fn upsert(
        &self,
        plugin_id: &str,
        key: &str,
        value: &serde_json::Value,
        data_type: &str,
    ) -> AppResult<PluginDataEntry>;

    /// Find a single entry.
    async fn find(&self, plugin_id: &str, key: &str) -> AppResult<Option<PluginDataEntry>>;

    /// All entries of a plugin, optionally restricted to one data type, ordered by key.
    async fn find_all(
        &self,
        plugin_id: &str,
        data_type: Option<&str>,
    ) -> AppResult<Vec<PluginDataEntry>>;

    /// Delete a single entry. Returns `true` if it existed.
    async fn delete(&self, plugin_id: &str, key: &str) -> AppResult<bool>;

    /// Delete every entry of a plugin. Returns the number of rows removed.
    async fn delete_all(&self, plugin_id: &str) -> AppResult<u64>;
}

/// A foreign-key edge: `table` references `references`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ForeignKey {
    /// Referencing table.
    pub table: String,
    /// Referenced table.
    pub references: String,
}

/// Schema-level commands used to discover and remove plugin-owned tables.
///
/// Table names must pass [`is_safe_identifier`]; implementations reject
/// anything else with a `Validation` error.
#[async_trait]
pub trait SchemaManager: Send + Sync + std::fmt::Debug + 'static {
    /// Names of all base tables in the current schema.
    async fn list_tables(&self) -> AppResult<Vec<String>>;

    /// All foreign-key edges in the current schema.
    async fn foreign_keys(&self) -> AppResult<Vec<ForeignKey>>;

    /// Drop a table. Dropping a table that does not exist is not an error.
    async fn drop_table(&self, table: &str) -> AppResult<()>;

    /// Delete rows whose `column` equals `value`. Returns the number removed.
    async fn delete_rows(&self, table: &str, column: &str, value: &str) -> AppResult<u64>;

    /// Remove every row of a table.
    async fn truncate_table(&self, table: &str) -> AppResult<()>;
}

/// The three stores the runtime needs, sharing one backend.
#[derive(Debug, Clone)]
pub struct StoreSet {
    /// Plugin registry store.
    pub plugins: Arc<dyn PluginStore>,
    /// Plugin data store.
    pub data: Arc<dyn PluginDataRepository>,
    /// Schema commands.
    pub schema: Arc<dyn SchemaManager>,
}

impl StoreSet {
    /// PostgreSQL-backed stores.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            plugins: Arc::new(PluginRepository::new(pool.clone())),
            data: Arc::new(PluginDataRepositoryPg::new(pool.clone())),
            schema: Arc::new(SchemaRepository::new(pool)),
        }
    }

    /// Stores backed by a shared in-memory state.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            plugins: store.clone(),
            data: store.clone(),
            schema: store,
        }
    }
}
