//! In-memory implementation of the persistence ports.
//!
//! Mirrors the PostgreSQL semantics the runtime relies on: cascading
//! deletes, the `(plugin_id, data_key)` upsert, foreign-key checks on plugin
//! data, dispatch ordering, and refusing to drop a table that another table
//! still references. It also simulates a small relational schema so table
//! discovery and cleanup can be exercised without a database.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use emporium_core::error::AppError;
use emporium_core::result::AppResult;
use emporium_entity::audit::UninstallAudit;
use emporium_entity::backup::{BackupRecord, NewBackupRecord};
use emporium_entity::data::PluginDataEntry;
use emporium_entity::handler::{
    EventListener, HookRegistration, NewEventListener, NewHookRegistration,
};
use emporium_entity::plugin::{NewPlugin, Plugin, PluginStatus};

use crate::store::identifier::ensure_safe_identifier;
use crate::store::{ForeignKey, PluginDataRepository, PluginStore, SchemaManager};

/// Tables the runtime itself owns; present in every fresh store.
const RUNTIME_TABLES: &[&str] = &[
    "plugins",
    "plugin_hooks",
    "plugin_event_listeners",
    "plugin_data",
    "plugin_backups",
    "plugin_resources",
];

/// A row of a simulated table: column name to textual value.
pub type MemoryRow = BTreeMap<String, String>;

/// Point-in-time copy of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    /// Plugin rows by ID.
    pub plugins: BTreeMap<String, Plugin>,
    /// Hook registrations in creation order.
    pub hooks: Vec<HookRegistration>,
    /// Event listeners in creation order.
    pub listeners: Vec<EventListener>,
    /// Plugin data by `(plugin_id, data_key)`.
    pub data: BTreeMap<(String, String), PluginDataEntry>,
    /// Backup records in creation order.
    pub backups: Vec<BackupRecord>,
    /// Tracked live resources by plugin.
    pub resources: BTreeMap<String, BTreeSet<String>>,
    /// Simulated tables and their rows.
    pub tables: BTreeMap<String, Vec<MemoryRow>>,
    /// Simulated foreign-key edges.
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Default)]
struct State {
    db: MemorySnapshot,
    next_hook_id: i64,
    next_listener_id: i64,
    failing_drops: HashSet<String>,
}

/// Shared in-memory store implementing every persistence port.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store containing only the runtime's own tables.
    pub fn new() -> Self {
        let mut state = State::default();
        for table in RUNTIME_TABLES {
            state.db.tables.insert((*table).to_string(), Vec::new());
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy the full state for later comparison.
    pub async fn snapshot(&self) -> MemorySnapshot {
        self.state.read().await.db.clone()
    }

    /// Create an empty simulated table (no-op if it exists).
    pub async fn create_table(&self, name: &str) {
        self.state
            .write()
            .await
            .db
            .tables
            .entry(name.to_string())
            .or_default();
    }

    /// Append a row to a simulated table, creating the table if needed.
    pub async fn insert_row<I, K, V>(&self, table: &str, row: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let row: MemoryRow = row
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.state
            .write()
            .await
            .db
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Declare that `table` references `references`.
    pub async fn add_foreign_key(&self, table: &str, references: &str) {
        let edge = ForeignKey {
            table: table.to_string(),
            references: references.to_string(),
        };
        let mut state = self.state.write().await;
        if !state.db.foreign_keys.contains(&edge) {
            state.db.foreign_keys.push(edge);
        }
    }

    /// Make every subsequent `drop_table` of `table` fail.
    pub async fn fail_drop(&self, table: &str) {
        self.state
            .write()
            .await
            .failing_drops
            .insert(table.to_string());
    }

    /// Whether a simulated table exists.
    pub async fn has_table(&self, table: &str) -> bool {
        self.state.read().await.db.tables.contains_key(table)
    }

    /// Number of rows in a simulated table.
    pub async fn row_count(&self, table: &str) -> Option<usize> {
        self.state.read().await.db.tables.get(table).map(Vec::len)
    }
}

fn is_dispatchable(plugins: &BTreeMap<String, Plugin>, plugin_id: &str) -> bool {
    plugins
        .get(plugin_id)
        .is_some_and(|p| p.is_enabled && p.status == PluginStatus::Active)
}

#[async_trait]
impl PluginStore for MemoryStore {
    async fn install_plugin(
        &self,
        plugin: &NewPlugin,
        hooks: &[NewHookRegistration],
        listeners: &[NewEventListener],
    ) -> AppResult<Plugin> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let previous_audit = match state.db.plugins.get(&plugin.id) {
            Some(existing) if existing.is_installed() => {
                return Err(AppError::conflict(format!(
                    "Plugin '{}' is already installed",
                    plugin.id
                )));
            }
            Some(existing) => existing.uninstall_audit.clone(),
            None => None,
        };

        let created = Plugin {
            id: plugin.id.clone(),
            name: plugin.name.clone(),
            version: plugin.version.clone(),
            description: plugin.description.clone(),
            status: PluginStatus::Installed,
            is_enabled: false,
            manifest: Json(plugin.manifest.clone()),
            plugin_path: plugin.plugin_path.clone(),
            installed_at: now,
            updated_at: now,
            uninstalled_at: None,
            uninstall_started_at: None,
            uninstall_audit: previous_audit,
        };
        state.db.plugins.insert(created.id.clone(), created.clone());

        for hook in hooks {
            state.next_hook_id += 1;
            let id = state.next_hook_id;
            state.db.hooks.push(HookRegistration {
                id,
                plugin_id: created.id.clone(),
                hook_name: hook.hook_name.clone(),
                priority: hook.priority,
                is_enabled: true,
                source: hook.source.clone(),
                created_at: now,
                updated_at: now,
            });
        }
        for listener in listeners {
            state.next_listener_id += 1;
            let id = state.next_listener_id;
            state.db.listeners.push(EventListener {
                id,
                plugin_id: created.id.clone(),
                event_name: listener.event_name.clone(),
                file_name: listener.file_name.clone(),
                is_enabled: true,
                source: listener.source.clone(),
                created_at: now,
            });
        }

        Ok(created)
    }

    async fn find_plugin(&self, id: &str) -> AppResult<Option<Plugin>> {
        Ok(self.state.read().await.db.plugins.get(id).cloned())
    }

    async fn list_plugins(&self) -> AppResult<Vec<Plugin>> {
        Ok(self.state.read().await.db.plugins.values().cloned().collect())
    }

    async fn set_plugin_state(
        &self,
        id: &str,
        status: PluginStatus,
        is_enabled: bool,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(plugin) = state.db.plugins.get_mut(id) else {
            return Ok(false);
        };
        plugin.status = status;
        plugin.is_enabled = is_enabled;
        plugin.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_uninstalled(&self, id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(plugin) = state.db.plugins.get_mut(id) else {
            return Ok(false);
        };
        plugin.status = PluginStatus::Uninstalled;
        plugin.is_enabled = false;
        plugin.uninstalled_at = Some(now);
        plugin.updated_at = now;
        state.db.hooks.retain(|h| h.plugin_id != id);
        state.db.listeners.retain(|l| l.plugin_id != id);
        Ok(true)
    }

    async fn record_uninstall_audit(&self, id: &str, audit: &UninstallAudit) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(plugin) = state.db.plugins.get_mut(id) {
            plugin.uninstall_audit = Some(Json(audit.clone()));
            plugin.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_plugin(&self, id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.db.plugins.remove(id).is_none() {
            return Ok(false);
        }
        state.db.hooks.retain(|h| h.plugin_id != id);
        state.db.listeners.retain(|l| l.plugin_id != id);
        state.db.data.retain(|(plugin_id, _), _| plugin_id != id);
        state.db.resources.remove(id);
        Ok(true)
    }

    async fn begin_uninstall(&self, id: &str, stale_after: Duration) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(plugin) = state.db.plugins.get_mut(id) else {
            return Ok(false);
        };
        let claimable = plugin.is_installed()
            && plugin.uninstall_started_at.is_none_or(|started| {
                now.checked_sub_signed(stale_after)
                    .is_some_and(|cutoff| started < cutoff)
            });
        if claimable {
            plugin.uninstall_started_at = Some(now);
        }
        Ok(claimable)
    }

    async fn finish_uninstall(&self, id: &str) -> AppResult<()> {
        if let Some(plugin) = self.state.write().await.db.plugins.get_mut(id) {
            plugin.uninstall_started_at = None;
        }
        Ok(())
    }

    async fn track_resource(&self, plugin_id: &str, resource: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if !state.db.plugins.contains_key(plugin_id) {
            return Err(AppError::not_found(format!("Plugin '{plugin_id}' not found")));
        }
        Ok(state
            .db
            .resources
            .entry(plugin_id.to_string())
            .or_default()
            .insert(resource.to_string()))
    }

    async fn release_resource(&self, plugin_id: &str, resource: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(set) = state.db.resources.get_mut(plugin_id) else {
            return Ok(false);
        };
        let removed = set.remove(resource);
        if set.is_empty() {
            state.db.resources.remove(plugin_id);
        }
        Ok(removed)
    }

    async fn release_resources(&self, plugin_id: &str) -> AppResult<u64> {
        Ok(self
            .state
            .write()
            .await
            .db
            .resources
            .remove(plugin_id)
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }

    async fn find_resources(&self, plugin_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .db
            .resources
            .get(plugin_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_hook(&self, hook: &NewHookRegistration) -> AppResult<HookRegistration> {
        let mut state = self.state.write().await;
        if !state.db.plugins.contains_key(&hook.plugin_id) {
            return Err(AppError::not_found(format!(
                "Plugin '{}' not found",
                hook.plugin_id
            )));
        }
        state.next_hook_id += 1;
        let now = Utc::now();
        let registration = HookRegistration {
            id: state.next_hook_id,
            plugin_id: hook.plugin_id.clone(),
            hook_name: hook.hook_name.clone(),
            priority: hook.priority,
            is_enabled: true,
            source: hook.source.clone(),
            created_at: now,
            updated_at: now,
        };
        state.db.hooks.push(registration.clone());
        Ok(registration)
    }

    async fn find_active_hooks(&self, hook_name: &str) -> AppResult<Vec<HookRegistration>> {
        let state = self.state.read().await;
        let mut hooks: Vec<HookRegistration> = state
            .db
            .hooks
            .iter()
            .filter(|h| h.hook_name == hook_name && h.is_enabled)
            .filter(|h| is_dispatchable(&state.db.plugins, &h.plugin_id))
            .cloned()
            .collect();
        hooks.sort_by_key(|h| (h.priority, h.id));
        Ok(hooks)
    }

    async fn find_hooks_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<HookRegistration>> {
        let state = self.state.read().await;
        let mut hooks: Vec<HookRegistration> = state
            .db
            .hooks
            .iter()
            .filter(|h| h.plugin_id == plugin_id)
            .cloned()
            .collect();
        hooks.sort_by(|a, b| {
            (&a.hook_name, a.priority, a.id).cmp(&(&b.hook_name, b.priority, b.id))
        });
        Ok(hooks)
    }

    async fn find_all_hooks(&self) -> AppResult<Vec<HookRegistration>> {
        Ok(self.state.read().await.db.hooks.clone())
    }

    async fn set_hook_enabled(&self, id: i64, is_enabled: bool) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(hook) = state.db.hooks.iter_mut().find(|h| h.id == id) else {
            return Ok(false);
        };
        hook.is_enabled = is_enabled;
        hook.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_listener(&self, listener: &NewEventListener) -> AppResult<EventListener> {
        let mut state = self.state.write().await;
        if !state.db.plugins.contains_key(&listener.plugin_id) {
            return Err(AppError::not_found(format!(
                "Plugin '{}' not found",
                listener.plugin_id
            )));
        }
        state.next_listener_id += 1;
        let created = EventListener {
            id: state.next_listener_id,
            plugin_id: listener.plugin_id.clone(),
            event_name: listener.event_name.clone(),
            file_name: listener.file_name.clone(),
            is_enabled: true,
            source: listener.source.clone(),
            created_at: Utc::now(),
        };
        state.db.listeners.push(created.clone());
        Ok(created)
    }

    async fn find_active_listeners(&self, event_name: &str) -> AppResult<Vec<EventListener>> {
        let state = self.state.read().await;
        Ok(state
            .db
            .listeners
            .iter()
            .filter(|l| l.event_name == event_name && l.is_enabled)
            .filter(|l| is_dispatchable(&state.db.plugins, &l.plugin_id))
            .cloned()
            .collect())
    }

    async fn find_listeners_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<EventListener>> {
        let state = self.state.read().await;
        let mut listeners: Vec<EventListener> = state
            .db
            .listeners
            .iter()
            .filter(|l| l.plugin_id == plugin_id)
            .cloned()
            .collect();
        listeners.sort_by(|a, b| (&a.event_name, a.id).cmp(&(&b.event_name, b.id)));
        Ok(listeners)
    }

    async fn find_all_listeners(&self) -> AppResult<Vec<EventListener>> {
        Ok(self.state.read().await.db.listeners.clone())
    }

    async fn insert_backup(&self, backup: &NewBackupRecord) -> AppResult<BackupRecord> {
        let record = BackupRecord {
            id: Uuid::now_v7(),
            plugin_id: backup.plugin_id.clone(),
            location: backup.location.clone(),
            includes_code: backup.includes_code,
            includes_data: backup.includes_data,
            manifest_snapshot: backup.manifest_snapshot.clone(),
            restore_instructions: backup.restore_instructions.clone(),
            created_at: Utc::now(),
        };
        self.state.write().await.db.backups.push(record.clone());
        Ok(record)
    }

    async fn find_backup(&self, id: Uuid) -> AppResult<Option<BackupRecord>> {
        Ok(self
            .state
            .read()
            .await
            .db
            .backups
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn find_backups_by_plugin(&self, plugin_id: &str) -> AppResult<Vec<BackupRecord>> {
        Ok(self
            .state
            .read()
            .await
            .db
            .backups
            .iter()
            .rev()
            .filter(|b| b.plugin_id == plugin_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PluginDataRepository for MemoryStore {
    async fn upsert(
        &self,
        plugin_id: &str,
        key: &str,
        value: &serde_json::Value,
        data_type: &str,
    ) -> AppResult<PluginDataEntry> {
        let mut state = self.state.write().await;
        if !state.db.plugins.contains_key(plugin_id) {
            return Err(AppError::not_found(format!("Plugin '{plugin_id}' not found")));
        }
        let now = Utc::now();
        let entry = state
            .db
            .data
            .entry((plugin_id.to_string(), key.to_string()))
            .and_modify(|e| {
                e.data_value = value.clone();
                e.data_type = data_type.to_string();
                e.updated_at = now;
            })
            .or_insert_with(|| PluginDataEntry {
                plugin_id: plugin_id.to_string(),
                data_key: key.to_string(),
                data_value: value.clone(),
                data_type: data_type.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(entry.clone())
    }

    async fn find(&self, plugin_id: &str, key: &str) -> AppResult<Option<PluginDataEntry>> {
        Ok(self
            .state
            .read()
            .await
            .db
            .data
            .get(&(plugin_id.to_string(), key.to_string()))
            .cloned())
    }

    async fn find_all(
        &self,
        plugin_id: &str,
        data_type: Option<&str>,
    ) -> AppResult<Vec<PluginDataEntry>> {
        Ok(self
            .state
            .read()
            .await
            .db
            .data
            .values()
            .filter(|e| e.plugin_id == plugin_id)
            .filter(|e| data_type.is_none_or(|t| e.data_type == t))
            .cloned()
            .collect())
    }

    async fn delete(&self, plugin_id: &str, key: &str) -> AppResult<bool> {
        Ok(self
            .state
            .write()
            .await
            .db
            .data
            .remove(&(plugin_id.to_string(), key.to_string()))
            .is_some())
    }

    async fn delete_all(&self, plugin_id: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let before = state.db.data.len();
        state.db.data.retain(|(owner, _), _| owner != plugin_id);
        Ok((before - state.db.data.len()) as u64)
    }
}

#[async_trait]
impl SchemaManager for MemoryStore {
    async fn list_tables(&self) -> AppResult<Vec<String>> {
        Ok(self.state.read().await.db.tables.keys().cloned().collect())
    }

    async fn foreign_keys(&self) -> AppResult<Vec<ForeignKey>> {
        Ok(self.state.read().await.db.foreign_keys.clone())
    }

    async fn drop_table(&self, table: &str) -> AppResult<()> {
        ensure_safe_identifier(table)?;
        let mut state = self.state.write().await;
        if state.failing_drops.contains(table) {
            return Err(AppError::database(format!(
                "Failed to drop table '{table}': simulated failure"
            )));
        }
        if !state.db.tables.contains_key(table) {
            return Ok(());
        }
        let dependent = state
            .db
            .foreign_keys
            .iter()
            .find(|fk| fk.references == table && fk.table != table)
            .map(|fk| fk.table.clone());
        if let Some(dependent) = dependent {
            return Err(AppError::database(format!(
                "Cannot drop table '{table}' because table '{dependent}' depends on it"
            )));
        }
        state.db.tables.remove(table);
        state.db.foreign_keys.retain(|fk| fk.table != table);
        Ok(())
    }

    async fn delete_rows(&self, table: &str, column: &str, value: &str) -> AppResult<u64> {
        ensure_safe_identifier(table)?;
        ensure_safe_identifier(column)?;
        let mut state = self.state.write().await;
        let Some(rows) = state.db.tables.get_mut(table) else {
            return Err(AppError::database(format!(
                "Table '{table}' does not exist"
            )));
        };
        let before = rows.len();
        rows.retain(|row| row.get(column).map(String::as_str) != Some(value));
        Ok((before - rows.len()) as u64)
    }

    async fn truncate_table(&self, table: &str) -> AppResult<()> {
        ensure_safe_identifier(table)?;
        let mut state = self.state.write().await;
        let Some(rows) = state.db.tables.get_mut(table) else {
            return Err(AppError::database(format!(
                "Table '{table}' does not exist"
            )));
        };
        rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emporium_entity::plugin::PluginManifest;
    use serde_json::json;

    fn new_plugin(id: &str) -> NewPlugin {
        NewPlugin {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            manifest: PluginManifest::default(),
            plugin_path: None,
        }
    }

    fn hook(name: &str, priority: i32) -> NewHookRegistration {
        NewHookRegistration {
            plugin_id: String::new(),
            hook_name: name.to_string(),
            priority,
            source: "fn handle(v, c) { v }".to_string(),
        }
    }

    #[tokio::test]
    async fn test_install_conflicts_unless_uninstalled() {
        let store = MemoryStore::new();
        store
            .install_plugin(&new_plugin("seo"), &[], &[])
            .await
            .unwrap();
        let err = store
            .install_plugin(&new_plugin("seo"), &[], &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, emporium_core::error::ErrorKind::Conflict);

        store.mark_uninstalled("seo").await.unwrap();
        let again = store
            .install_plugin(&new_plugin("seo"), &[], &[])
            .await
            .unwrap();
        assert_eq!(again.status, PluginStatus::Installed);
        assert!(!again.is_enabled);
    }

    #[tokio::test]
    async fn test_active_hooks_ordered_and_filtered() {
        let store = MemoryStore::new();
        store
            .install_plugin(
                &new_plugin("a"),
                &[hook("cart.total", 10), hook("cart.total", 5), hook("other", 1)],
                &[],
            )
            .await
            .unwrap();
        store
            .install_plugin(&new_plugin("b"), &[hook("cart.total", 5)], &[])
            .await
            .unwrap();

        assert!(store.find_active_hooks("cart.total").await.unwrap().is_empty());

        store
            .set_plugin_state("a", PluginStatus::Active, true)
            .await
            .unwrap();
        store
            .set_plugin_state("b", PluginStatus::Active, true)
            .await
            .unwrap();

        let hooks = store.find_active_hooks("cart.total").await.unwrap();
        let order: Vec<(String, i32)> = hooks
            .iter()
            .map(|h| (h.plugin_id.clone(), h.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 5),
                ("b".to_string(), 5),
                ("a".to_string(), 10)
            ]
        );

        store.set_hook_enabled(hooks[0].id, false).await.unwrap();
        assert_eq!(store.find_active_hooks("cart.total").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_data_upsert_and_cascade() {
        let store = MemoryStore::new();
        store
            .install_plugin(&new_plugin("p"), &[hook("h", 1)], &[])
            .await
            .unwrap();

        let missing = store.upsert("ghost", "k", &json!(1), "json").await;
        assert!(missing.is_err());

        store.upsert("p", "k", &json!(1), "json").await.unwrap();
        let updated = store.upsert("p", "k", &json!(2), "config").await.unwrap();
        assert_eq!(updated.data_value, json!(2));
        assert_eq!(store.find_all("p", None).await.unwrap().len(), 1);
        assert_eq!(store.find_all("p", Some("json")).await.unwrap().len(), 0);

        assert!(store.delete_plugin("p").await.unwrap());
        assert!(store.find_all("p", None).await.unwrap().is_empty());
        assert!(store.find_all_hooks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_respects_foreign_keys() {
        let store = MemoryStore::new();
        store.create_table("loyalty_accounts").await;
        store.create_table("loyalty_ledger").await;
        store
            .add_foreign_key("loyalty_ledger", "loyalty_accounts")
            .await;

        assert!(store.drop_table("loyalty_accounts").await.is_err());
        store.drop_table("loyalty_ledger").await.unwrap();
        store.drop_table("loyalty_accounts").await.unwrap();
        assert!(!store.has_table("loyalty_accounts").await);
        store.drop_table("loyalty_accounts").await.unwrap();
    }

    #[tokio::test]
    async fn test_uninstall_claim_is_exclusive_until_released_or_stale() {
        let store = MemoryStore::new();
        let hour = Duration::hours(1);
        assert!(!store.begin_uninstall("promo", hour).await.unwrap());

        store
            .install_plugin(&new_plugin("promo"), &[], &[])
            .await
            .unwrap();
        assert!(store.begin_uninstall("promo", hour).await.unwrap());
        assert!(!store.begin_uninstall("promo", hour).await.unwrap());
        assert!(store.begin_uninstall("promo", -Duration::seconds(1)).await.unwrap());

        store.finish_uninstall("promo").await.unwrap();
        assert!(store.begin_uninstall("promo", hour).await.unwrap());

        store.mark_uninstalled("promo").await.unwrap();
        store.finish_uninstall("promo").await.unwrap();
        assert!(!store.begin_uninstall("promo", hour).await.unwrap());
    }

    #[tokio::test]
    async fn test_resources_are_tracked_per_plugin() {
        let store = MemoryStore::new();
        assert!(store.track_resource("pay", "route:POST /pay").await.is_err());

        store.install_plugin(&new_plugin("pay"), &[], &[]).await.unwrap();
        assert!(store.track_resource("pay", "route:POST /pay").await.unwrap());
        assert!(!store.track_resource("pay", "route:POST /pay").await.unwrap());
        store.track_resource("pay", "service:ledger").await.unwrap();
        assert_eq!(
            store.find_resources("pay").await.unwrap(),
            vec!["route:POST /pay", "service:ledger"]
        );

        assert!(store.release_resource("pay", "service:ledger").await.unwrap());
        assert_eq!(store.release_resources("pay").await.unwrap(), 1);
        assert!(store.find_resources("pay").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rows_matches_column() {
        let store = MemoryStore::new();
        store
            .insert_row("audit_log", [("source", "loyalty"), ("msg", "a")])
            .await;
        store
            .insert_row("audit_log", [("source", "seo"), ("msg", "b")])
            .await;
        let removed = store
            .delete_rows("audit_log", "source", "loyalty")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("audit_log").await, Some(1));
        assert!(store.delete_rows("audit_log; --", "source", "x").await.is_err());
    }
}
