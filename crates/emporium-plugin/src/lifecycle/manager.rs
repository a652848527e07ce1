//! Plugin lifecycle: install, enable, disable, and the guarded uninstall.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use emporium_core::config::PluginConfig;
use emporium_core::error::{AppError, ErrorKind};
use emporium_core::traits::AssetStorage;
use emporium_database::{PluginStore, SchemaManager, StoreSet};
use emporium_entity::audit::{
    CleanupPhase, CleanupSummary, UninstallAudit, UninstallOptions, UninstallOutcome,
};
use emporium_entity::plugin::{DataCleanupDirective, Plugin, PluginStatus};

use super::cleanup::{TableGuard, TableOwners, plan_tables, tables_from_migration};
use super::package::{InstallRequest, read_migrations, read_package};
use crate::backup::BackupWriter;
use crate::data::PluginDataStore;
use crate::error::{PluginError, PluginResult};
use crate::loader::ScriptLoader;
use crate::registry::PluginRegistry;

/// Result of an uninstall, surfaced to the administrative caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallReport {
    /// Plugin that was uninstalled.
    pub plugin_id: String,
    /// Whether every phase completed without failures.
    pub success: bool,
    /// Terminal outcome.
    pub outcome: UninstallOutcome,
    /// Backup location, when one was written.
    pub backup_path: Option<String>,
    /// What was cleaned up and what failed.
    pub cleanup_summary: CleanupSummary,
}

/// Exclusive hold on one plugin's uninstall: the in-process marker plus,
/// once taken, the claim in the shared store that other runtimes respect.
struct UninstallGuard {
    in_progress: Arc<DashMap<String, DateTime<Utc>>>,
    store: Arc<dyn PluginStore>,
    plugin_id: String,
    claimed: bool,
}

impl UninstallGuard {
    /// Release the store claim, then the in-process marker.
    async fn release(mut self) {
        if self.claimed {
            if let Err(e) = self.store.finish_uninstall(&self.plugin_id).await {
                error!(plugin_id = %self.plugin_id, error = %e, "Failed to release uninstall claim");
            }
            self.claimed = false;
        }
    }
}

impl Drop for UninstallGuard {
    fn drop(&mut self) {
        self.in_progress.remove(&self.plugin_id);
        // Dropped without `release`, e.g. when the teardown task panicked.
        if self.claimed {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let store = self.store.clone();
                let plugin_id = self.plugin_id.clone();
                handle.spawn(async move {
                    if let Err(e) = store.finish_uninstall(&plugin_id).await {
                        error!(plugin_id = %plugin_id, error = %e, "Failed to release uninstall claim");
                    }
                });
            }
        }
    }
}

/// Orchestrates plugin state transitions.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    registry: Arc<PluginRegistry>,
    store: Arc<dyn PluginStore>,
    data: PluginDataStore,
    schema: Arc<dyn SchemaManager>,
    storage: Arc<dyn AssetStorage>,
    loader: Arc<ScriptLoader>,
    backups: BackupWriter,
    guard: TableGuard,
    in_progress: Arc<DashMap<String, DateTime<Utc>>>,
    claim_ttl: Duration,
}

impl LifecycleManager {
    /// Create a lifecycle manager.
    pub fn new(
        registry: Arc<PluginRegistry>,
        stores: &StoreSet,
        storage: Arc<dyn AssetStorage>,
        loader: Arc<ScriptLoader>,
        config: &PluginConfig,
    ) -> Self {
        Self {
            backups: BackupWriter::new(
                storage.clone(),
                stores.plugins.clone(),
                stores.data.clone(),
                config.backup_directory.clone(),
            ),
            registry,
            store: stores.plugins.clone(),
            data: PluginDataStore::new(stores.data.clone()),
            schema: stores.schema.clone(),
            storage,
            loader,
            guard: TableGuard::new(&config.protected_tables),
            in_progress: Arc::new(DashMap::new()),
            claim_ttl: Duration::seconds(
                config.uninstall_claim_ttl_seconds.min(i32::MAX as u64) as i64,
            ),
        }
    }

    /// Backup writer used by uninstall.
    pub fn backups(&self) -> &BackupWriter {
        &self.backups
    }

    /// Whether an uninstall of the plugin is running in this runtime or
    /// holds a live claim in the shared store.
    pub async fn is_uninstalling(&self, plugin_id: &str) -> PluginResult<bool> {
        if self.in_progress.contains_key(plugin_id) {
            return Ok(true);
        }
        let started = self
            .registry
            .get(plugin_id)
            .await?
            .and_then(|p| p.uninstall_started_at);
        Ok(started.is_some_and(|at| Utc::now().signed_duration_since(at) < self.claim_ttl))
    }

    /// Install a plugin in the `installed`, disabled state.
    ///
    /// Every bundled handler is validated first and every declared
    /// dependency must be installed; nothing is written otherwise.
    pub async fn install(&self, request: InstallRequest) -> PluginResult<Plugin> {
        for (field, value) in [
            ("id", &request.id),
            ("name", &request.name),
            ("version", &request.version),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::validation(format!("Plugin {field} must not be empty")).into());
            }
        }

        for hook in &request.hooks {
            if let Err(e) = self.loader.validate(&hook.source) {
                warn!(plugin_id = %request.id, hook = %hook.hook, error = %e, "Rejecting install: invalid hook handler");
                return Err(e.into());
            }
        }
        for listener in &request.listeners {
            if let Err(e) = self.loader.validate(&listener.source) {
                warn!(plugin_id = %request.id, event = %listener.event, file = %listener.file, error = %e, "Rejecting install: invalid event listener");
                return Err(e.into());
            }
        }

        if self.registry.get(&request.id).await?.is_some_and(|p| p.is_installed()) {
            return Err(PluginError::AlreadyInstalled(request.id));
        }
        for dependency in &request.manifest.dependencies {
            if dependency == &request.id {
                continue;
            }
            if self.registry.require(dependency).await.is_err() {
                return Err(PluginError::MissingDependency {
                    plugin_id: request.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let plugin_id = request.id.clone();
        let (plugin, hooks, listeners) = request.into_rows();
        let created = self
            .store
            .install_plugin(&plugin, &hooks, &listeners)
            .await
            .map_err(|e| {
                if e.is(ErrorKind::Conflict) {
                    PluginError::AlreadyInstalled(plugin_id.clone())
                } else {
                    PluginError::Store(e)
                }
            })?;

        info!(
            plugin_id = %created.id,
            version = %created.version,
            hooks = hooks.len(),
            listeners = listeners.len(),
            "Plugin installed"
        );
        Ok(created)
    }

    /// Install the package whose `plugin.json` lives in `package_dir`.
    pub async fn install_from_path(&self, package_dir: &str) -> PluginResult<Plugin> {
        let request = read_package(&self.storage, package_dir).await?;
        self.install(request).await
    }

    /// Enable a plugin. Every declared dependency must be enabled.
    pub async fn enable(&self, plugin_id: &str) -> PluginResult<Plugin> {
        if self.is_uninstalling(plugin_id).await? {
            return Err(PluginError::UninstallInProgress(plugin_id.to_string()));
        }
        let plugin = self.registry.require(plugin_id).await?;

        for dependency in &plugin.manifest.dependencies {
            match self.registry.get(dependency).await? {
                Some(dep) if dep.is_installed() => {
                    if !dep.is_enabled {
                        return Err(PluginError::DependencyDisabled {
                            plugin_id: plugin_id.to_string(),
                            dependency: dependency.clone(),
                        });
                    }
                }
                _ => {
                    return Err(PluginError::MissingDependency {
                        plugin_id: plugin_id.to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        self.transition(plugin_id, PluginStatus::Active, true).await?;
        info!(plugin_id = %plugin_id, "Plugin enabled");
        self.registry.require(plugin_id).await
    }

    /// Disable a plugin. Dispatch stops including it on the next call.
    pub async fn disable(&self, plugin_id: &str) -> PluginResult<Plugin> {
        self.registry.require(plugin_id).await?;

        let enabled_dependents: Vec<String> = {
            let mut ids = Vec::new();
            for id in self.registry.find_dependents(plugin_id).await? {
                if self.registry.get(&id).await?.is_some_and(|p| p.is_enabled) {
                    ids.push(id);
                }
            }
            ids
        };
        if !enabled_dependents.is_empty() {
            warn!(
                plugin_id = %plugin_id,
                dependents = ?enabled_dependents,
                "Disabling a plugin that enabled plugins depend on"
            );
        }

        self.transition(plugin_id, PluginStatus::Installed, false).await?;
        info!(plugin_id = %plugin_id, "Plugin disabled");
        self.registry.require(plugin_id).await
    }

    /// Uninstall a plugin.
    ///
    /// Pre-checks run under a per-plugin claim held both in this runtime and
    /// in the shared store, so concurrent calls for the same plugin cannot
    /// both proceed, even from different processes. Once the checks pass,
    /// the remaining phases run on their own task and complete even if the
    /// caller goes away.
    pub async fn uninstall(
        &self,
        plugin_id: &str,
        options: UninstallOptions,
    ) -> PluginResult<UninstallReport> {
        let guard = self.acquire(plugin_id).await?;
        let plugin = match self.checked_plugin(plugin_id, &options).await {
            Ok(plugin) => plugin,
            Err(e) => {
                guard.release().await;
                return Err(e);
            }
        };

        info!(
            plugin_id = %plugin_id,
            force = options.force,
            create_backup = options.create_backup,
            cleanup_data = %options.cleanup_data,
            cleanup_tables = %options.cleanup_tables,
            remove_code = options.remove_code,
            "Uninstalling plugin"
        );

        let this = self.clone();
        let task = tokio::spawn(async move {
            let result = this.teardown(plugin, options).await;
            guard.release().await;
            result
        });

        task.await.map_err(|e| {
            PluginError::Store(AppError::with_source(
                ErrorKind::Internal,
                format!("Uninstall task for plugin '{plugin_id}' did not complete"),
                e,
            ))
        })?
    }

    async fn acquire(&self, plugin_id: &str) -> PluginResult<UninstallGuard> {
        let mut guard = match self.in_progress.entry(plugin_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(PluginError::UninstallInProgress(plugin_id.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                UninstallGuard {
                    in_progress: self.in_progress.clone(),
                    store: self.store.clone(),
                    plugin_id: plugin_id.to_string(),
                    claimed: false,
                }
            }
        };

        guard.claimed = self.store.begin_uninstall(plugin_id, self.claim_ttl).await?;
        if guard.claimed {
            return Ok(guard);
        }
        match self.registry.get(plugin_id).await? {
            Some(plugin) if plugin.is_installed() => {
                warn!(plugin_id = %plugin_id, "Uninstall already claimed by another runtime");
                Err(PluginError::UninstallInProgress(plugin_id.to_string()))
            }
            _ => Err(PluginError::NotInstalled(plugin_id.to_string())),
        }
    }

    async fn checked_plugin(
        &self,
        plugin_id: &str,
        options: &UninstallOptions,
    ) -> PluginResult<Plugin> {
        let plugin = self.registry.require(plugin_id).await?;
        self.precheck(&plugin, options).await?;
        Ok(plugin)
    }

    async fn precheck(&self, plugin: &Plugin, options: &UninstallOptions) -> PluginResult<()> {
        if options.force {
            return Ok(());
        }

        let dependents = self.registry.find_dependents(&plugin.id).await?;
        if !dependents.is_empty() {
            return Err(PluginError::DependencyConflict {
                plugin_id: plugin.id.clone(),
                dependents,
            });
        }

        let resources = self.registry.tracker().resources(&plugin.id).await?;
        if !resources.is_empty() {
            return Err(PluginError::InUse {
                plugin_id: plugin.id.clone(),
                resources,
            });
        }

        if plugin.manifest.critical {
            return Err(PluginError::Critical {
                plugin_id: plugin.id.clone(),
            });
        }

        Ok(())
    }

    async fn teardown(
        &self,
        plugin: Plugin,
        options: UninstallOptions,
    ) -> PluginResult<UninstallReport> {
        let mut summary = CleanupSummary::default();

        let backup_path = if options.create_backup {
            match self.backups.create(&plugin, options.backup_data).await {
                Ok(record) => Some(self.backups.locate(&record)),
                Err(e) => {
                    error!(plugin_id = %plugin.id, error = %e, "Backup failed; uninstall aborted");
                    summary.fail(CleanupPhase::Backup, plugin.id.clone(), e.to_string());
                    self.write_audit(&plugin.id, UninstallOutcome::Failed, options, None, summary)
                        .await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        if plugin.is_enabled {
            if let Err(e) = self
                .transition(&plugin.id, PluginStatus::Installed, false)
                .await
            {
                fail(&mut summary, CleanupPhase::Disable, &plugin.id, e.to_string());
            }
        }

        if options.cleanup_data.removes() {
            self.clean_data(&plugin, &mut summary).await;
        }

        self.clean_tables(&plugin, options, &mut summary).await;

        let removed = match self.store.mark_uninstalled(&plugin.id).await {
            Ok(true) => true,
            Ok(false) => {
                fail(&mut summary, CleanupPhase::Registry, &plugin.id, "plugin record vanished");
                false
            }
            Err(e) => {
                fail(&mut summary, CleanupPhase::Registry, &plugin.id, e.to_string());
                if let Err(e) = self
                    .store
                    .set_plugin_state(&plugin.id, PluginStatus::Error, false)
                    .await
                {
                    error!(plugin_id = %plugin.id, error = %e, "Failed to mark plugin as errored");
                }
                false
            }
        };
        match self.registry.tracker().release_all(&plugin.id).await {
            Ok(0) => {}
            Ok(released) => {
                info!(plugin_id = %plugin.id, released, "Released tracked plugin resources")
            }
            Err(e) => fail(&mut summary, CleanupPhase::Registry, "plugin_resources", e.to_string()),
        }

        if options.remove_code {
            if let Some(path) = plugin.plugin_path.as_deref() {
                match self.storage.delete_dir(path).await {
                    Ok(()) => summary.code_removed = true,
                    Err(e) => fail(&mut summary, CleanupPhase::Code, path, e.to_string()),
                }
            }
        }

        let outcome = if !removed {
            UninstallOutcome::Failed
        } else if summary.is_clean() {
            UninstallOutcome::Succeeded
        } else {
            UninstallOutcome::CompletedWithErrors
        };

        self.write_audit(&plugin.id, outcome, options, backup_path.clone(), summary.clone())
            .await;

        info!(
            plugin_id = %plugin.id,
            outcome = ?outcome,
            data_entries_removed = summary.data_entries_removed,
            tables_dropped = summary.tables_dropped.len(),
            failures = summary.failures.len(),
            "Plugin uninstall finished"
        );

        Ok(UninstallReport {
            plugin_id: plugin.id,
            success: outcome == UninstallOutcome::Succeeded,
            outcome,
            backup_path,
            cleanup_summary: summary,
        })
    }

    async fn clean_data(&self, plugin: &Plugin, summary: &mut CleanupSummary) {
        match self.data.delete_all(&plugin.id).await {
            Ok(count) => summary.data_entries_removed = count,
            Err(e) => fail(summary, CleanupPhase::Data, "plugin_data", e.to_string()),
        }

        for directive in &plugin.manifest.data_cleanup {
            let table = directive.table();
            if self.guard.is_protected(table) {
                fail(
                    summary,
                    CleanupPhase::Directive,
                    table,
                    "refusing to touch a protected system table",
                );
                continue;
            }

            let (label, result) = match directive {
                DataCleanupDirective::DeleteRows { table, column } => (
                    format!("delete_rows {table}.{column}"),
                    self.schema
                        .delete_rows(table, column, &plugin.id)
                        .await
                        .map(|_| ()),
                ),
                DataCleanupDirective::Truncate { table } => (
                    format!("truncate {table}"),
                    self.schema.truncate_table(table).await,
                ),
            };
            match result {
                Ok(()) => summary.directives_run.push(label),
                Err(e) => fail(summary, CleanupPhase::Directive, table, e.to_string()),
            }
        }
    }

    async fn clean_tables(
        &self,
        plugin: &Plugin,
        options: UninstallOptions,
        summary: &mut CleanupSummary,
    ) {
        let mut migration_tables = Vec::new();
        if let Some(path) = plugin.plugin_path.as_deref() {
            match read_migrations(&self.storage, path).await {
                Ok(scripts) => {
                    for sql in scripts {
                        migration_tables.extend(tables_from_migration(&sql));
                    }
                }
                Err(e) => fail(summary, CleanupPhase::Tables, path, e.to_string()),
            }
        }

        let existing = match self.schema.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                fail(summary, CleanupPhase::Tables, "schema", e.to_string());
                return;
            }
        };
        let owners = match self.registry.list().await {
            Ok(plugins) => TableOwners::from_plugins(&plugin.id, &plugins),
            Err(e) => {
                fail(summary, CleanupPhase::Tables, "plugins", e.to_string());
                return;
            }
        };
        let foreign_keys = self.schema.foreign_keys().await.unwrap_or_else(|e| {
            warn!(plugin_id = %plugin.id, error = %e, "Foreign keys unavailable; dropping in name order");
            Vec::new()
        });

        let plan = plan_tables(
            &plugin.id,
            &plugin.manifest.tables,
            &migration_tables,
            &existing,
            &foreign_keys,
            &self.guard,
            &owners,
        );
        for skipped in &plan.skipped {
            warn!(
                plugin_id = %plugin.id,
                table = %skipped.table,
                reason = %skipped.reason,
                "Candidate table excluded from cleanup"
            );
        }

        if !options.cleanup_tables.removes() {
            summary.tables_kept = plan.drop;
            return;
        }

        for table in plan.drop {
            match self.schema.drop_table(&table).await {
                Ok(()) => {
                    info!(plugin_id = %plugin.id, table = %table, "Dropped plugin table");
                    summary.tables_dropped.push(table);
                }
                Err(e) => fail(summary, CleanupPhase::Tables, &table, e.to_string()),
            }
        }
    }

    async fn transition(
        &self,
        plugin_id: &str,
        status: PluginStatus,
        is_enabled: bool,
    ) -> PluginResult<()> {
        if self.store.set_plugin_state(plugin_id, status, is_enabled).await? {
            Ok(())
        } else {
            Err(PluginError::NotInstalled(plugin_id.to_string()))
        }
    }

    async fn write_audit(
        &self,
        plugin_id: &str,
        outcome: UninstallOutcome,
        options: UninstallOptions,
        backup_path: Option<String>,
        summary: CleanupSummary,
    ) {
        let audit = UninstallAudit {
            outcome,
            options,
            backup_path,
            summary,
            completed_at: Utc::now(),
        };
        if let Err(e) = self.store.record_uninstall_audit(plugin_id, &audit).await {
            error!(plugin_id = %plugin_id, error = %e, "Failed to record uninstall audit");
        }
    }
}

fn fail(
    summary: &mut CleanupSummary,
    phase: CleanupPhase,
    resource: &str,
    message: impl Into<String>,
) {
    let message = message.into();
    let err = PluginError::Cleanup {
        phase,
        resource: resource.to_string(),
        message: message.clone(),
    };
    error!(phase = %phase, resource = %resource, error = %err, "Cleanup step failed");
    summary.fail(phase, resource, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookContext, HookDispatcher};
    use crate::lifecycle::package::HookSource;
    use crate::loader::LoaderLimits;
    use crate::tracker::ResourceTracker;
    use bytes::Bytes;
    use emporium_database::{MemoryStore, PluginDataRepository};
    use emporium_entity::audit::CleanupPolicy;
    use emporium_entity::plugin::PluginManifest;
    use emporium_storage::LocalAssetStorage;
    use serde_json::json;

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        storage: Arc<LocalAssetStorage>,
        registry: Arc<PluginRegistry>,
        loader: Arc<ScriptLoader>,
        manager: LifecycleManager,
    }

    async fn harness_with(backup_directory: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(LocalAssetStorage::new(dir.path()).await.unwrap());
        let loader = Arc::new(ScriptLoader::new(LoaderLimits::default()));
        let (registry, manager) = runtime(&store, storage.clone(), loader.clone(), backup_directory);
        Harness {
            _dir: dir,
            store,
            storage,
            registry,
            loader,
            manager,
        }
    }

    async fn harness() -> Harness {
        harness_with("backups").await
    }

    /// Registry and lifecycle manager over `store`, as a separate process
    /// sharing the database would build them.
    fn runtime(
        store: &Arc<MemoryStore>,
        storage: Arc<LocalAssetStorage>,
        loader: Arc<ScriptLoader>,
        backup_directory: &str,
    ) -> (Arc<PluginRegistry>, LifecycleManager) {
        let stores = StoreSet::memory(store.clone());
        let registry = Arc::new(PluginRegistry::new(
            stores.plugins.clone(),
            loader.clone(),
            Arc::new(ResourceTracker::new(stores.plugins.clone())),
        ));
        let config = PluginConfig {
            backup_directory: backup_directory.to_string(),
            ..PluginConfig::default()
        };
        let manager = LifecycleManager::new(registry.clone(), &stores, storage, loader, &config);
        (registry, manager)
    }

    impl Harness {
        fn other_runtime(&self) -> (Arc<PluginRegistry>, LifecycleManager) {
            runtime(&self.store, self.storage.clone(), self.loader.clone(), "backups")
        }
    }

    fn request(id: &str, dependencies: &[&str]) -> InstallRequest {
        InstallRequest {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            manifest: PluginManifest {
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                ..PluginManifest::default()
            },
            plugin_path: None,
            hooks: Vec::new(),
            listeners: Vec::new(),
        }
    }

    fn remove_everything() -> UninstallOptions {
        UninstallOptions::new(CleanupPolicy::Remove, CleanupPolicy::Remove)
    }

    #[tokio::test]
    async fn test_install_rejects_invalid_handlers_without_writing() {
        let h = harness().await;
        let mut req = request("seo", &[]);
        req.hooks.push(HookSource {
            hook: "product.title".to_string(),
            priority: 10,
            source: "// test".to_string(),
        });

        let err = h.manager.install(req).await.unwrap_err();
        assert!(matches!(err, PluginError::Load(_)));
        assert!(h.registry.get("seo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_checks_dependencies_and_duplicates() {
        let h = harness().await;
        let err = h.manager.install(request("addon", &["core"])).await.unwrap_err();
        assert!(matches!(err, PluginError::MissingDependency { ref dependency, .. } if dependency == "core"));

        let core = h.manager.install(request("core", &[])).await.unwrap();
        assert_eq!(core.status, PluginStatus::Installed);
        assert!(!core.is_enabled);
        h.manager.install(request("addon", &["core"])).await.unwrap();

        let err = h.manager.install(request("core", &[])).await.unwrap_err();
        assert!(matches!(err, PluginError::AlreadyInstalled(_)));
    }

    #[tokio::test]
    async fn test_enable_requires_enabled_dependencies_and_is_live() {
        let h = harness().await;
        h.manager.install(request("core", &[])).await.unwrap();
        let mut addon = request("addon", &["core"]);
        addon.hooks.push(HookSource {
            hook: "cart.total".to_string(),
            priority: 10,
            source: "fn handle(v, c) { v + 1 }".to_string(),
        });
        h.manager.install(addon).await.unwrap();

        let dispatcher = HookDispatcher::new(h.store.clone(), h.loader.clone());
        let ctx = HookContext::new();
        assert_eq!(dispatcher.apply("cart.total", json!(1), &ctx).await, json!(1));

        let err = h.manager.enable("addon").await.unwrap_err();
        assert!(matches!(err, PluginError::DependencyDisabled { .. }));

        h.manager.enable("core").await.unwrap();
        let addon = h.manager.enable("addon").await.unwrap();
        assert_eq!(addon.status, PluginStatus::Active);
        assert_eq!(dispatcher.apply("cart.total", json!(1), &ctx).await, json!(2));

        h.manager.disable("addon").await.unwrap();
        assert_eq!(dispatcher.apply("cart.total", json!(1), &ctx).await, json!(1));
    }

    #[tokio::test]
    async fn test_blocked_uninstall_performs_no_mutation() {
        let h = harness().await;
        h.manager.install(request("core", &[])).await.unwrap();
        h.manager.install(request("addon", &["core"])).await.unwrap();
        h.store.upsert("core", "k", &json!(1), "json").await.unwrap();
        h.store.create_table("core_settings").await;

        let before = h.store.snapshot().await;
        let err = h
            .manager
            .uninstall("core", remove_everything())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PluginError::DependencyConflict { ref dependents, .. } if dependents == &vec!["addon".to_string()])
        );
        assert_eq!(h.store.snapshot().await, before);
        assert!(!h.storage.exists("backups").await.unwrap());
        assert!(!h.manager.is_uninstalling("core").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_use_and_critical_block_unless_forced() {
        let h = harness().await;
        h.manager.install(request("pay", &[])).await.unwrap();
        h.registry
            .tracker()
            .track("pay", "route:POST /pay/callback")
            .await
            .unwrap();
        let err = h.manager.uninstall("pay", remove_everything()).await.unwrap_err();
        assert!(matches!(err, PluginError::InUse { ref resources, .. } if resources.len() == 1));

        let mut vault = request("vault", &[]);
        vault.manifest.critical = true;
        h.manager.install(vault).await.unwrap();
        let err = h.manager.uninstall("vault", remove_everything()).await.unwrap_err();
        assert!(matches!(err, PluginError::Critical { .. }));

        let report = h
            .manager
            .uninstall("pay", remove_everything().with_force(true))
            .await
            .unwrap();
        assert!(report.success);
        assert!(!h.registry.is_in_use("pay").await.unwrap());
    }

    #[tokio::test]
    async fn test_forced_full_uninstall_removes_data_and_tables() {
        let h = harness().await;
        h.storage
            .write(
                "plugins/loyalty/migrations/001_tiers.sql",
                Bytes::from_static(b"CREATE TABLE IF NOT EXISTS reward_tiers (id INT PRIMARY KEY);"),
            )
            .await
            .unwrap();
        h.manager.install(request("core", &[])).await.unwrap();

        let mut loyalty = request("loyalty", &["core"]);
        loyalty.manifest.tables = vec!["loyalty_points".to_string()];
        loyalty.plugin_path = Some("plugins/loyalty".to_string());
        loyalty.hooks.push(HookSource {
            hook: "cart.total".to_string(),
            priority: 10,
            source: "fn handle(v, c) { v }".to_string(),
        });
        h.manager.install(loyalty).await.unwrap();
        h.manager.install(request("dependent", &["loyalty"])).await.unwrap();
        h.manager.enable("core").await.unwrap();
        h.manager.enable("loyalty").await.unwrap();

        h.store.upsert("loyalty", "rate", &json!(5), "config").await.unwrap();
        h.store.upsert("loyalty", "tier", &json!("gold"), "json").await.unwrap();
        h.store.upsert("core", "keep", &json!(true), "json").await.unwrap();
        h.store.create_table("reward_tiers").await;
        h.store.insert_row("loyalty_points", [("customer", "7")]).await;
        h.store.add_foreign_key("loyalty_points", "reward_tiers").await;
        h.store.create_table("loyalty_cache").await;
        h.store.create_table("orders").await;

        let report = h
            .manager
            .uninstall("loyalty", remove_everything().with_force(true))
            .await
            .unwrap();

        assert!(report.success, "{:?}", report.cleanup_summary.failures);
        assert_eq!(report.outcome, UninstallOutcome::Succeeded);
        assert!(report.backup_path.is_some());
        let summary = &report.cleanup_summary;
        assert_eq!(summary.data_entries_removed, 2);
        assert_eq!(
            summary.tables_dropped,
            vec!["loyalty_cache", "loyalty_points", "reward_tiers"]
        );

        assert!(h.store.find_all("loyalty", None).await.unwrap().is_empty());
        assert_eq!(h.store.find_all("core", None).await.unwrap().len(), 1);
        assert!(!h.store.has_table("loyalty_points").await);
        assert!(!h.store.has_table("reward_tiers").await);
        assert!(h.store.has_table("orders").await);
        assert!(h.registry.hooks_for("loyalty").await.unwrap().is_empty());

        let plugin = h.registry.get("loyalty").await.unwrap().unwrap();
        assert_eq!(plugin.status, PluginStatus::Uninstalled);
        let audit = plugin.uninstall_audit.unwrap().0;
        assert_eq!(audit.outcome, UninstallOutcome::Succeeded);
        assert_eq!(audit.backup_path, report.backup_path);

        let backups = h.manager.backups().list("loyalty").await.unwrap();
        assert_eq!(backups.len(), 1);
        let snapshot = h.manager.backups().load_backup(backups[0].id).await.unwrap();
        assert_eq!(snapshot.data.unwrap().len(), 2);
        assert_eq!(snapshot.manifest["hooks"].as_array().unwrap().len(), 1);
        assert!(snapshot.record.includes_code);
    }

    #[tokio::test]
    async fn test_keep_policies_leave_data_and_tables() {
        let h = harness().await;
        let mut req = request("loyalty", &[]);
        req.manifest.tables = vec!["loyalty_points".to_string()];
        h.manager.install(req).await.unwrap();
        h.store.upsert("loyalty", "rate", &json!(5), "config").await.unwrap();
        h.store.create_table("loyalty_points").await;

        let options = UninstallOptions::new(CleanupPolicy::Keep, CleanupPolicy::Keep).with_backup(false);
        let report = h.manager.uninstall("loyalty", options).await.unwrap();

        assert!(report.success);
        assert!(report.backup_path.is_none());
        assert_eq!(report.cleanup_summary.tables_kept, vec!["loyalty_points"]);
        assert!(h.store.has_table("loyalty_points").await);
        assert_eq!(h.store.find_all("loyalty", None).await.unwrap().len(), 1);

        let again = h.manager.uninstall("loyalty", options).await.unwrap_err();
        assert!(matches!(again, PluginError::NotInstalled(_)));
        h.manager.install(request("loyalty", &[])).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_drop_is_recorded_and_cleanup_continues() {
        let h = harness().await;
        h.manager.install(request("promo", &[])).await.unwrap();
        h.store.create_table("promo_codes").await;
        h.store.create_table("promo_stats").await;
        h.store.fail_drop("promo_codes").await;

        let report = h
            .manager
            .uninstall("promo", remove_everything().with_backup(false))
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.outcome, UninstallOutcome::CompletedWithErrors);
        assert_eq!(report.cleanup_summary.tables_dropped, vec!["promo_stats"]);
        let failure = &report.cleanup_summary.failures[0];
        assert_eq!(failure.phase, CleanupPhase::Tables);
        assert_eq!(failure.resource, "promo_codes");

        let plugin = h.registry.get("promo").await.unwrap().unwrap();
        assert_eq!(plugin.status, PluginStatus::Uninstalled);
        assert_eq!(
            plugin.uninstall_audit.unwrap().0.outcome,
            UninstallOutcome::CompletedWithErrors
        );
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_before_destruction() {
        let h = harness_with("blocked").await;
        h.storage
            .write("blocked", Bytes::from_static(b"not a directory"))
            .await
            .unwrap();
        h.manager.install(request("promo", &[])).await.unwrap();
        h.store.upsert("promo", "k", &json!(1), "json").await.unwrap();
        h.store.create_table("promo_codes").await;

        let err = h
            .manager
            .uninstall("promo", remove_everything())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Backup { .. }));

        let plugin = h.registry.get("promo").await.unwrap().unwrap();
        assert!(plugin.is_installed());
        assert_eq!(plugin.uninstall_audit.unwrap().0.outcome, UninstallOutcome::Failed);
        assert_eq!(h.store.find_all("promo", None).await.unwrap().len(), 1);
        assert!(h.store.has_table("promo_codes").await);
        assert!(!h.manager.is_uninstalling("promo").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_directives() {
        let h = harness().await;
        let mut req = request("notes", &[]);
        req.manifest.data_cleanup = vec![
            DataCleanupDirective::DeleteRows {
                table: "order_notes".to_string(),
                column: "plugin_id".to_string(),
            },
            DataCleanupDirective::Truncate {
                table: "orders".to_string(),
            },
        ];
        h.manager.install(req).await.unwrap();
        h.store.insert_row("order_notes", [("plugin_id", "notes")]).await;
        h.store.insert_row("order_notes", [("plugin_id", "other")]).await;
        h.store.insert_row("orders", [("id", "1")]).await;

        let report = h
            .manager
            .uninstall("notes", remove_everything().with_backup(false))
            .await
            .unwrap();

        let summary = &report.cleanup_summary;
        assert_eq!(summary.directives_run, vec!["delete_rows order_notes.plugin_id"]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].phase, CleanupPhase::Directive);
        assert_eq!(h.store.row_count("order_notes").await, Some(1));
        assert_eq!(h.store.row_count("orders").await, Some(1));
    }

    #[tokio::test]
    async fn test_install_from_path_and_remove_code() {
        let h = harness().await;
        h.storage
            .write(
                "plugins/banner/plugin.json",
                Bytes::from_static(
                    br#"{ "id": "banner", "name": "Banner", "version": "0.3.0",
                          "hooks": [{ "hook": "page.header", "file": "header.rhai" }] }"#,
                ),
            )
            .await
            .unwrap();
        h.storage
            .write("plugins/banner/header.rhai", Bytes::from_static(b"fn handle(html, c) { html }"))
            .await
            .unwrap();

        let plugin = h.manager.install_from_path("plugins/banner").await.unwrap();
        assert_eq!(plugin.plugin_path.as_deref(), Some("plugins/banner"));
        assert_eq!(h.registry.hooks_for("banner").await.unwrap().len(), 1);

        let report = h
            .manager
            .uninstall(
                "banner",
                remove_everything().with_backup(false).with_code_removal(true),
            )
            .await
            .unwrap();
        assert!(report.cleanup_summary.code_removed);
        assert!(!h.storage.exists("plugins/banner").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_uninstall_runs_once() {
        let h = harness().await;
        h.manager.install(request("promo", &[])).await.unwrap();
        h.store.create_table("promo_codes").await;

        let (first, second) = tokio::join!(
            h.manager.uninstall("promo", remove_everything()),
            h.manager.uninstall("promo", remove_everything()),
        );

        let results = [first, second];
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            rejected,
            PluginError::UninstallInProgress(_) | PluginError::NotInstalled(_)
        ));
        assert_eq!(h.manager.backups().list("promo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_uninstall_from_two_runtimes_runs_once() {
        let h = harness().await;
        let (_, other) = h.other_runtime();
        h.manager.install(request("promo", &[])).await.unwrap();
        h.store.create_table("promo_codes").await;

        let (first, second) = tokio::join!(
            h.manager.uninstall("promo", remove_everything()),
            other.uninstall("promo", remove_everything()),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            rejected,
            PluginError::UninstallInProgress(_) | PluginError::NotInstalled(_)
        ));
        assert_eq!(h.manager.backups().list("promo").await.unwrap().len(), 1);

        let plugin = h.registry.get("promo").await.unwrap().unwrap();
        assert_eq!(plugin.status, PluginStatus::Uninstalled);
        assert!(plugin.uninstall_started_at.is_none());
    }

    #[tokio::test]
    async fn test_claim_held_by_another_runtime_blocks_uninstall_and_enable() {
        let h = harness().await;
        h.manager.install(request("promo", &[])).await.unwrap();
        assert!(h.store.begin_uninstall("promo", Duration::hours(1)).await.unwrap());

        assert!(h.manager.is_uninstalling("promo").await.unwrap());
        let err = h.manager.uninstall("promo", remove_everything()).await.unwrap_err();
        assert!(matches!(err, PluginError::UninstallInProgress(_)));
        let err = h.manager.enable("promo").await.unwrap_err();
        assert!(matches!(err, PluginError::UninstallInProgress(_)));
        assert!(h.manager.backups().list("promo").await.unwrap().is_empty());

        h.store.finish_uninstall("promo").await.unwrap();
        let report = h.manager.uninstall("promo", remove_everything()).await.unwrap();
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_blocked_uninstall_releases_the_claim() {
        let h = harness().await;
        let mut vault = request("vault", &[]);
        vault.manifest.critical = true;
        h.manager.install(vault).await.unwrap();

        let err = h.manager.uninstall("vault", remove_everything()).await.unwrap_err();
        assert!(matches!(err, PluginError::Critical { .. }));

        let plugin = h.registry.get("vault").await.unwrap().unwrap();
        assert!(plugin.uninstall_started_at.is_none());
        assert!(!h.manager.is_uninstalling("vault").await.unwrap());
    }

    #[tokio::test]
    async fn test_resources_tracked_by_another_runtime_block_uninstall() {
        let h = harness().await;
        let (server_registry, _) = h.other_runtime();
        h.manager.install(request("pay", &[])).await.unwrap();
        server_registry
            .tracker()
            .track("pay", "route:POST /pay/callback")
            .await
            .unwrap();

        let err = h.manager.uninstall("pay", remove_everything()).await.unwrap_err();
        assert!(
            matches!(err, PluginError::InUse { ref resources, .. } if resources == &vec!["route:POST /pay/callback".to_string()])
        );

        h.manager
            .uninstall("pay", remove_everything().with_force(true))
            .await
            .unwrap();
        assert!(!server_registry.is_in_use("pay").await.unwrap());
    }

    #[tokio::test]
    async fn test_prefix_cleanup_spares_tables_of_installed_plugins() {
        let h = harness().await;
        h.manager.install(request("shop", &[])).await.unwrap();
        let mut reviews = request("shop_reviews", &[]);
        reviews.manifest.tables = vec!["shop_reviews_entries".to_string()];
        h.manager.install(reviews).await.unwrap();
        h.store.create_table("shop_orders").await;
        h.store.create_table("shop_reviews_entries").await;

        let report = h
            .manager
            .uninstall("shop", remove_everything().with_backup(false))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.cleanup_summary.tables_dropped, vec!["shop_orders"]);
        assert!(h.store.has_table("shop_reviews_entries").await);
        assert!(h.registry.require("shop_reviews").await.is_ok());
    }
}
