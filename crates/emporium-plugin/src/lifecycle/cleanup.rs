//! Discovery and ordering of plugin-owned tables.
//!
//! Candidates come from three sources, in decreasing order of trust: the
//! manifest's `tables`, tables created by the plugin's migration scripts,
//! and existing tables whose name starts with the plugin ID. The prefix
//! match is a best-effort safety net and may produce false positives, so
//! every candidate is still filtered through [`TableGuard`] and through the
//! claims of the other installed plugins ([`TableOwners`]).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use emporium_database::{ForeignKey, is_safe_identifier};
use emporium_entity::plugin::Plugin;

/// Tables that plugin cleanup never touches: the runtime's own tables, the
/// migration ledger, and the host's core domain tables.
pub const SYSTEM_TABLES: &[&str] = &[
    "plugins",
    "plugin_hooks",
    "plugin_event_listeners",
    "plugin_data",
    "plugin_backups",
    "plugin_resources",
    "_sqlx_migrations",
    "users",
    "products",
    "orders",
    "order_items",
    "carts",
    "cart_items",
    "customers",
    "translations",
    "settings",
];

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bcreate\s+(?:(?:global\s+|local\s+)?(?:temporary|temp|unlogged)\s+)?table\s+(?:if\s+not\s+exists\s+)?(?:"?[A-Za-z_][A-Za-z0-9_]*"?\.)?"?([A-Za-z_][A-Za-z0-9_]*)"?"#,
    )
    .expect("valid regex")
});

/// Denylist of table names, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct TableGuard {
    protected: BTreeSet<String>,
}

impl TableGuard {
    /// Built-in system tables plus `extra` configured names.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let protected = SYSTEM_TABLES
            .iter()
            .map(|t| t.to_string())
            .chain(extra.into_iter().map(|t| t.as_ref().to_lowercase()))
            .collect();
        Self { protected }
    }

    /// Whether `table` must never be dropped, truncated, or pruned.
    pub fn is_protected(&self, table: &str) -> bool {
        self.protected.contains(&table.to_lowercase())
    }
}

impl Default for TableGuard {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

/// Tables and name prefixes claimed by the other installed plugins.
#[derive(Debug, Clone, Default)]
pub struct TableOwners {
    declared: BTreeMap<String, String>,
    prefixes: Vec<(String, String)>,
}

impl TableOwners {
    /// Claims of every installed plugin in `plugins` except `plugin_id`.
    pub fn from_plugins(plugin_id: &str, plugins: &[Plugin]) -> Self {
        let mut owners = Self::default();
        for plugin in plugins
            .iter()
            .filter(|p| p.id != plugin_id && p.is_installed())
        {
            for table in &plugin.manifest.tables {
                owners
                    .declared
                    .entry(table.trim().to_lowercase())
                    .or_insert_with(|| plugin.id.clone());
            }
            owners.prefixes.push((table_prefix(&plugin.id), plugin.id.clone()));
        }
        owners
    }

    /// Installed plugin whose manifest lists `table`.
    pub fn declared_by(&self, table: &str) -> Option<&str> {
        self.declared.get(table).map(String::as_str)
    }

    /// Installed plugin whose table prefix is longer than `own_prefix` and
    /// matches `table`; the longest such prefix wins.
    pub fn narrower_prefix_owner(&self, table: &str, own_prefix: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .filter(|(prefix, _)| prefix.len() > own_prefix.len() && table.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, id)| id.as_str())
    }
}

/// Where a candidate table was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// Listed in the manifest.
    Manifest,
    /// Created by a migration script.
    Migration,
    /// Matched by the plugin ID prefix.
    Prefix,
}

/// A candidate excluded from cleanup, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTable {
    /// Table name as discovered.
    pub table: String,
    /// Why it is not dropped.
    pub reason: String,
}

/// Tables to drop for a plugin, in drop order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePlan {
    /// Existing, unprotected tables in reverse dependency order.
    pub drop: Vec<String>,
    /// Candidates refused by the guard or with unusable names.
    pub skipped: Vec<SkippedTable>,
}

/// Prefix used by the fallback heuristic: the plugin ID lowercased with
/// every character outside `[a-z0-9_]` replaced by `_`, followed by `_`.
pub fn table_prefix(plugin_id: &str) -> String {
    let mut prefix: String = plugin_id
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    prefix.push('_');
    prefix
}

/// Table names created by a migration script.
pub fn tables_from_migration(sql: &str) -> Vec<String> {
    CREATE_TABLE
        .captures_iter(sql)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Build the drop plan for a plugin.
///
/// `existing` is the current table list; candidates that do not exist are
/// silently ignored. Protected or malformed names, tables another installed
/// plugin declares, and prefix matches that belong to a plugin with a longer
/// ID prefix are reported as skipped.
pub fn plan_tables(
    plugin_id: &str,
    manifest_tables: &[String],
    migration_tables: &[String],
    existing: &[String],
    foreign_keys: &[ForeignKey],
    guard: &TableGuard,
    owners: &TableOwners,
) -> TablePlan {
    let existing: BTreeSet<String> = existing.iter().map(|t| t.to_lowercase()).collect();
    let prefix = table_prefix(plugin_id);

    let mut candidates: BTreeMap<String, TableSource> = BTreeMap::new();
    let declared = manifest_tables
        .iter()
        .map(|t| (t, TableSource::Manifest))
        .chain(migration_tables.iter().map(|t| (t, TableSource::Migration)));
    for (table, source) in declared {
        candidates
            .entry(table.trim().to_lowercase())
            .or_insert(source);
    }
    for table in existing.iter().filter(|t| t.starts_with(&prefix)) {
        candidates.entry(table.clone()).or_insert(TableSource::Prefix);
    }

    let mut plan = TablePlan::default();
    let mut keep = Vec::new();
    for (table, source) in candidates {
        let declared_elsewhere = owners.declared_by(&table).map(str::to_string);
        let narrower_owner = (source == TableSource::Prefix)
            .then(|| owners.narrower_prefix_owner(&table, &prefix))
            .flatten()
            .map(str::to_string);

        if !is_safe_identifier(&table) {
            plan.skipped.push(SkippedTable {
                table,
                reason: "not a plain table identifier".to_string(),
            });
        } else if guard.is_protected(&table) {
            plan.skipped.push(SkippedTable {
                table,
                reason: "protected system table".to_string(),
            });
        } else if let Some(owner) = declared_elsewhere {
            plan.skipped.push(SkippedTable {
                table,
                reason: format!("declared by installed plugin '{owner}'"),
            });
        } else if let Some(owner) = narrower_owner {
            plan.skipped.push(SkippedTable {
                table,
                reason: format!("matches the table prefix of installed plugin '{owner}'"),
            });
        } else if existing.contains(&table) {
            keep.push(table);
        }
    }

    plan.drop = drop_order(&keep, foreign_keys);
    plan
}

/// Order `tables` so that every table is dropped before any table it
/// references. Edges to tables outside the set are ignored. Ties, and any
/// cycle, fall back to name order.
pub fn drop_order(tables: &[String], foreign_keys: &[ForeignKey]) -> Vec<String> {
    let mut remaining: BTreeSet<&str> = tables.iter().map(String::as_str).collect();
    let edges: Vec<(&str, &str)> = foreign_keys
        .iter()
        .map(|fk| (fk.table.as_str(), fk.references.as_str()))
        .filter(|(from, to)| from != to && remaining.contains(from) && remaining.contains(to))
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .copied()
            .find(|table| {
                !edges
                    .iter()
                    .any(|(from, to)| to == table && remaining.contains(from))
            })
            .or_else(|| remaining.iter().copied().next());
        let Some(next) = next else {
            break;
        };
        remaining.remove(next);
        order.push(next.to_string());
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use emporium_entity::plugin::{PluginManifest, PluginStatus};
    use sqlx::types::Json;

    fn fk(table: &str, references: &str) -> ForeignKey {
        ForeignKey {
            table: table.to_string(),
            references: references.to_string(),
        }
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_migration_parsing() {
        let sql = r#"
            CREATE TABLE loyalty_points (id BIGSERIAL PRIMARY KEY);
            create table if not exists public."Loyalty_Tiers" (id INT);
            CREATE UNLOGGED TABLE loyalty_cache (k TEXT);
            -- CREATE INDEX is not a table
            CREATE INDEX idx ON loyalty_points (id);
        "#;
        assert_eq!(
            tables_from_migration(sql),
            names(&["loyalty_points", "loyalty_tiers", "loyalty_cache"])
        );
    }

    #[test]
    fn test_prefix_is_sanitised() {
        assert_eq!(table_prefix("Loyalty-Points"), "loyalty_points_");
    }

    #[test]
    fn test_guard_is_case_insensitive_and_configurable() {
        let guard = TableGuard::new(["Ledger"]);
        assert!(guard.is_protected("PLUGINS"));
        assert!(guard.is_protected("ledger"));
        assert!(!guard.is_protected("loyalty_points"));
    }

    #[test]
    fn test_plan_merges_sources_and_filters() {
        let existing = names(&[
            "loyalty_points",
            "loyalty_tiers",
            "loyalty_audit",
            "orders",
            "plugins",
            "unrelated",
        ]);
        let plan = plan_tables(
            "loyalty",
            &names(&["loyalty_points", "orders", "gone_table", "bad-name"]),
            &names(&["loyalty_tiers"]),
            &existing,
            &[fk("loyalty_points", "loyalty_tiers")],
            &TableGuard::default(),
            &TableOwners::default(),
        );

        assert_eq!(
            plan.drop,
            names(&["loyalty_audit", "loyalty_points", "loyalty_tiers"])
        );
        let skipped: Vec<&str> = plan.skipped.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(skipped, vec!["bad-name", "orders"]);
    }

    fn installed(id: &str, tables: &[&str]) -> Plugin {
        let now = chrono::Utc::now();
        Plugin {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            status: PluginStatus::Installed,
            is_enabled: false,
            manifest: Json(PluginManifest {
                tables: names(tables),
                ..PluginManifest::default()
            }),
            plugin_path: None,
            installed_at: now,
            updated_at: now,
            uninstalled_at: None,
            uninstall_started_at: None,
            uninstall_audit: None,
        }
    }

    #[test]
    fn test_prefix_match_spares_tables_of_other_installed_plugins() {
        let mut gone = installed("shop_archive", &["shop_archive_items"]);
        gone.status = PluginStatus::Uninstalled;
        let plugins = [
            installed("shop", &[]),
            installed("shop_reviews", &["shop_reviews_entries"]),
            installed("shop-wishlist", &[]),
            installed("payments", &["shop_ledger"]),
            gone,
        ];
        let owners = TableOwners::from_plugins("shop", &plugins);
        let existing = names(&[
            "shop_orders",
            "shop_reviews_entries",
            "shop_reviews_cache",
            "shop_wishlist_items",
            "shop_ledger",
            "shop_archive_items",
        ]);

        let plan = plan_tables("shop", &[], &[], &existing, &[], &TableGuard::default(), &owners);

        assert_eq!(plan.drop, names(&["shop_archive_items", "shop_orders"]));
        let reasons: BTreeMap<&str, &str> = plan
            .skipped
            .iter()
            .map(|s| (s.table.as_str(), s.reason.as_str()))
            .collect();
        assert_eq!(reasons["shop_reviews_entries"], "declared by installed plugin 'shop_reviews'");
        assert_eq!(
            reasons["shop_reviews_cache"],
            "matches the table prefix of installed plugin 'shop_reviews'"
        );
        assert_eq!(
            reasons["shop_wishlist_items"],
            "matches the table prefix of installed plugin 'shop-wishlist'"
        );
        assert_eq!(reasons["shop_ledger"], "declared by installed plugin 'payments'");
    }

    #[test]
    fn test_explicit_declaration_beats_narrower_prefix() {
        let plugins = [installed("shop_reviews", &[])];
        let owners = TableOwners::from_plugins("shop", &plugins);
        let plan = plan_tables(
            "shop",
            &names(&["shop_reviews_summary"]),
            &[],
            &names(&["shop_reviews_summary"]),
            &[],
            &TableGuard::default(),
            &owners,
        );
        assert_eq!(plan.drop, names(&["shop_reviews_summary"]));
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_drop_order_reverses_dependencies() {
        let tables = names(&["a_parent", "b_child", "c_grandchild"]);
        let fks = [fk("b_child", "a_parent"), fk("c_grandchild", "b_child"), fk("b_child", "users")];
        assert_eq!(
            drop_order(&tables, &fks),
            names(&["c_grandchild", "b_child", "a_parent"])
        );
    }

    #[test]
    fn test_drop_order_cycle_falls_back_to_name_order() {
        let tables = names(&["x", "y", "z"]);
        let fks = [fk("x", "y"), fk("y", "x")];
        assert_eq!(drop_order(&tables, &fks), names(&["z", "x", "y"]));
    }
}
