//! Plugin manifest: declared dependencies, owned tables, and cleanup directives.

use serde::{Deserialize, Serialize};

/// Declared metadata of a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Plugins that must be installed (and enabled, for this one to be enabled).
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Tables created and owned by the plugin.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Critical plugins can only be uninstalled with `force`.
    #[serde(default)]
    pub critical: bool,
    /// Extra cleanup to run when the plugin's data is removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_cleanup: Vec<DataCleanupDirective>,
}

impl PluginManifest {
    /// Whether the manifest lists `plugin_id` as a dependency.
    pub fn depends_on(&self, plugin_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == plugin_id)
    }
}

/// A structured cleanup command declared by a plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DataCleanupDirective {
    /// Delete rows of a shared table whose `column` holds the plugin id.
    DeleteRows {
        /// Target table.
        table: String,
        /// Column compared against the plugin id.
        column: String,
    },
    /// Remove every row of a plugin-owned table while keeping its schema.
    Truncate {
        /// Target table.
        table: String,
    },
}

impl DataCleanupDirective {
    /// Table the directive operates on.
    pub fn table(&self) -> &str {
        match self {
            Self::DeleteRows { table, .. } | Self::Truncate { table } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parses_camel_case_json() {
        let manifest: PluginManifest = serde_json::from_value(serde_json::json!({
            "dependencies": ["loyalty-core"],
            "tables": ["loyalty_points"],
            "critical": false,
            "dataCleanup": [
                { "action": "delete_rows", "table": "order_notes", "column": "plugin_id" },
                { "action": "truncate", "table": "loyalty_cache" }
            ]
        }))
        .unwrap();

        assert!(manifest.depends_on("loyalty-core"));
        assert!(!manifest.depends_on("loyalty"));
        assert_eq!(manifest.data_cleanup.len(), 2);
        assert_eq!(manifest.data_cleanup[1].table(), "loyalty_cache");
    }

    #[test]
    fn test_manifest_defaults_when_fields_missing() {
        let manifest: PluginManifest = serde_json::from_str("{}").unwrap();
        assert_eq!(manifest, PluginManifest::default());
    }
}
