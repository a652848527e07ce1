//! Explicit context handed to handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the runtime places invocation metadata.
pub const META_KEY: &str = "meta";

/// Caller-supplied values visible to handlers as `context`.
///
/// Handlers see exactly these entries plus a `meta` map describing the
/// current invocation; nothing else from the host is reachable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookContext {
    values: Map<String, Value>,
}

impl HookContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace an entry. The `meta` key is reserved and ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if key != META_KEY {
            self.values.insert(key, value);
        }
    }

    /// Look up an entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Render the context for one invocation.
    pub(crate) fn render(&self, meta: Value) -> Value {
        let mut values = self.values.clone();
        values.insert(META_KEY.to_string(), meta);
        Value::Object(values)
    }
}

impl From<Map<String, Value>> for HookContext {
    fn from(mut values: Map<String, Value>) -> Self {
        values.remove(META_KEY);
        Self { values }
    }
}
