//! Dynamic code loader: persisted handler source to sandboxed Rhai callables.
//!
//! Every handler must define `fn handle(value, context)`. Source is
//! validated when it is registered and again (through the cache key) every
//! time it changes. Execution happens on the blocking pool with an
//! operation budget, size limits, and a wall-clock deadline; the only
//! functions reachable from a script are the Rhai standard package plus
//! `log` and `warn`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use rhai::packages::{Package, StandardPackage};
use rhai::{AST, Dynamic, Engine, EvalAltResult, Module, Scope, Shared};
use serde_json::Value;
use tracing::{debug, info, warn};

use emporium_core::config::PluginConfig;

use crate::error::{LoadError, PluginError};

/// Name of the function every handler must define.
pub const ENTRY_POINT: &str = "handle";

/// Number of parameters of the entry point: the value and the context.
pub const ENTRY_ARITY: usize = 2;

const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_FN_EXPR_DEPTH: usize = 32;
const MAX_STRING_SIZE: usize = 1 << 20;
const MAX_ARRAY_SIZE: usize = 10_000;
const MAX_MAP_SIZE: usize = 10_000;

/// Extra time granted to the blocking task after the script deadline
/// before the caller gives up waiting.
const TIMEOUT_GRACE: Duration = Duration::from_millis(50);

/// Execution budget applied to every handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLimits {
    /// Wall-clock budget per invocation.
    pub timeout: Duration,
    /// Maximum script operations per invocation.
    pub max_operations: u64,
    /// Number of compiled scripts kept in the cache.
    pub cache_capacity: u64,
}

impl Default for LoaderLimits {
    fn default() -> Self {
        Self::from(&PluginConfig::default())
    }
}

impl From<&PluginConfig> for LoaderLimits {
    fn from(config: &PluginConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.handler_timeout_ms),
            max_operations: config.max_operations,
            cache_capacity: config.loader_cache_capacity,
        }
    }
}

/// A compiled, validated handler.
#[derive(Debug, Clone)]
pub struct LoadedScript {
    ast: Arc<AST>,
    fingerprint: u64,
}

impl LoadedScript {
    /// Hash of the source this script was compiled from.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Compiles and runs handler scripts.
pub struct ScriptLoader {
    limits: LoaderLimits,
    compiler: Engine,
    packages: Shared<Module>,
    cache: Cache<u64, Arc<AST>>,
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("limits", &self.limits)
            .field("cached_scripts", &self.cache.entry_count())
            .finish()
    }
}

impl ScriptLoader {
    /// Create a loader with the given limits.
    pub fn new(limits: LoaderLimits) -> Self {
        let mut compiler = Engine::new_raw();
        compiler.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
        compiler.disable_symbol("eval");

        Self {
            limits,
            compiler,
            packages: StandardPackage::new().as_shared_module(),
            cache: Cache::new(limits.cache_capacity),
        }
    }

    /// Create a loader from the plugin runtime configuration.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(LoaderLimits::from(config))
    }

    /// Limits applied to invocations.
    pub fn limits(&self) -> LoaderLimits {
        self.limits
    }

    /// Hash identifying a particular source text.
    pub fn fingerprint(source: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        hasher.finish()
    }

    /// Compile and validate handler source.
    pub fn load(&self, source: &str) -> Result<LoadedScript, LoadError> {
        let fingerprint = Self::fingerprint(source);
        if let Some(ast) = self.cache.get(&fingerprint) {
            return Ok(LoadedScript { ast, fingerprint });
        }

        if source.trim().is_empty() {
            return Err(LoadError::Empty);
        }
        if strip_comments(source).trim().is_empty() {
            return Err(LoadError::Placeholder);
        }

        let ast = self
            .compiler
            .compile(source)
            .map_err(|e| LoadError::Syntax {
                message: e.err_type().to_string(),
                line: e.position().line(),
            })?;

        let has_entry_point = ast
            .iter_functions()
            .any(|f| f.name == ENTRY_POINT && f.params.len() == ENTRY_ARITY);
        if !has_entry_point {
            return Err(LoadError::MissingEntryPoint {
                expected: ENTRY_POINT.to_string(),
                arity: ENTRY_ARITY,
            });
        }

        let ast = Arc::new(ast);
        self.cache.insert(fingerprint, ast.clone());
        debug!(fingerprint, "Compiled handler script");
        Ok(LoadedScript { ast, fingerprint })
    }

    /// Validate source without keeping the compiled form around for the caller.
    pub fn validate(&self, source: &str) -> Result<(), LoadError> {
        self.load(source).map(|_| ())
    }

    /// Run a script's entry point.
    ///
    /// Returns `Ok(None)` when the script returns nothing (`()`).
    pub async fn invoke(
        &self,
        script: &LoadedScript,
        plugin_id: &str,
        handler: &str,
        value: Value,
        context: Value,
    ) -> Result<Option<Value>, PluginError> {
        let deadline = Instant::now() + self.limits.timeout;
        let engine = self.engine(plugin_id, deadline);
        let ast = script.ast.clone();

        let task = tokio::task::spawn_blocking(move || run_entry_point(&engine, &ast, value, context));

        let outcome = match tokio::time::timeout(self.limits.timeout + TIMEOUT_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(format!("handler aborted: {join}")),
            Err(_) => Err(format!(
                "timed out after {}ms",
                self.limits.timeout.as_millis()
            )),
        };

        outcome.map_err(|message| PluginError::HandlerRuntime {
            plugin_id: plugin_id.to_string(),
            handler: handler.to_string(),
            message,
        })
    }

    /// Build a per-invocation engine sharing the standard package.
    fn engine(&self, plugin_id: &str, deadline: Instant) -> Engine {
        let mut engine = Engine::new_raw();
        engine.register_global_module(self.packages.clone());
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_ARRAY_SIZE);
        engine.set_max_map_size(MAX_MAP_SIZE);
        engine.disable_symbol("eval");

        engine.on_progress(move |_| {
            (Instant::now() >= deadline).then(|| Dynamic::from("deadline exceeded"))
        });

        let id = plugin_id.to_string();
        engine.on_print(move |text| info!(plugin_id = %id, "{text}"));
        let id = plugin_id.to_string();
        engine.on_debug(move |text, _, pos| debug!(plugin_id = %id, position = %pos, "{text}"));
        let id = plugin_id.to_string();
        engine.register_fn("log", move |msg: &str| info!(plugin_id = %id, "{msg}"));
        let id = plugin_id.to_string();
        engine.register_fn("warn", move |msg: &str| warn!(plugin_id = %id, "{msg}"));

        engine
    }
}

fn run_entry_point(
    engine: &Engine,
    ast: &AST,
    value: Value,
    context: Value,
) -> Result<Option<Value>, String> {
    let value = rhai::serde::to_dynamic(&value).map_err(|e| format!("invalid input: {e}"))?;
    let context = rhai::serde::to_dynamic(&context).map_err(|e| format!("invalid context: {e}"))?;

    let mut scope = Scope::new();
    let output = engine
        .call_fn::<Dynamic>(&mut scope, ast, ENTRY_POINT, (value, context))
        .map_err(|e| describe_eval_error(*e))?;

    if output.is_unit() {
        return Ok(None);
    }
    rhai::serde::from_dynamic::<Value>(&output)
        .map(Some)
        .map_err(|e| format!("return value is not representable as JSON: {e}"))
}

fn describe_eval_error(err: EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorTerminated(..) => "exceeded its time budget".to_string(),
        EvalAltResult::ErrorTooManyOperations(..) => "exceeded its operation budget".to_string(),
        other => other.to_string(),
    }
}

/// Remove `//` and `/* */` comments, leaving string literals intact.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            ('"' | '`' | '\'', _) => {
                in_string = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loader() -> ScriptLoader {
        ScriptLoader::new(LoaderLimits {
            timeout: Duration::from_millis(200),
            max_operations: 100_000,
            cache_capacity: 16,
        })
    }

    #[test]
    fn test_rejects_empty_and_placeholder_source() {
        let loader = loader();
        assert_eq!(loader.load("").unwrap_err(), LoadError::Empty);
        assert_eq!(loader.load("  \n\t").unwrap_err(), LoadError::Empty);
        assert_eq!(loader.load("// test").unwrap_err(), LoadError::Placeholder);
        assert_eq!(
            loader.load("/* todo */\n// later").unwrap_err(),
            LoadError::Placeholder
        );
    }

    #[test]
    fn test_rejects_syntax_errors_with_line() {
        let err = loader()
            .load("fn handle(v, c) {\n  let x = ;\n}")
            .unwrap_err();
        match err {
            LoadError::Syntax { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_requires_entry_point_with_two_parameters() {
        let loader = loader();
        let missing = loader.load("fn process(v, c) { v }").unwrap_err();
        assert!(matches!(missing, LoadError::MissingEntryPoint { arity: 2, .. }));
        let wrong_arity = loader.load("fn handle(v) { v }").unwrap_err();
        assert!(matches!(wrong_arity, LoadError::MissingEntryPoint { .. }));
        assert!(loader.load("fn handle(v, c) { v } // keep").is_ok());
    }

    #[test]
    fn test_comment_stripping_keeps_strings() {
        assert_eq!(strip_comments("let a = \"//x\"; // c").trim(), "let a = \"//x\";");
        assert!(strip_comments("/* a */ // b").trim().is_empty());
    }

    #[test]
    fn test_changed_source_gets_new_fingerprint() {
        let loader = loader();
        let a = loader.load("fn handle(v, c) { v }").unwrap();
        let again = loader.load("fn handle(v, c) { v }").unwrap();
        let b = loader.load("fn handle(v, c) { v + 1 }").unwrap();
        assert_eq!(a.fingerprint(), again.fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_invoke_threads_json_values() {
        let loader = loader();
        let script = loader
            .load(
                r#"
                fn handle(items, context) {
                    items.push(#{ tag: context.meta.plugin, qty: 2 });
                    items
                }
                "#,
            )
            .unwrap();

        let out = loader
            .invoke(
                &script,
                "loyalty",
                "loyalty#1",
                json!([]),
                json!({ "meta": { "plugin": "loyalty" } }),
            )
            .await
            .unwrap();
        assert_eq!(out, Some(json!([{ "tag": "loyalty", "qty": 2 }])));
    }

    #[tokio::test]
    async fn test_invoke_unit_return_is_none() {
        let loader = loader();
        let script = loader.load("fn handle(v, c) { log(\"seen\"); }").unwrap();
        let out = loader
            .invoke(&script, "p", "p#1", json!(1), json!({}))
            .await
            .unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_runtime_errors_and_budgets_are_reported() {
        let loader = loader();

        let thrower = loader.load("fn handle(v, c) { throw \"boom\"; }").unwrap();
        let err = loader
            .invoke(&thrower, "p", "p#1", json!(null), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::HandlerRuntime { ref plugin_id, .. } if plugin_id == "p"));

        let spinner = loader.load("fn handle(v, c) { loop { } }").unwrap();
        let err = loader
            .invoke(&spinner, "p", "p#2", json!(null), json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("budget") || err.to_string().contains("timed out"));
    }
}
