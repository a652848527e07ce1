//! Route definitions for the Emporium administrative API.
//!
//! All routes are mounted under `/api` and receive `AppState` through
//! Axum's `State` extractor.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health_routes())
        .merge(plugin_routes())
        .merge(dispatch_routes())
        .merge(data_routes());

    let cors = build_cors_layer(&state.config.server);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .with_state(state)
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

/// Plugin lifecycle and diagnostics
fn plugin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/plugins",
            get(handlers::plugins::list_plugins).post(handlers::plugins::install_plugin),
        )
        .route("/plugins/validate", get(handlers::plugins::validate_handlers))
        .route("/plugins/{id}", get(handlers::plugins::get_plugin))
        .route("/plugins/{id}/enable", post(handlers::plugins::enable_plugin))
        .route("/plugins/{id}/disable", post(handlers::plugins::disable_plugin))
        .route("/plugins/{id}/uninstall", post(handlers::plugins::uninstall_plugin))
        .route("/plugins/{id}/dependents", get(handlers::plugins::plugin_dependents))
}

/// Hook application and event emission
fn dispatch_routes() -> Router<AppState> {
    Router::new()
        .route("/hooks/{name}/apply", post(handlers::dispatch::apply_hook))
        .route("/events/{name}/emit", post(handlers::dispatch::emit_event))
}

/// Plugin-scoped key/value data
fn data_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/plugins/{id}/data",
            get(handlers::data::list_data).delete(handlers::data::clear_data),
        )
        .route(
            "/plugins/{id}/data/{key}",
            get(handlers::data::get_data)
                .put(handlers::data::set_data)
                .delete(handlers::data::delete_data),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use emporium_core::config::{
        AppConfig, DatabaseConfig, LoggingConfig, PluginConfig, ServerConfig,
    };
    use emporium_database::{MemoryStore, StoreSet};
    use emporium_plugin::PluginManager;
    use emporium_storage::LocalAssetStorage;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    async fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(LocalAssetStorage::new(dir.path()).await.unwrap());
        let plugin_config = PluginConfig::default();
        let plugins = PluginManager::new(StoreSet::memory(store.clone()), storage, &plugin_config);
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/emporium_test".to_string(),
                max_connections: 1,
                min_connections: 0,
                connect_timeout_seconds: 1,
                idle_timeout_seconds: 1,
            },
            plugins: plugin_config,
            logging: LoggingConfig::default(),
        };
        TestApp {
            router: build_router(AppState::new(config, plugins)),
            store,
            _dir: dir,
        }
    }

    async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn plugin(id: &str, dependencies: &[&str], hook_source: &str) -> Value {
        json!({
            "id": id,
            "name": format!("{id} plugin"),
            "version": "1.0.0",
            "manifest": { "dependencies": dependencies },
            "hooks": [{ "hook": "product.title", "priority": 10, "source": hook_source }],
            "listeners": [{ "event": "order.placed", "source": "fn handle(p, c) { log(`placed ${p.id}`); }" }]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], json!("ok"));
    }

    #[tokio::test]
    async fn test_install_enable_and_apply_hook() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/plugins",
            Some(plugin("shouty", &[], "fn handle(t, c) { t.to_upper() }")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], json!("installed"));
        assert_eq!(body["data"]["is_enabled"], json!(false));

        let (_, body) = send(&app, "POST", "/api/hooks/product.title/apply", Some(json!({ "value": "mug" }))).await;
        assert_eq!(body["data"]["value"], json!("mug"));

        let (status, body) = send(&app, "POST", "/api/plugins/shouty/enable", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], json!("active"));

        let (_, body) = send(&app, "POST", "/api/hooks/product.title/apply", Some(json!({ "value": "mug" }))).await;
        assert_eq!(body["data"]["value"], json!("MUG"));
        assert_eq!(body["data"]["executed"], json!(1));

        let (status, body) = send(&app, "POST", "/api/events/order.placed/emit", Some(json!({ "payload": { "id": 7 } }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["delivered"], json!(1));

        let (status, body) = send(&app, "GET", "/api/plugins/shouty", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["hooks"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["uninstalling"], json!(false));
    }

    #[tokio::test]
    async fn test_install_rejects_broken_handler() {
        let app = test_app().await;
        let (status, body) = send(&app, "POST", "/api/plugins", Some(plugin("broken", &[], "// test"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("VALIDATION_ERROR"));
        assert!(body["details"]["load_error"].is_string());

        let (status, _) = send(&app, "GET", "/api/plugins/broken", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_uninstall_guards_and_forced_removal() {
        let app = test_app().await;
        let identity = "fn handle(v, c) { v }";
        send(&app, "POST", "/api/plugins", Some(plugin("customers-core", &[], identity))).await;
        send(&app, "POST", "/api/plugins", Some(plugin("loyalty", &["customers-core"], identity))).await;

        let (status, body) = send(&app, "GET", "/api/plugins/customers-core/dependents", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dependents"], json!(["loyalty"]));
        assert_eq!(body["data"]["in_use"], json!(false));

        let (status, _) = send(&app, "POST", "/api/plugins/customers-core/uninstall", Some(json!({ "force": true }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let options = json!({ "cleanup_data": "remove", "cleanup_tables": "remove" });
        let (status, body) = send(&app, "POST", "/api/plugins/customers-core/uninstall", Some(options.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["details"]["dependents"], json!(["loyalty"]));

        let forced = json!({ "force": true, "cleanup_data": "remove", "cleanup_tables": "remove" });
        let (status, body) = send(&app, "POST", "/api/plugins/customers-core/uninstall", Some(forced)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["outcome"], json!("succeeded"));
        assert!(body["data"]["backup_path"].is_string());

        let (_, body) = send(&app, "GET", "/api/plugins/customers-core", None).await;
        assert_eq!(body["data"]["plugin"]["status"], json!("uninstalled"));

        let (status, _) = send(&app, "POST", "/api/plugins/customers-core/uninstall", Some(options)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_plugin_data_roundtrip() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            "PUT",
            "/api/plugins/loyalty/data/rate",
            Some(json!({ "value": { "points_per_euro": 2 }, "data_type": "config" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["data_type"], json!("config"));
        assert_eq!(app.store.snapshot().await.data.len(), 1);

        send(&app, "PUT", "/api/plugins/loyalty/data/last_sync", Some(json!({ "value": "2026-01-01" }))).await;

        let (_, body) = send(&app, "GET", "/api/plugins/loyalty/data?data_type=config", None).await;
        assert_eq!(body["data"], json!({ "rate": { "points_per_euro": 2 } }));

        let (status, _) = send(&app, "DELETE", "/api/plugins/loyalty/data/rate", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/api/plugins/loyalty/data/rate", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, "DELETE", "/api/plugins/loyalty/data", None).await;
        assert_eq!(body["data"]["removed"], json!(1));
    }

    #[tokio::test]
    async fn test_validate_route_is_not_a_plugin_id() {
        let app = test_app().await;
        send(&app, "POST", "/api/plugins", Some(plugin("ok", &[], "fn handle(v, c) { v }"))).await;

        let (status, body) = send(&app, "GET", "/api/plugins/validate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["valid"], json!(true));
        assert_eq!(body["data"]["invalid"], json!([]));
    }
}
