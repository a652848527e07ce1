//! Plugin lifecycle handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use validator::Validate;

use emporium_entity::audit::UninstallOptions;
use emporium_entity::plugin::Plugin;
use emporium_plugin::UninstallReport;

use crate::dto::request::InstallPluginRequest;
use crate::dto::response::{
    ApiResponse, DependentsResponse, PluginDetailResponse, ValidationResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/plugins
pub async fn list_plugins(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Plugin>>>, ApiError> {
    let plugins = state.plugins.registry().list().await?;
    Ok(Json(ApiResponse::ok(plugins)))
}

/// GET /api/plugins/{id}
pub async fn get_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PluginDetailResponse>>, ApiError> {
    let registry = state.plugins.registry();
    let plugin = registry
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Plugin '{id}' not found")))?;
    let hooks = registry.hooks_for(&id).await?;
    let listeners = registry.listeners_for(&id).await?;
    let uninstalling = state.plugins.lifecycle().is_uninstalling(&id).await?;

    Ok(Json(ApiResponse::ok(PluginDetailResponse {
        uninstalling,
        plugin,
        hooks,
        listeners,
    })))
}

/// POST /api/plugins
pub async fn install_plugin(
    State(state): State<AppState>,
    Json(req): Json<InstallPluginRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Plugin>>), ApiError> {
    let lifecycle = state.plugins.lifecycle();
    let plugin = match req {
        InstallPluginRequest::Package(package) => {
            package
                .validate()
                .map_err(|e| ApiError::validation(e.to_string()))?;
            let dir = state.config.plugins.package_dir(&package.path);
            lifecycle.install_from_path(&dir).await?
        }
        InstallPluginRequest::Inline(request) => lifecycle.install(*request).await?,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(plugin))))
}

/// POST /api/plugins/{id}/enable
pub async fn enable_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Plugin>>, ApiError> {
    let plugin = state.plugins.lifecycle().enable(&id).await?;
    Ok(Json(ApiResponse::ok(plugin)))
}

/// POST /api/plugins/{id}/disable
pub async fn disable_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Plugin>>, ApiError> {
    let plugin = state.plugins.lifecycle().disable(&id).await?;
    Ok(Json(ApiResponse::ok(plugin)))
}

/// POST /api/plugins/{id}/uninstall
///
/// The body must state both cleanup policies; there is no interactive
/// fallback over HTTP.
pub async fn uninstall_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(options): Json<UninstallOptions>,
) -> Result<Json<ApiResponse<UninstallReport>>, ApiError> {
    let report = state.plugins.lifecycle().uninstall(&id, options).await?;
    Ok(Json(ApiResponse {
        success: report.success,
        data: report,
    }))
}

/// GET /api/plugins/{id}/dependents
pub async fn plugin_dependents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DependentsResponse>>, ApiError> {
    let registry = state.plugins.registry();
    registry.require(&id).await?;
    let dependents = registry.find_dependents(&id).await?;
    let resources = registry.tracker().resources(&id).await?;

    Ok(Json(ApiResponse::ok(DependentsResponse {
        plugin_id: id,
        dependents,
        in_use: !resources.is_empty(),
        resources,
    })))
}

/// GET /api/plugins/validate
pub async fn validate_handlers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ValidationResponse>>, ApiError> {
    let invalid = state.plugins.validate_persisted().await?;
    Ok(Json(ApiResponse::ok(ValidationResponse {
        valid: invalid.is_empty(),
        invalid,
    })))
}
