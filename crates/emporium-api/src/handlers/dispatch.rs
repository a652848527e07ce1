//! Diagnostic hook and event dispatch.

use axum::Json;
use axum::extract::{Path, State};

use emporium_plugin::{DispatchReport, EmitReport};

use crate::dto::request::{ApplyHookRequest, EmitEventRequest};
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/hooks/{name}/apply
pub async fn apply_hook(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ApplyHookRequest>,
) -> Result<Json<ApiResponse<DispatchReport>>, ApiError> {
    let report = state
        .plugins
        .dispatcher()
        .apply_with_report(&name, req.value, &req.context)
        .await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/events/{name}/emit
pub async fn emit_event(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<EmitEventRequest>,
) -> Result<Json<ApiResponse<EmitReport>>, ApiError> {
    let report = state
        .plugins
        .events()
        .emit(&name, req.payload, &req.context)
        .await?;
    Ok(Json(ApiResponse::ok(report)))
}
