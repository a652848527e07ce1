//! Plugin data store handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::Value;
use validator::Validate;

use emporium_entity::data::PluginDataEntry;

use crate::dto::request::{DataQuery, SetDataRequest};
use crate::dto::response::{ApiResponse, DeleteResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/plugins/{id}/data
pub async fn list_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Json<ApiResponse<BTreeMap<String, Value>>>, ApiError> {
    let values = state
        .plugins
        .data()
        .get_all(&id, query.data_type.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(values)))
}

/// DELETE /api/plugins/{id}/data
pub async fn clear_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let removed = state.plugins.data().delete_all(&id).await?;
    Ok(Json(ApiResponse::ok(DeleteResponse { removed })))
}

/// GET /api/plugins/{id}/data/{key}
pub async fn get_data(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<ApiResponse<PluginDataEntry>>, ApiError> {
    let entry = state
        .plugins
        .data()
        .entry(&id, &key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No data '{key}' for plugin '{id}'")))?;
    Ok(Json(ApiResponse::ok(entry)))
}

/// PUT /api/plugins/{id}/data/{key}
pub async fn set_data(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
    Json(req): Json<SetDataRequest>,
) -> Result<Json<ApiResponse<PluginDataEntry>>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let entry = state
        .plugins
        .data()
        .set(&id, &key, req.value, req.data_type.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(entry)))
}

/// DELETE /api/plugins/{id}/data/{key}
pub async fn delete_data(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    if !state.plugins.data().delete(&id, &key).await? {
        return Err(ApiError::not_found(format!(
            "No data '{key}' for plugin '{id}'"
        )));
    }
    Ok(Json(ApiResponse::ok(DeleteResponse { removed: 1 })))
}
