//! Maps domain errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use emporium_core::error::{AppError, ErrorKind};
use emporium_plugin::PluginError;

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Optional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    /// Error category, selects the status code.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Structured details, e.g. the dependents blocking an uninstall.
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::validation(message).into()
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::not_found(message).into()
    }

    /// HTTP status and error code for the kind.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self.kind {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            ErrorKind::Plugin => (StatusCode::UNPROCESSABLE_ENTITY, "PLUGIN_ERROR"),
            ErrorKind::Serialization => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            ErrorKind::Database => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ErrorKind::Storage => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ErrorKind::Configuration => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            details: None,
        }
    }
}

impl From<PluginError> for ApiError {
    fn from(err: PluginError) -> Self {
        let details = match &err {
            PluginError::DependencyConflict { dependents, .. } => {
                Some(json!({ "dependents": dependents }))
            }
            PluginError::InUse { resources, .. } => Some(json!({ "resources": resources })),
            PluginError::MissingDependency { dependency, .. }
            | PluginError::DependencyDisabled { dependency, .. } => {
                Some(json!({ "dependency": dependency }))
            }
            PluginError::Load(load) => Some(json!({ "load_error": load.to_string() })),
            _ => None,
        };
        let mut api = Self::from(AppError::from(err));
        api.details = details;
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.message, kind = %self.kind, "Internal server error");
        }

        let body = ApiErrorResponse {
            error: error_code.to_string(),
            message: self.message,
            details: self.details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_errors_keep_details() {
        let err: ApiError = PluginError::DependencyConflict {
            plugin_id: "customers-core".to_string(),
            dependents: vec!["loyalty".to_string()],
        }
        .into();
        assert_eq!(err.status().0, StatusCode::CONFLICT);
        assert_eq!(err.details, Some(json!({ "dependents": ["loyalty"] })));

        let err: ApiError = PluginError::NotInstalled("ghost".to_string()).into();
        assert_eq!(err.status().0, StatusCode::NOT_FOUND);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_store_errors_map_to_server_errors() {
        let err: ApiError = PluginError::Store(AppError::database("connection reset")).into();
        assert_eq!(err.status(), (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"));
        assert_eq!(err.message, "connection reset");
    }
}
