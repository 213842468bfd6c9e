use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::services::{CacheCollection, CatalogCacheManager};

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            CatalogError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", msg.clone())
                    .with_details("The cache is stale. Reload the catalog to refresh it."),
            ),
            CatalogError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            CatalogError::UnsupportedOperation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("UNSUPPORTED_OPERATION", msg.clone()),
            ),
            CatalogError::Submission(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("SUBMISSION_FAILED", msg.clone()),
            ),
            CatalogError::Poll(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("QUERY_FAILED", msg.clone()),
            ),
            CatalogError::Transport(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("TRANSPORT_ERROR", msg.clone()),
            ),
            CatalogError::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("STORAGE_ERROR", msg.clone()),
            ),
            CatalogError::Serialization(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("SERIALIZATION_ERROR", msg.clone()),
            ),
            CatalogError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// True for request paths that end the user's session.
pub fn is_logout_path(path: &str) -> bool {
    path.contains("/logout")
}

/// Drop the catalog and acceleration collections. Recent data sets, external
/// data sources and session ids are kept.
pub fn clear_catalog_collections(cache: &CatalogCacheManager) -> Result<(), CatalogError> {
    cache.clear(CacheCollection::DataSources)?;
    cache.clear(CacheCollection::Accelerations)
}

/// Request interceptor clearing the catalog cache on logout.
pub async fn logout_interceptor(
    State(cache): State<CatalogCacheManager>,
    request: Request,
    next: Next,
) -> Response {
    if is_logout_path(request.uri().path()) {
        tracing::info!("Logout detected, clearing catalog cache");
        if let Err(e) = clear_catalog_collections(&cache) {
            tracing::error!("Failed to clear catalog cache on logout: {}", e);
        }
    }
    next.run(request).await
}
