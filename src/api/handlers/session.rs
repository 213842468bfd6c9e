use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::api::handlers::catalog::AppState;
use crate::error::CatalogError;
use crate::models::{ExternalDataSourcesCacheData, RecentDataSet};
use crate::services::Toast;

/// Drain pending user notifications
pub async fn drain_notifications(State(state): State<AppState>) -> Json<Vec<Toast>> {
    Json(state.notifications.drain())
}

pub async fn list_recent_data_sets(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecentDataSet>>, CatalogError> {
    Ok(Json(state.cache.get_recent_data_sets()?))
}

pub async fn add_recent_data_set(
    State(state): State<AppState>,
    Json(payload): Json<RecentDataSet>,
) -> Result<(StatusCode, Json<Vec<RecentDataSet>>), CatalogError> {
    if payload.id.is_empty() {
        return Err(CatalogError::Validation("Data set id cannot be empty".to_string()));
    }
    state.cache.add_recent_data_set(payload)?;
    Ok((StatusCode::CREATED, Json(state.cache.get_recent_data_sets()?)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoadRequest {
    pub connection_ids: Vec<String>,
}

pub async fn get_external_data_sources(
    State(state): State<AppState>,
) -> Result<Json<ExternalDataSourcesCacheData>, CatalogError> {
    Ok(Json(state.cache.get_external_data_sources()?))
}

/// Discover external data sources on the given clusters
pub async fn load_external_data_sources(
    State(state): State<AppState>,
    Json(payload): Json<ExternalLoadRequest>,
) -> Json<serde_json::Value> {
    let data_sources = state.external_loader.load(&payload.connection_ids).await;
    Json(serde_json::json!({
        "status": state.external_loader.load_status(),
        "dataSources": data_sources,
    }))
}

/// Session end. The logout interceptor has already cleared the catalog cache.
pub async fn logout(State(state): State<AppState>) -> StatusCode {
    state.loaders.stop_all();
    StatusCode::NO_CONTENT
}
