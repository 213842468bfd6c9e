use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::handlers::catalog::AppState;
use crate::error::CatalogError;
use crate::models::{AccelerationOperation, CachedAcceleration};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub acceleration: CachedAcceleration,
    pub operation: AccelerationOperation,
    #[serde(rename = "dataSourceMDSId", default)]
    pub data_source_mds_id: Option<String>,
}

fn operation_state(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "status": state.operator.status(),
        "isOperating": state.operator.is_operating(),
        "operationSuccess": state.operator.operation_success(),
    })
}

/// Run delete / vacuum / sync against an acceleration
pub async fn perform_operation(
    State(state): State<AppState>,
    Path(data_source): Path<String>,
    Json(payload): Json<OperationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), CatalogError> {
    tracing::info!(
        "Acceleration {} requested on {} in {}",
        payload.operation.as_str(),
        payload.acceleration.display_name(),
        data_source
    );

    state
        .operator
        .perform_operation(
            &payload.acceleration,
            &data_source,
            payload.data_source_mds_id.as_deref(),
            payload.operation,
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(operation_state(&state))))
}

pub async fn operation_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(operation_state(&state))
}
