use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::CatalogError;
use crate::models::{
    is_catalog_cache_fetching, CachedAcceleration, CachedAccelerationByDataSource,
    CachedDataSource, CachedDatabase, CachedTable, DirectQueryLoadingStatus, LoadCacheType,
    StartLoadingParams,
};
use crate::services::{
    AccelerationOperator, CacheLoaderRegistry, CatalogCacheManager, ExternalDataSourceLoader,
    NotificationCenter, QueryTransport, SessionStore,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub cache: CatalogCacheManager,
    pub transport: Arc<dyn QueryTransport>,
    pub sessions: Arc<dyn SessionStore>,
    pub notifications: Arc<NotificationCenter>,
    pub loaders: Arc<CacheLoaderRegistry>,
    pub external_loader: Arc<ExternalDataSourceLoader>,
    pub operator: Arc<AccelerationOperator>,
    pub config: Config,
}

#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    #[serde(rename = "mdsId")]
    pub mds_id: Option<String>,
    #[serde(rename = "databaseName")]
    pub database_name: Option<String>,
    #[serde(rename = "tableName")]
    pub table_name: Option<String>,
}

impl TargetQuery {
    fn mds_id(&self) -> Option<&str> {
        self.mds_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub kind: LoadCacheType,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(rename = "dataSourceMDSId", default)]
    pub data_source_mds_id: Option<String>,
}

/// Get (or create) the cached catalog of a data source
pub async fn get_data_source(
    State(state): State<AppState>,
    Path(data_source): Path<String>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<CachedDataSource>, CatalogError> {
    let entry = state
        .cache
        .get_or_create_data_source(&data_source, target.mds_id())?;
    Ok(Json(entry))
}

pub async fn get_database(
    State(state): State<AppState>,
    Path((data_source, database)): Path<(String, String)>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<CachedDatabase>, CatalogError> {
    let entry = state
        .cache
        .get_database(&data_source, &database, target.mds_id())?;
    Ok(Json(entry))
}

pub async fn get_table(
    State(state): State<AppState>,
    Path((data_source, database, table)): Path<(String, String, String)>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<CachedTable>, CatalogError> {
    let entry = state
        .cache
        .get_table(&data_source, &database, &table, target.mds_id())?;
    Ok(Json(entry))
}

/// Start (or restart) loading one kind of catalog metadata
pub async fn start_load(
    State(state): State<AppState>,
    Path(data_source): Path<String>,
    Json(payload): Json<LoadRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), CatalogError> {
    let params = StartLoadingParams {
        data_source_name: data_source,
        data_source_mds_id: payload.data_source_mds_id,
        database_name: payload.database_name,
        table_name: payload.table_name,
    };

    let loader = state.loaders.get_or_create(payload.kind, &params);
    let status = loader.start_loading(params).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "kind": payload.kind,
            "status": status,
        })),
    ))
}

pub async fn load_status(
    State(state): State<AppState>,
    Path((data_source, kind)): Path<(String, LoadCacheType)>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<serde_json::Value>, CatalogError> {
    let params = StartLoadingParams {
        data_source_name: data_source,
        data_source_mds_id: target.mds_id.clone(),
        database_name: target.database_name.clone(),
        table_name: target.table_name.clone(),
    };

    let status = state
        .loaders
        .get(kind, &params)
        .map(|loader| loader.load_status())
        .unwrap_or(DirectQueryLoadingStatus::Initial);

    Ok(Json(serde_json::json!({
        "kind": kind,
        "status": status,
        "isFetching": is_catalog_cache_fetching(&state.loaders.statuses()),
    })))
}

pub async fn get_accelerations(
    State(state): State<AppState>,
    Path(data_source): Path<String>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<CachedAccelerationByDataSource>, CatalogError> {
    let entry = state
        .cache
        .get_or_create_accelerations_by_data_source(&data_source, target.mds_id())?;
    Ok(Json(entry))
}

/// Accelerations built over one cached table
pub async fn get_table_accelerations(
    State(state): State<AppState>,
    Path((data_source, database, table)): Path<(String, String, String)>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<Vec<CachedAcceleration>>, CatalogError> {
    let accelerations =
        state
            .cache
            .accelerations_for_table(&data_source, &database, &table, target.mds_id())?;
    Ok(Json(accelerations))
}

/// Clear both catalog collections
pub async fn clear_cache(State(state): State<AppState>) -> Result<StatusCode, CatalogError> {
    state.loaders.stop_all();
    crate::api::middleware::clear_catalog_collections(&state.cache)?;
    Ok(StatusCode::NO_CONTENT)
}
