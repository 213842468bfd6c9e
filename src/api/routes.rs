use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{acceleration, catalog, session, AppState};
use crate::api::middleware::logout_interceptor;
use crate::config::Config;
use crate::error::CatalogError;
use crate::services::{
    AccelerationOperator, CacheLoaderRegistry, CatalogCacheManager, ExternalDataSourceLoader,
    HttpQueryTransport, NotificationCenter, QueryTransport, StorageSessionStore,
};
use crate::storage::KeyValueStore;

/// Wire the services over a store and an engine transport.
pub fn build_state(
    storage: Arc<dyn KeyValueStore>,
    transport: Arc<dyn QueryTransport>,
    config: Config,
) -> AppState {
    let cache = CatalogCacheManager::new(storage.clone());
    let sessions = Arc::new(StorageSessionStore::new(storage));
    let notifications = Arc::new(NotificationCenter::new());
    let interval = config.polling_interval();

    let loaders = Arc::new(CacheLoaderRegistry::new(
        cache.clone(),
        transport.clone(),
        sessions.clone(),
        notifications.clone(),
        interval,
    ));
    let external_loader = Arc::new(ExternalDataSourceLoader::new(
        cache.clone(),
        transport.clone(),
        notifications.clone(),
    ));
    let operator = Arc::new(AccelerationOperator::new(
        transport.clone(),
        sessions.clone(),
        notifications.clone(),
        interval,
    ));

    AppState {
        cache,
        transport,
        sessions,
        notifications,
        loaders,
        external_loader,
        operator,
        config,
    }
}

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/catalog/cache", delete(catalog::clear_cache))
        .route("/api/catalog/{data_source}", get(catalog::get_data_source))
        .route(
            "/api/catalog/{data_source}/databases/{database}",
            get(catalog::get_database),
        )
        .route(
            "/api/catalog/{data_source}/databases/{database}/tables/{table}",
            get(catalog::get_table),
        )
        .route(
            "/api/catalog/{data_source}/databases/{database}/tables/{table}/accelerations",
            get(catalog::get_table_accelerations),
        )
        .route("/api/catalog/{data_source}/load", post(catalog::start_load))
        .route(
            "/api/catalog/{data_source}/load/{kind}",
            get(catalog::load_status),
        )
        .route(
            "/api/catalog/{data_source}/accelerations",
            get(catalog::get_accelerations),
        )
        .route(
            "/api/catalog/{data_source}/accelerations/operation",
            post(acceleration::perform_operation).get(acceleration::operation_status),
        )
        .route(
            "/api/external-datasources",
            get(session::get_external_data_sources).post(session::load_external_data_sources),
        )
        .route("/api/notifications", get(session::drain_notifications))
        .route(
            "/api/recent-datasets",
            get(session::list_recent_data_sets).post(session::add_recent_data_set),
        )
        .route("/api/auth/logout", post(session::logout))
        .layer(middleware::from_fn_with_state(
            state.cache.clone(),
            logout_interceptor,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create router talking to the engine configured in `config`
pub fn create_router_with_state(
    storage: Arc<dyn KeyValueStore>,
    config: Config,
) -> Result<Router, CatalogError> {
    let transport = Arc::new(HttpQueryTransport::new(
        &config.engine.base_url,
        config.engine.timeout_secs,
    )?);
    Ok(create_router(build_state(storage, transport, config)))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
