// Cache Loaders
//
// Turn finished discovery queries into cache entries. A `None` result is the
// failure path: the target entry is marked Failed with an empty payload so
// stale data is never presented as fresh.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::CatalogError;
use crate::models::{
    current_timestamp, row_bool, row_string, AccelerationKind, AsyncPollingResult,
    CachedAcceleration, CachedColumn, CachedDataSourceStatus, CachedDatabase, CachedTable,
    DirectQueryLoadingStatus, DirectQueryRequest, ExternalDataSource, LoadCacheType,
    StartLoadingParams,
};
use crate::services::cache_manager::CatalogCacheManager;
use crate::services::direct_query::{DirectQueryOptions, DirectQueryRunner, QueryOutcome};
use crate::services::notifications::{NotificationSink, QUERY_FAILED_MESSAGE};
use crate::services::query_builder::create_load_query;
use crate::services::session::SessionStore;
use crate::services::transport::QueryTransport;

/// Rows of `SHOW TABLE EXTENDED` describing Hive views rather than tables.
static HIVE_TABLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Provider:\s*hive").expect("valid regex"));

/// `DESC` output lists partition details after this pseudo-row.
pub const PARTITION_INFO_SENTINEL: &str = "# Partition Information";

pub const QUERY_FAILED_TITLE: &str = "Query Failed";
pub const EXTERNAL_DATA_SOURCES_FAILED_TITLE: &str = "Failed to load external datasources";

/// Registry size past which idle loaders are evicted before adding another.
pub const MAX_IDLE_LOADERS: usize = 64;

/// Connector type of the data connections that back external data sources.
const S3_GLUE_CONNECTOR: &str = "S3GLUE";

// ==================== Cache commits ====================

pub fn update_databases_to_cache(
    cache: &CatalogCacheManager,
    data_source_name: &str,
    result: Option<&AsyncPollingResult>,
    data_source_mds_id: Option<&str>,
) -> Result<(), CatalogError> {
    let (count, status) = cache.with_data_source_cache(|collection| {
        let data_source = collection.get_or_insert(data_source_name, data_source_mds_id);
        data_source.last_updated = current_timestamp();

        match result {
            None => {
                data_source.databases = Vec::new();
                data_source.status = CachedDataSourceStatus::Failed;
            }
            Some(result) => {
                let mut seen = HashSet::new();
                data_source.databases = result
                    .combined_rows()
                    .iter()
                    .map(|row| row_string(row, "namespace"))
                    .filter(|name| seen.insert(name.clone()))
                    .map(CachedDatabase::empty)
                    .collect();
                data_source.status = CachedDataSourceStatus::Updated;
            }
        }
        Ok((data_source.databases.len(), data_source.status))
    })?;

    tracing::info!(
        "Committed {} databases for data source {} ({:?})",
        count,
        data_source_name,
        status
    );
    Ok(())
}

pub fn update_tables_to_cache(
    cache: &CatalogCacheManager,
    data_source_name: &str,
    database_name: &str,
    result: Option<&AsyncPollingResult>,
    data_source_mds_id: Option<&str>,
) -> Result<(), CatalogError> {
    let count = cache.with_database(
        data_source_name,
        database_name,
        data_source_mds_id,
        |database| {
            database.last_updated = current_timestamp();

            match result {
                None => {
                    database.tables = Vec::new();
                    database.status = CachedDataSourceStatus::Failed;
                }
                Some(result) => {
                    let mut seen = HashSet::new();
                    database.tables = result
                        .combined_rows()
                        .iter()
                        .filter(|row| !HIVE_TABLE_REGEX.is_match(&row_string(row, "information")))
                        .map(|row| row_string(row, "tableName"))
                        .filter(|name| seen.insert(name.clone()))
                        .map(CachedTable::new)
                        .collect();
                    database.status = CachedDataSourceStatus::Updated;
                }
            }
            Ok(database.tables.len())
        },
    )?;

    tracing::info!(
        "Committed {} tables for {}.{}",
        count,
        data_source_name,
        database_name
    );
    Ok(())
}

pub fn update_accelerations_to_cache(
    cache: &CatalogCacheManager,
    data_source_name: &str,
    result: Option<&AsyncPollingResult>,
    data_source_mds_id: Option<&str>,
) -> Result<(), CatalogError> {
    let count = cache.with_accelerations_cache(|collection| {
        let entry = collection.get_or_insert(data_source_name, data_source_mds_id);
        entry.last_updated = current_timestamp();

        match result {
            None => {
                entry.accelerations = Vec::new();
                entry.status = CachedDataSourceStatus::Failed;
            }
            Some(result) => {
                let mut seen = HashSet::new();
                entry.accelerations = result
                    .combined_rows()
                    .iter()
                    .map(|row| CachedAcceleration {
                        flint_index_name: row_string(row, "flint_index_name"),
                        kind: AccelerationKind::from_engine(&row_string(row, "kind")),
                        database: row_string(row, "database"),
                        table: row_string(row, "table"),
                        index_name: row_string(row, "index_name"),
                        auto_refresh: row_bool(row, "auto_refresh"),
                        status: row_string(row, "status"),
                    })
                    .filter(|acc| seen.insert(acc.identity()))
                    .collect();
                entry.status = CachedDataSourceStatus::Updated;
            }
        }
        Ok(entry.accelerations.len())
    })?;

    tracing::info!(
        "Committed {} accelerations for data source {}",
        count,
        data_source_name
    );
    Ok(())
}

/// Columns are only merged into a database whose table list is current.
/// A failed describe leaves the cache as it was.
pub fn update_table_columns_to_cache(
    cache: &CatalogCacheManager,
    data_source_name: &str,
    database_name: &str,
    table_name: &str,
    result: Option<&AsyncPollingResult>,
    data_source_mds_id: Option<&str>,
) -> Result<(), CatalogError> {
    let Some(result) = result else {
        return Ok(());
    };

    let columns: Vec<CachedColumn> = result
        .combined_rows()
        .iter()
        .map(|row| (row_string(row, "col_name"), row_string(row, "data_type")))
        .take_while(|(name, _)| name != PARTITION_INFO_SENTINEL)
        .map(|(field_name, data_type)| CachedColumn {
            field_name,
            data_type,
        })
        .collect();
    let count = columns.len();

    let committed = cache.with_database(
        data_source_name,
        database_name,
        data_source_mds_id,
        |database| {
            if database.status != CachedDataSourceStatus::Updated {
                return Ok(false);
            }
            for table in database.tables.iter_mut().filter(|t| t.name == table_name) {
                table.columns = Some(columns.clone());
            }
            database.last_updated = current_timestamp();
            Ok(true)
        },
    )?;

    if committed {
        tracing::info!(
            "Committed {} columns for {}.{}.{}",
            count,
            data_source_name,
            database_name,
            table_name
        );
    } else {
        tracing::debug!(
            "Skipping column commit for {}.{}: table list is not loaded",
            database_name,
            table_name
        );
    }
    Ok(())
}

fn require_name<'a>(name: Option<&'a str>, what: &str) -> Result<&'a str, CatalogError> {
    name.filter(|n| !n.is_empty())
        .ok_or_else(|| CatalogError::Validation(format!("{} is required", what)))
}

/// Commit a discovery result for `target` according to its kind.
pub fn update_to_cache(
    cache: &CatalogCacheManager,
    kind: LoadCacheType,
    target: &StartLoadingParams,
    result: Option<&AsyncPollingResult>,
) -> Result<(), CatalogError> {
    let data_source = target.data_source_name.as_str();
    let mds_id = target.data_source_mds_id.as_deref();

    match kind {
        LoadCacheType::Databases => update_databases_to_cache(cache, data_source, result, mds_id),
        LoadCacheType::Tables => {
            let database = require_name(target.database_name.as_deref(), "Database name")?;
            update_tables_to_cache(cache, data_source, database, result, mds_id)
        }
        LoadCacheType::Accelerations => {
            update_accelerations_to_cache(cache, data_source, result, mds_id)
        }
        LoadCacheType::TableColumns => {
            let database = require_name(target.database_name.as_deref(), "Database name")?;
            let table = require_name(target.table_name.as_deref(), "Table name")?;
            update_table_columns_to_cache(cache, data_source, database, table, result, mds_id)
        }
    }
}

// ==================== Loaders ====================

/// Runs one kind of discovery query and commits its result to the cache.
pub struct CacheLoader {
    kind: LoadCacheType,
    cache: CatalogCacheManager,
    notifications: Arc<dyn NotificationSink>,
    runner: DirectQueryRunner,
}

impl CacheLoader {
    pub fn new(
        kind: LoadCacheType,
        cache: CatalogCacheManager,
        transport: Arc<dyn QueryTransport>,
        sessions: Arc<dyn SessionStore>,
        notifications: Arc<dyn NotificationSink>,
        interval: Duration,
    ) -> Self {
        let runner = DirectQueryRunner::new(
            transport,
            sessions,
            DirectQueryOptions {
                interval,
                stop_on_scheduled: false,
            },
        );
        Self {
            kind,
            cache,
            notifications,
            runner,
        }
    }

    pub fn kind(&self) -> LoadCacheType {
        self.kind
    }

    pub fn load_status(&self) -> DirectQueryLoadingStatus {
        self.runner.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectQueryLoadingStatus> {
        self.runner.subscribe()
    }

    /// Submit the discovery query for `params` and poll it in the background.
    /// Restarting while a load is in flight supersedes the earlier load.
    pub async fn start_loading(
        &self,
        params: StartLoadingParams,
    ) -> Result<DirectQueryLoadingStatus, CatalogError> {
        let query = create_load_query(
            self.kind,
            &params.data_source_name,
            params.database_name.as_deref(),
            params.table_name.as_deref(),
        )?;
        let request = DirectQueryRequest::sql(query, params.data_source_name.clone());
        let connection_id = params
            .data_source_mds_id
            .clone()
            .filter(|id| !id.is_empty());

        tracing::info!(
            "Loading {} for data source {}",
            self.kind.as_str(),
            params.data_source_name
        );

        let kind = self.kind;
        let cache = self.cache.clone();
        let notifications = self.notifications.clone();
        let on_complete = Box::new(move |outcome: QueryOutcome| match outcome {
            QueryOutcome::Succeeded(result) => {
                commit(&cache, kind, &params, Some(&result));
            }
            QueryOutcome::Failed { error, .. } => {
                commit(&cache, kind, &params, None);
                notifications.add_error(QUERY_FAILED_TITLE, QUERY_FAILED_MESSAGE, Some(error.detail()));
            }
            QueryOutcome::Scheduled => {}
        });

        Ok(self.runner.start(request, connection_id, on_complete).await)
    }

    pub fn stop_loading(&self) {
        self.runner.stop();
    }
}

fn commit(
    cache: &CatalogCacheManager,
    kind: LoadCacheType,
    target: &StartLoadingParams,
    result: Option<&AsyncPollingResult>,
) {
    match update_to_cache(cache, kind, target, result) {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            tracing::warn!("Cache entry for {} is gone, skipping commit: {}", kind.as_str(), e)
        }
        Err(e) => tracing::error!("Failed to commit {} to cache: {}", kind.as_str(), e),
    }
}

/// Loaders keyed by kind and target, so repeated loads of the same target
/// share one loader and a restart supersedes the earlier run.
pub struct CacheLoaderRegistry {
    cache: CatalogCacheManager,
    transport: Arc<dyn QueryTransport>,
    sessions: Arc<dyn SessionStore>,
    notifications: Arc<dyn NotificationSink>,
    interval: Duration,
    loaders: Mutex<HashMap<(LoadCacheType, StartLoadingParams), Arc<CacheLoader>>>,
}

impl CacheLoaderRegistry {
    pub fn new(
        cache: CatalogCacheManager,
        transport: Arc<dyn QueryTransport>,
        sessions: Arc<dyn SessionStore>,
        notifications: Arc<dyn NotificationSink>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            transport,
            sessions,
            notifications,
            interval,
            loaders: Mutex::new(HashMap::new()),
        }
    }

    fn key(kind: LoadCacheType, params: &StartLoadingParams) -> (LoadCacheType, StartLoadingParams) {
        let mut target = params.clone();
        target.data_source_mds_id = target.data_source_mds_id.filter(|id| !id.is_empty());
        (kind, target)
    }

    pub fn get(&self, kind: LoadCacheType, params: &StartLoadingParams) -> Option<Arc<CacheLoader>> {
        self.loaders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&Self::key(kind, params))
            .cloned()
    }

    pub fn get_or_create(&self, kind: LoadCacheType, params: &StartLoadingParams) -> Arc<CacheLoader> {
        let key = Self::key(kind, params);
        let mut loaders = self.loaders.lock().unwrap_or_else(|e| e.into_inner());
        if !loaders.contains_key(&key) && loaders.len() >= MAX_IDLE_LOADERS {
            // Idle loaders hold nothing but their last status.
            loaders.retain(|_, loader| {
                Arc::strong_count(loader) > 1 || loader.load_status().is_fetching()
            });
        }
        loaders
            .entry(key)
            .or_insert_with(|| {
                Arc::new(CacheLoader::new(
                    kind,
                    self.cache.clone(),
                    self.transport.clone(),
                    self.sessions.clone(),
                    self.notifications.clone(),
                    self.interval,
                ))
            })
            .clone()
    }

    /// Statuses of every known loader; see `is_catalog_cache_fetching`.
    pub fn statuses(&self) -> Vec<DirectQueryLoadingStatus> {
        self.loaders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|loader| loader.load_status())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.loaders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every loader and forget them.
    pub fn stop_all(&self) {
        let mut loaders = self.loaders.lock().unwrap_or_else(|e| e.into_inner());
        for loader in loaders.values() {
            loader.stop_loading();
        }
        let stopped = loaders.len();
        loaders.clear();
        tracing::debug!("Stopped {} cache loaders", stopped);
    }
}

/// Discovers the external data sources reachable through connected clusters.
pub struct ExternalDataSourceLoader {
    cache: CatalogCacheManager,
    transport: Arc<dyn QueryTransport>,
    notifications: Arc<dyn NotificationSink>,
    status: watch::Sender<DirectQueryLoadingStatus>,
}

impl ExternalDataSourceLoader {
    pub fn new(
        cache: CatalogCacheManager,
        transport: Arc<dyn QueryTransport>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let (status, _) = watch::channel(DirectQueryLoadingStatus::Initial);
        Self {
            cache,
            transport,
            notifications,
            status,
        }
    }

    pub fn load_status(&self) -> DirectQueryLoadingStatus {
        *self.status.borrow()
    }

    async fn fetch(&self, connection_ids: &[String]) -> Result<Vec<ExternalDataSource>, CatalogError> {
        let mut found = Vec::new();
        for connection_id in connection_ids {
            let connections = self
                .transport
                .list_data_connections(Some(connection_id.as_str()))
                .await?;
            found.extend(
                connections
                    .into_iter()
                    .filter(|c| c.connector.eq_ignore_ascii_case(S3_GLUE_CONNECTOR))
                    .map(|c| ExternalDataSource {
                        name: c.name,
                        status: c.status.unwrap_or_default(),
                        data_source_ref: connection_id.clone(),
                    }),
            );
        }
        Ok(found)
    }

    /// Load and cache the external data sources of every given cluster.
    /// Returns an empty list when any cluster cannot be queried.
    pub async fn load(&self, connection_ids: &[String]) -> Vec<ExternalDataSource> {
        self.status.send_replace(DirectQueryLoadingStatus::Scheduled);
        if let Err(e) = self
            .cache
            .set_external_data_sources_loading_status(CachedDataSourceStatus::Empty)
        {
            tracing::warn!("Failed to mark external data sources as loading: {}", e);
        }

        let committed = match self.fetch(connection_ids).await {
            Ok(found) => self
                .cache
                .update_external_data_sources(found.clone())
                .map(|()| found),
            Err(e) => Err(e),
        };

        match committed {
            Ok(found) => {
                tracing::info!("Loaded {} external data sources", found.len());
                self.status.send_replace(DirectQueryLoadingStatus::Success);
                found
            }
            Err(e) => {
                tracing::error!("Failed to load external data sources: {}", e);
                self.status.send_replace(DirectQueryLoadingStatus::Failed);
                if let Err(e) = self
                    .cache
                    .set_external_data_sources_loading_status(CachedDataSourceStatus::Failed)
                {
                    tracing::warn!("Failed to mark external data sources as failed: {}", e);
                }
                self.notifications.add_error(
                    EXTERNAL_DATA_SOURCES_FAILED_TITLE,
                    e.detail(),
                    None,
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataConnection;
    use crate::services::notifications::{NotificationCenter, ToastKind};
    use crate::services::session::StorageSessionStore;
    use crate::services::transport::testing::{status, ScriptedTransport};
    use crate::storage::MemoryStorage;
    use serde_json::{json, Value};
    use tokio::time::sleep;

    const INTERVAL: Duration = Duration::from_millis(5000);
    const TICK: Duration = Duration::from_millis(5001);

    fn cache() -> CatalogCacheManager {
        CatalogCacheManager::new(Arc::new(MemoryStorage::new()))
    }

    fn result(schema: &[&str], rows: Value) -> AsyncPollingResult {
        let schema: Vec<Value> = schema
            .iter()
            .map(|name| json!({"name": name, "type": "string"}))
            .collect();
        serde_json::from_value(json!({
            "status": "SUCCESS",
            "schema": schema,
            "datarows": rows
        }))
        .unwrap()
    }

    fn databases_result() -> AsyncPollingResult {
        result(&["namespace"], json!([["Database1"], ["Database2"]]))
    }

    fn tables_result() -> AsyncPollingResult {
        result(
            &["namespace", "tableName", "isTemporary", "information"],
            json!([
                ["default", "http_logs1", false, "Provider: parquet\nLocation: s3://logs"],
                ["default", "http_logs2", false, "Provider: parquet"],
                ["default", "dummy_table", false, "Type: VIEW\nProvider: hive\n"]
            ]),
        )
    }

    fn accelerations_result() -> AsyncPollingResult {
        result(
            &["flint_index_name", "kind", "database", "table", "index_name", "auto_refresh", "status"],
            json!([
                ["flint_s3_default_http_logs_skipping_index", "skipping", "default", "http_logs", null, true, "active"],
                ["flint_s3_default_http_logs_status_index", "covering", "default", "http_logs", "status_index", false, "active"],
                ["flint_s3_default_request_counts", "mv", "default", null, "request_counts", true, "refreshing"]
            ]),
        )
    }

    fn columns_result(rows: Value) -> AsyncPollingResult {
        result(&["col_name", "data_type", "comment"], rows)
    }

    fn seed_tables(cache: &CatalogCacheManager) {
        update_databases_to_cache(cache, "s3", Some(&databases_result()), None).unwrap();
        update_tables_to_cache(cache, "s3", "Database1", Some(&tables_result()), None).unwrap();
    }

    #[test]
    fn test_null_result_marks_data_source_failed() {
        let cache = cache();
        update_databases_to_cache(&cache, "s3", None, None).unwrap();

        let ds = cache.get_or_create_data_source("s3", None).unwrap();
        assert_eq!(ds.status, CachedDataSourceStatus::Failed);
        assert!(ds.databases.is_empty());
        assert!(!ds.last_updated.is_empty());
    }

    #[test]
    fn test_databases_commit() {
        let cache = cache();
        let duplicated = result(&["namespace"], json!([["Database1"], ["Database2"], ["Database1"]]));
        update_databases_to_cache(&cache, "s3", Some(&duplicated), Some("cluster-1")).unwrap();

        let ds = cache.get_or_create_data_source("s3", Some("cluster-1")).unwrap();
        assert_eq!(ds.status, CachedDataSourceStatus::Updated);
        let names: Vec<_> = ds.databases.iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names, vec!["Database1", "Database2"]);
        for db in &ds.databases {
            assert!(db.tables.is_empty());
            assert_eq!(db.status, CachedDataSourceStatus::Empty);
        }
        assert_eq!(cache.get_data_source_cache().unwrap().data_sources.len(), 1);
    }

    #[test]
    fn test_tables_commit_skips_hive_views_and_is_idempotent() {
        let cache = cache();
        seed_tables(&cache);
        let first = cache.get_database("s3", "Database1", None).unwrap();
        assert_eq!(first.status, CachedDataSourceStatus::Updated);
        let names: Vec<_> = first.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["http_logs1", "http_logs2"]);

        update_tables_to_cache(&cache, "s3", "Database1", Some(&tables_result()), None).unwrap();
        let second = cache.get_database("s3", "Database1", None).unwrap();
        assert_eq!(first.tables, second.tables);
    }

    #[test]
    fn test_tables_commit_failure_and_missing_database() {
        let cache = cache();
        seed_tables(&cache);
        update_tables_to_cache(&cache, "s3", "Database1", None, None).unwrap();
        let db = cache.get_database("s3", "Database1", None).unwrap();
        assert_eq!(db.status, CachedDataSourceStatus::Failed);
        assert!(db.tables.is_empty());

        let err = update_tables_to_cache(&cache, "s3", "missing", Some(&tables_result()), None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_accelerations_commit() {
        let cache = cache();
        update_accelerations_to_cache(&cache, "s3", Some(&accelerations_result()), Some("c1"))
            .unwrap();

        let entry = cache
            .get_or_create_accelerations_by_data_source("s3", Some("c1"))
            .unwrap();
        assert_eq!(entry.status, CachedDataSourceStatus::Updated);
        assert_eq!(entry.data_source_mds_id.as_deref(), Some("c1"));
        assert_eq!(entry.accelerations.len(), 3);
        assert_eq!(entry.accelerations[0].kind, AccelerationKind::Skipping);
        assert_eq!(entry.accelerations[0].display_name(), "skipping_index");
        assert!(entry.accelerations[0].auto_refresh);
        assert_eq!(entry.accelerations[2].kind, AccelerationKind::Materialized);
        assert_eq!(entry.accelerations[2].table, "");
        assert_eq!(entry.accelerations[2].status, "refreshing");

        let on_table = cache
            .accelerations_for_table("s3", "default", "http_logs", Some("c1"))
            .unwrap();
        assert_eq!(on_table.len(), 2);
    }

    #[test]
    fn test_accelerations_commit_dedupes_by_identity() {
        let cache = cache();
        let rows = result(
            &["flint_index_name", "kind", "database", "table", "index_name", "auto_refresh", "status"],
            json!([
                ["flint_a", "skipping", "default", "http_logs", "", false, "active"],
                ["flint_b", "skipping", "default", "http_logs", "", false, "deleted"],
                ["flint_c", "covering", "default", "http_logs", "idx", false, "active"]
            ]),
        );
        update_accelerations_to_cache(&cache, "s3", Some(&rows), None).unwrap();
        let entry = cache.get_or_create_accelerations_by_data_source("s3", None).unwrap();
        let names: Vec<_> = entry
            .accelerations
            .iter()
            .map(|a| a.flint_index_name.as_str())
            .collect();
        assert_eq!(names, vec!["flint_a", "flint_c"]);

        update_accelerations_to_cache(&cache, "s3", None, None).unwrap();
        let entry = cache.get_or_create_accelerations_by_data_source("s3", None).unwrap();
        assert_eq!(entry.status, CachedDataSourceStatus::Failed);
        assert!(entry.accelerations.is_empty());
    }

    #[test]
    fn test_columns_truncate_at_partition_sentinel() {
        let cache = cache();
        seed_tables(&cache);
        let rows = columns_result(json!([
            ["status", "int", null],
            ["size", "bigint", null],
            ["year", "int", null],
            ["# Partition Information", "", ""],
            ["# col_name", "data_type", "comment"],
            ["year", "int", null]
        ]));
        update_table_columns_to_cache(&cache, "s3", "Database1", "http_logs1", Some(&rows), None)
            .unwrap();

        let table = cache.get_table("s3", "Database1", "http_logs1", None).unwrap();
        let columns = table.columns.unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[1].field_name, "size");
        assert_eq!(columns[1].data_type, "bigint");

        let other = cache.get_table("s3", "Database1", "http_logs2", None).unwrap();
        assert!(other.columns.is_none());
    }

    #[test]
    fn test_columns_require_loaded_tables() {
        let cache = cache();
        update_databases_to_cache(&cache, "s3", Some(&databases_result()), None).unwrap();
        let rows = columns_result(json!([["status", "int", null]]));
        update_table_columns_to_cache(&cache, "s3", "Database1", "http_logs1", Some(&rows), None)
            .unwrap();
        let db = cache.get_database("s3", "Database1", None).unwrap();
        assert_eq!(db.status, CachedDataSourceStatus::Empty);

        seed_tables(&cache);
        let before = cache.get_data_source_cache().unwrap();
        update_table_columns_to_cache(&cache, "s3", "Database1", "http_logs1", None, None).unwrap();
        assert_eq!(cache.get_data_source_cache().unwrap(), before);
    }

    #[test]
    fn test_dispatch_requires_target_names() {
        let cache = cache();
        let err = update_to_cache(
            &cache,
            LoadCacheType::Tables,
            &StartLoadingParams::new("s3"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    struct LoaderHarness {
        cache: CatalogCacheManager,
        transport: Arc<ScriptedTransport>,
        notifications: Arc<NotificationCenter>,
        sessions: Arc<StorageSessionStore>,
    }

    impl LoaderHarness {
        fn new(transport: ScriptedTransport) -> Self {
            let storage = Arc::new(MemoryStorage::new());
            Self {
                cache: CatalogCacheManager::new(storage.clone()),
                transport: Arc::new(transport),
                notifications: Arc::new(NotificationCenter::new()),
                sessions: Arc::new(StorageSessionStore::new(storage)),
            }
        }

        fn loader(&self, kind: LoadCacheType) -> CacheLoader {
            CacheLoader::new(
                kind,
                self.cache.clone(),
                self.transport.clone(),
                self.sessions.clone(),
                self.notifications.clone(),
                INTERVAL,
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_commits_databases() {
        let h = LoaderHarness::new(
            ScriptedTransport::new().with_statuses(vec![status("running"), databases_result()]),
        );
        let loader = h.loader(LoadCacheType::Databases);

        let status = loader
            .start_loading(StartLoadingParams::new("example").with_mds_id("c1"))
            .await
            .unwrap();
        assert_eq!(status, DirectQueryLoadingStatus::Scheduled);
        assert_eq!(h.transport.submitted_queries(), vec!["SHOW SCHEMAS IN `example`"]);

        sleep(TICK).await;
        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Running);
        sleep(INTERVAL).await;
        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Success);

        let ds = h.cache.get_or_create_data_source("example", Some("c1")).unwrap();
        assert_eq!(ds.status, CachedDataSourceStatus::Updated);
        assert_eq!(ds.databases.len(), 2);
        assert!(h.notifications.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_builds_table_and_acceleration_statements() {
        let h = LoaderHarness::new(ScriptedTransport::new());
        let tables = h.loader(LoadCacheType::Tables);
        tables
            .start_loading(StartLoadingParams::new("example").with_database("sample"))
            .await
            .unwrap();
        let accelerations = h.loader(LoadCacheType::Accelerations);
        accelerations
            .start_loading(StartLoadingParams::new("example"))
            .await
            .unwrap();

        assert_eq!(
            h.transport.submitted_queries(),
            vec![
                "SHOW TABLE EXTENDED IN `example`.`sample` LIKE '*'",
                "SHOW FLINT INDEX in `example`"
            ]
        );
        tables.stop_loading();
        accelerations.stop_loading();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_rejects_incomplete_target() {
        let h = LoaderHarness::new(ScriptedTransport::new());
        let loader = h.loader(LoadCacheType::TableColumns);
        let err = loader
            .start_loading(StartLoadingParams::new("example").with_database("sample"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert!(h.transport.submitted_queries().is_empty());
        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_marks_cache_and_notifies_once() {
        let mut failed = status("FAILED");
        failed.error = Some("Spark job failed".to_string());
        let h = LoaderHarness::new(ScriptedTransport::new().with_statuses(vec![failed]));
        let loader = h.loader(LoadCacheType::Accelerations);

        loader.start_loading(StartLoadingParams::new("s3")).await.unwrap();
        sleep(TICK + INTERVAL * 2).await;

        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Failed);
        let entry = h.cache.get_or_create_accelerations_by_data_source("s3", None).unwrap();
        assert_eq!(entry.status, CachedDataSourceStatus::Failed);

        let toasts = h.notifications.snapshot();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(toasts[0].title, QUERY_FAILED_TITLE);
        assert_eq!(toasts[0].detail.as_deref(), Some("Spark job failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_marks_cache_failed() {
        let h = LoaderHarness::new(ScriptedTransport::new().with_submit_error("unauthorized"));
        let loader = h.loader(LoadCacheType::Databases);

        let status = loader.start_loading(StartLoadingParams::new("s3")).await.unwrap();
        assert_eq!(status, DirectQueryLoadingStatus::Failed);

        let ds = h.cache.get_or_create_data_source("s3", None).unwrap();
        assert_eq!(ds.status, CachedDataSourceStatus::Failed);
        assert_eq!(h.notifications.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_loader_never_commits() {
        let h = LoaderHarness::new(
            ScriptedTransport::new().with_statuses(vec![status("running"), databases_result()]),
        );
        let loader = h.loader(LoadCacheType::Databases);
        loader.start_loading(StartLoadingParams::new("s3")).await.unwrap();
        sleep(TICK).await;
        loader.stop_loading();
        sleep(INTERVAL * 3).await;

        assert!(h.cache.get_data_source_cache().unwrap().data_sources.is_empty());
        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successive_loads_reuse_session() {
        let h = LoaderHarness::new(
            ScriptedTransport::new().with_statuses(vec![databases_result()]),
        );
        let databases = h.loader(LoadCacheType::Databases);
        databases.start_loading(StartLoadingParams::new("s3")).await.unwrap();
        sleep(TICK).await;

        let tables = h.loader(LoadCacheType::Tables);
        tables
            .start_loading(StartLoadingParams::new("s3").with_database("Database1"))
            .await
            .unwrap();
        tables.stop_loading();

        let submitted = h.transport.submitted.lock().unwrap().clone();
        assert_eq!(submitted[0].0.session_id, None);
        assert_eq!(submitted[1].0.session_id.as_deref(), Some("session-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_shares_loader_per_target() {
        let h = LoaderHarness::new(ScriptedTransport::new());
        let registry = CacheLoaderRegistry::new(
            h.cache.clone(),
            h.transport.clone(),
            h.sessions.clone(),
            h.notifications.clone(),
            INTERVAL,
        );
        let target = StartLoadingParams::new("s3").with_mds_id("");
        assert!(registry.get(LoadCacheType::Databases, &target).is_none());

        let first = registry.get_or_create(LoadCacheType::Databases, &target);
        let again = registry.get_or_create(LoadCacheType::Databases, &StartLoadingParams::new("s3"));
        assert!(Arc::ptr_eq(&first, &again));

        let other = registry.get_or_create(LoadCacheType::Accelerations, &target);
        assert!(!Arc::ptr_eq(&first, &other));

        first.start_loading(target.clone()).await.unwrap();
        assert!(crate::models::is_catalog_cache_fetching(&registry.statuses()));
        registry.stop_all();
        assert!(!crate::models::is_catalog_cache_fetching(&registry.statuses()));
        assert!(registry.is_empty());
        assert_eq!(first.load_status(), DirectQueryLoadingStatus::Initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_evicts_idle_loaders_when_full() {
        let h = LoaderHarness::new(ScriptedTransport::new());
        let registry = CacheLoaderRegistry::new(
            h.cache.clone(),
            h.transport.clone(),
            h.sessions.clone(),
            h.notifications.clone(),
            INTERVAL,
        );
        let columns = |table: usize| {
            StartLoadingParams::new("s3")
                .with_database("default")
                .with_table(format!("t_{}", table))
        };

        let held = registry.get_or_create(LoadCacheType::TableColumns, &columns(0));
        let running = registry.get_or_create(LoadCacheType::TableColumns, &columns(1));
        running.start_loading(columns(1)).await.unwrap();
        drop(running);
        for table in 2..MAX_IDLE_LOADERS {
            registry.get_or_create(LoadCacheType::TableColumns, &columns(table));
        }
        assert_eq!(registry.len(), MAX_IDLE_LOADERS);

        registry.get_or_create(LoadCacheType::TableColumns, &columns(MAX_IDLE_LOADERS));
        assert_eq!(registry.len(), 3);
        assert!(registry.get(LoadCacheType::TableColumns, &columns(0)).is_some());
        assert!(registry.get(LoadCacheType::TableColumns, &columns(1)).is_some());
        assert!(registry.get(LoadCacheType::TableColumns, &columns(2)).is_none());

        drop(held);
        registry.stop_all();
    }

    #[test]
    fn test_concurrent_commits_keep_every_database() {
        let cache = cache();
        let names: Vec<String> = (0..8).map(|i| format!("db_{}", i)).collect();
        let rows: Vec<Value> = names.iter().map(|name| json!([name])).collect();
        update_databases_to_cache(&cache, "s3", Some(&result(&["namespace"], json!(rows))), None)
            .unwrap();

        std::thread::scope(|scope| {
            for name in &names {
                let cache = cache.clone();
                scope.spawn(move || {
                    update_tables_to_cache(&cache, "s3", name, Some(&tables_result()), None)
                        .unwrap();
                });
            }
            let cache = cache.clone();
            scope.spawn(move || {
                update_accelerations_to_cache(&cache, "s3", Some(&accelerations_result()), None)
                    .unwrap();
            });
        });

        let ds = cache.get_or_create_data_source("s3", None).unwrap();
        assert_eq!(ds.databases.len(), 8);
        for db in &ds.databases {
            assert_eq!(db.status, CachedDataSourceStatus::Updated, "{}", db.name);
            assert_eq!(db.tables.len(), 2, "{}", db.name);
        }
        let entry = cache.get_or_create_accelerations_by_data_source("s3", None).unwrap();
        assert_eq!(entry.accelerations.len(), 3);
    }

    #[tokio::test]
    async fn test_external_data_sources_loader() {
        let h = LoaderHarness::new(
            ScriptedTransport::new()
                .with_connections(
                    "cluster-1",
                    Ok(vec![
                        DataConnection {
                            name: "glue_one".to_string(),
                            connector: "S3GLUE".to_string(),
                            status: Some("ACTIVE".to_string()),
                        },
                        DataConnection {
                            name: "prom".to_string(),
                            connector: "PROMETHEUS".to_string(),
                            status: None,
                        },
                    ]),
                )
                .with_connections(
                    "cluster-2",
                    Ok(vec![DataConnection {
                        name: "glue_two".to_string(),
                        connector: "S3GLUE".to_string(),
                        status: None,
                    }]),
                ),
        );
        let loader =
            ExternalDataSourceLoader::new(h.cache.clone(), h.transport.clone(), h.notifications.clone());

        let found = loader
            .load(&["cluster-1".to_string(), "cluster-2".to_string()])
            .await;
        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Success);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].data_source_ref, "cluster-1");
        assert_eq!(found[1].name, "glue_two");

        let cached = h.cache.get_external_data_sources().unwrap();
        assert_eq!(cached.status, CachedDataSourceStatus::Updated);
        assert_eq!(cached.data_sources, found);
    }

    #[tokio::test]
    async fn test_external_data_sources_failure() {
        let h = LoaderHarness::new(
            ScriptedTransport::new().with_connections("cluster-1", Err("forbidden".to_string())),
        );
        let loader =
            ExternalDataSourceLoader::new(h.cache.clone(), h.transport.clone(), h.notifications.clone());

        assert!(loader.load(&["cluster-1".to_string()]).await.is_empty());
        assert_eq!(loader.load_status(), DirectQueryLoadingStatus::Failed);
        assert_eq!(
            h.cache.get_external_data_sources().unwrap().status,
            CachedDataSourceStatus::Failed
        );
        let toasts = h.notifications.snapshot();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, EXTERNAL_DATA_SOURCES_FAILED_TITLE);
    }
}
