// Catalog Cache Manager
//
// Owns the persisted catalog collections. Every mutation reads the whole
// collection, modifies it in memory and writes the whole blob back, all
// under one lock shared by every clone of the manager.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CatalogError;
use crate::models::{
    current_timestamp, normalize_mds_id, AccelerationsCacheData, CachedAcceleration,
    CachedAccelerationByDataSource, CachedDataSource, CachedDataSourceStatus, CachedDatabase,
    CachedTable, DataSourceCacheData, ExternalDataSource, ExternalDataSourcesCacheData,
    RecentDataSet, RecentDataSetOptionsCacheData,
};
use crate::storage::KeyValueStore;

pub const CATALOG_CACHE_KEY: &str = "async-query-catalog-cache";
pub const ACCELERATIONS_CACHE_KEY: &str = "async-query-acclerations-cache";
pub const EXTERNAL_DATA_SOURCES_CACHE_KEY: &str = "async-query-external-datasources-cache";
pub const RECENT_DATA_SETS_CACHE_KEY: &str = "async-query-recent-datasets-cache";

/// Maximum number of recently used data sets remembered.
pub const MAX_RECENT_DATA_SETS: usize = 4;

/// Named cache collections that can be cleared as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCollection {
    DataSources,
    Accelerations,
    ExternalDataSources,
    RecentDataSets,
}

impl CacheCollection {
    pub fn key(&self) -> &'static str {
        match self {
            CacheCollection::DataSources => CATALOG_CACHE_KEY,
            CacheCollection::Accelerations => ACCELERATIONS_CACHE_KEY,
            CacheCollection::ExternalDataSources => EXTERNAL_DATA_SOURCES_CACHE_KEY,
            CacheCollection::RecentDataSets => RECENT_DATA_SETS_CACHE_KEY,
        }
    }
}

/// Cache service for catalog metadata and accelerations.
/// Cheap to clone; clones share the underlying store and its lock.
#[derive(Clone)]
pub struct CatalogCacheManager {
    storage: Arc<dyn KeyValueStore>,
    /// Held for every read and every read-modify-write of a collection.
    lock: Arc<Mutex<()>>,
}

impl CatalogCacheManager {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read a collection, writing the default shape back when it is absent
    /// or cannot be parsed. Caller holds the lock.
    fn load_or_default<T>(&self, key: &str) -> Result<T, CatalogError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        if let Some(raw) = self.storage.get_item(key)? {
            match serde_json::from_str(&raw) {
                Ok(data) => return Ok(data),
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache blob under {}: {}", key, e);
                }
            }
        }

        let default = T::default();
        self.save(key, &default)?;
        Ok(default)
    }

    fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), CatalogError> {
        let raw = serde_json::to_string(data)?;
        self.storage.set_item(key, &raw)
    }

    fn read<T>(&self, key: &str) -> Result<T, CatalogError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let _guard = self.guard();
        self.load_or_default(key)
    }

    /// Load, modify and persist one collection as a single step. Nothing is
    /// written when `f` fails.
    fn modify<T, R, F>(&self, key: &str, f: F) -> Result<R, CatalogError>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> Result<R, CatalogError>,
    {
        let _guard = self.guard();
        let mut data: T = self.load_or_default(key)?;
        let out = f(&mut data)?;
        self.save(key, &data)?;
        Ok(out)
    }

    // ==================== Data source cache ====================

    pub fn get_data_source_cache(&self) -> Result<DataSourceCacheData, CatalogError> {
        self.read(CATALOG_CACHE_KEY)
    }

    pub fn save_data_source_cache(&self, cache: &DataSourceCacheData) -> Result<(), CatalogError> {
        let _guard = self.guard();
        self.save(CATALOG_CACHE_KEY, cache)
    }

    /// Run `f` against the data source collection under the cache lock and
    /// persist the result.
    pub fn with_data_source_cache<R, F>(&self, f: F) -> Result<R, CatalogError>
    where
        F: FnOnce(&mut DataSourceCacheData) -> Result<R, CatalogError>,
    {
        self.modify(CATALOG_CACHE_KEY, f)
    }

    /// Replace the entry matching `(name, mdsId)` or append it.
    pub fn add_or_update_data_source(
        &self,
        mut data_source: CachedDataSource,
        data_source_mds_id: Option<&str>,
    ) -> Result<(), CatalogError> {
        if let Some(id) = normalize_mds_id(data_source_mds_id) {
            data_source.data_source_mds_id = Some(id.to_string());
        }
        self.with_data_source_cache(|cache| {
            cache.upsert(data_source);
            Ok(())
        })
    }

    /// Look up a data source, inserting an `Empty` placeholder if absent.
    pub fn get_or_create_data_source(
        &self,
        data_source_name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Result<CachedDataSource, CatalogError> {
        if let Some(found) = self
            .get_data_source_cache()?
            .find(data_source_name, data_source_mds_id)
        {
            return Ok(found.clone());
        }

        tracing::debug!(
            "Creating cache entry for data source {} ({:?})",
            data_source_name,
            data_source_mds_id
        );
        self.with_data_source_cache(|cache| {
            Ok(cache
                .get_or_insert(data_source_name, data_source_mds_id)
                .clone())
        })
    }

    fn require_data_source(
        &self,
        data_source_name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Result<CachedDataSource, CatalogError> {
        self.get_data_source_cache()?
            .find(data_source_name, data_source_mds_id)
            .cloned()
            .ok_or_else(|| data_source_not_found(data_source_name))
    }

    pub fn get_database(
        &self,
        data_source_name: &str,
        database_name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Result<CachedDatabase, CatalogError> {
        self.require_data_source(data_source_name, data_source_mds_id)?
            .databases
            .into_iter()
            .find(|db| db.name == database_name)
            .ok_or_else(|| database_not_found(database_name))
    }

    pub fn get_table(
        &self,
        data_source_name: &str,
        database_name: &str,
        table_name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Result<CachedTable, CatalogError> {
        self.get_database(data_source_name, database_name, data_source_mds_id)?
            .tables
            .into_iter()
            .find(|table| table.name == table_name)
            .ok_or_else(|| CatalogError::NotFound(format!("Table not found: {}", table_name)))
    }

    /// Replace an existing database. Never inserts.
    pub fn update_database(
        &self,
        data_source_name: &str,
        database: CachedDatabase,
        data_source_mds_id: Option<&str>,
    ) -> Result<(), CatalogError> {
        let database_name = database.name.clone();
        self.with_database(data_source_name, &database_name, data_source_mds_id, |slot| {
            *slot = database;
            Ok(())
        })
    }

    /// Run `f` against an existing database entry under the cache lock and
    /// persist the result. `NotFound` when the data source or database is gone.
    pub fn with_database<R, F>(
        &self,
        data_source_name: &str,
        database_name: &str,
        data_source_mds_id: Option<&str>,
        f: F,
    ) -> Result<R, CatalogError>
    where
        F: FnOnce(&mut CachedDatabase) -> Result<R, CatalogError>,
    {
        self.with_data_source_cache(|cache| {
            let index = cache
                .position(data_source_name, data_source_mds_id)
                .ok_or_else(|| data_source_not_found(data_source_name))?;
            let database = cache.data_sources[index]
                .databases
                .iter_mut()
                .find(|db| db.name == database_name)
                .ok_or_else(|| database_not_found(database_name))?;
            f(database)
        })
    }

    pub fn clear_data_source_cache(&self) -> Result<(), CatalogError> {
        self.clear(CacheCollection::DataSources)
    }

    // ==================== Accelerations cache ====================

    pub fn get_accelerations_cache(&self) -> Result<AccelerationsCacheData, CatalogError> {
        self.read(ACCELERATIONS_CACHE_KEY)
    }

    pub fn save_accelerations_cache(
        &self,
        cache: &AccelerationsCacheData,
    ) -> Result<(), CatalogError> {
        let _guard = self.guard();
        self.save(ACCELERATIONS_CACHE_KEY, cache)
    }

    pub fn with_accelerations_cache<R, F>(&self, f: F) -> Result<R, CatalogError>
    where
        F: FnOnce(&mut AccelerationsCacheData) -> Result<R, CatalogError>,
    {
        self.modify(ACCELERATIONS_CACHE_KEY, f)
    }

    pub fn add_or_update_accelerations_by_data_source(
        &self,
        mut data_source: CachedAccelerationByDataSource,
        data_source_mds_id: Option<&str>,
    ) -> Result<(), CatalogError> {
        if let Some(id) = normalize_mds_id(data_source_mds_id) {
            data_source.data_source_mds_id = Some(id.to_string());
        }
        self.with_accelerations_cache(|cache| {
            cache.upsert(data_source);
            Ok(())
        })
    }

    pub fn get_or_create_accelerations_by_data_source(
        &self,
        data_source_name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Result<CachedAccelerationByDataSource, CatalogError> {
        if let Some(found) = self
            .get_accelerations_cache()?
            .find(data_source_name, data_source_mds_id)
        {
            return Ok(found.clone());
        }

        self.with_accelerations_cache(|cache| {
            Ok(cache
                .get_or_insert(data_source_name, data_source_mds_id)
                .clone())
        })
    }

    /// Cached accelerations built over one table.
    pub fn accelerations_for_table(
        &self,
        data_source_name: &str,
        database_name: &str,
        table_name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Result<Vec<CachedAcceleration>, CatalogError> {
        Ok(self
            .get_or_create_accelerations_by_data_source(data_source_name, data_source_mds_id)?
            .accelerations
            .into_iter()
            .filter(|acc| acc.database == database_name && acc.table == table_name)
            .collect())
    }

    pub fn clear_accelerations_cache(&self) -> Result<(), CatalogError> {
        self.clear(CacheCollection::Accelerations)
    }

    // ==================== External data sources ====================

    pub fn get_external_data_sources(&self) -> Result<ExternalDataSourcesCacheData, CatalogError> {
        self.read(EXTERNAL_DATA_SOURCES_CACHE_KEY)
    }

    pub fn update_external_data_sources(
        &self,
        external_data_sources: Vec<ExternalDataSource>,
    ) -> Result<(), CatalogError> {
        self.modify(
            EXTERNAL_DATA_SOURCES_CACHE_KEY,
            |cache: &mut ExternalDataSourcesCacheData| {
                cache.data_sources = external_data_sources;
                cache.last_updated = current_timestamp();
                cache.status = CachedDataSourceStatus::Updated;
                Ok(())
            },
        )
    }

    pub fn set_external_data_sources_loading_status(
        &self,
        status: CachedDataSourceStatus,
    ) -> Result<(), CatalogError> {
        self.modify(
            EXTERNAL_DATA_SOURCES_CACHE_KEY,
            |cache: &mut ExternalDataSourcesCacheData| {
                cache.status = status;
                Ok(())
            },
        )
    }

    pub fn clear_external_data_sources_cache(&self) -> Result<(), CatalogError> {
        self.clear(CacheCollection::ExternalDataSources)
    }

    // ==================== Recent data sets ====================

    pub fn add_recent_data_set(&self, data_set: RecentDataSet) -> Result<(), CatalogError> {
        self.modify(
            RECENT_DATA_SETS_CACHE_KEY,
            |cache: &mut RecentDataSetOptionsCacheData| {
                cache.recent_data_sets.retain(|existing| existing.id != data_set.id);
                cache.recent_data_sets.push(data_set);
                if cache.recent_data_sets.len() > MAX_RECENT_DATA_SETS {
                    cache.recent_data_sets.remove(0);
                }
                Ok(())
            },
        )
    }

    pub fn get_recent_data_sets(&self) -> Result<Vec<RecentDataSet>, CatalogError> {
        let cache: RecentDataSetOptionsCacheData = self.read(RECENT_DATA_SETS_CACHE_KEY)?;
        Ok(cache.recent_data_sets)
    }

    pub fn clear_recent_data_sets_cache(&self) -> Result<(), CatalogError> {
        self.clear(CacheCollection::RecentDataSets)
    }

    /// Drop a collection; the next read recreates its empty shape.
    pub fn clear(&self, collection: CacheCollection) -> Result<(), CatalogError> {
        let _guard = self.guard();
        self.storage.remove_item(collection.key())?;
        tracing::info!("Cleared cache collection {}", collection.key());
        Ok(())
    }
}

fn data_source_not_found(name: &str) -> CatalogError {
    CatalogError::NotFound(format!("DataSource not found: {}", name))
}

fn database_not_found(name: &str) -> CatalogError {
    CatalogError::NotFound(format!("Database not found: {}", name))
}
