use serde::{Deserialize, Serialize};

use super::acceleration::CachedAcceleration;

/// Version tag written alongside every persisted collection.
pub const CATALOG_CACHE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CachedDataSourceStatus {
    #[default]
    Empty,
    Updated,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedColumn {
    pub field_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedTable {
    pub name: String,
    /// `None` until the table has been described.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<CachedColumn>>,
}

impl CachedTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedDatabase {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<CachedTable>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub status: CachedDataSourceStatus,
}

impl CachedDatabase {
    /// Placeholder entry produced by a `databases` discovery.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            last_updated: String::new(),
            status: CachedDataSourceStatus::Empty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedDataSource {
    pub name: String,
    #[serde(
        rename = "dataSourceMDSId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_source_mds_id: Option<String>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub status: CachedDataSourceStatus,
    #[serde(default)]
    pub databases: Vec<CachedDatabase>,
}

impl CachedDataSource {
    pub fn new(name: impl Into<String>, data_source_mds_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            data_source_mds_id: normalize_mds_id(data_source_mds_id).map(str::to_string),
            last_updated: String::new(),
            status: CachedDataSourceStatus::Empty,
            databases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceCacheData {
    pub version: String,
    pub data_sources: Vec<CachedDataSource>,
}

impl Default for DataSourceCacheData {
    fn default() -> Self {
        Self {
            version: CATALOG_CACHE_VERSION.to_string(),
            data_sources: Vec::new(),
        }
    }
}

impl DataSourceCacheData {
    pub fn position(&self, name: &str, data_source_mds_id: Option<&str>) -> Option<usize> {
        self.data_sources.iter().position(|ds| {
            matches_data_source(&ds.name, ds.data_source_mds_id.as_deref(), name, data_source_mds_id)
        })
    }

    pub fn find(&self, name: &str, data_source_mds_id: Option<&str>) -> Option<&CachedDataSource> {
        self.position(name, data_source_mds_id)
            .map(|index| &self.data_sources[index])
    }

    /// Entry for `(name, mdsId)`, appending an `Empty` placeholder if absent.
    pub fn get_or_insert(
        &mut self,
        name: &str,
        data_source_mds_id: Option<&str>,
    ) -> &mut CachedDataSource {
        let index = match self.position(name, data_source_mds_id) {
            Some(index) => index,
            None => {
                self.data_sources
                    .push(CachedDataSource::new(name, data_source_mds_id));
                self.data_sources.len() - 1
            }
        };
        &mut self.data_sources[index]
    }

    /// Replace the entry with the same identity or append.
    pub fn upsert(&mut self, data_source: CachedDataSource) {
        match self.position(&data_source.name, data_source.data_source_mds_id.as_deref()) {
            Some(index) => self.data_sources[index] = data_source,
            None => self.data_sources.push(data_source),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedAccelerationByDataSource {
    pub name: String,
    #[serde(
        rename = "dataSourceMDSId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_source_mds_id: Option<String>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub status: CachedDataSourceStatus,
    #[serde(default)]
    pub accelerations: Vec<CachedAcceleration>,
}

impl CachedAccelerationByDataSource {
    pub fn new(name: impl Into<String>, data_source_mds_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            data_source_mds_id: normalize_mds_id(data_source_mds_id).map(str::to_string),
            last_updated: String::new(),
            status: CachedDataSourceStatus::Empty,
            accelerations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccelerationsCacheData {
    pub version: String,
    pub data_sources: Vec<CachedAccelerationByDataSource>,
}

impl Default for AccelerationsCacheData {
    fn default() -> Self {
        Self {
            version: CATALOG_CACHE_VERSION.to_string(),
            data_sources: Vec::new(),
        }
    }
}

impl AccelerationsCacheData {
    pub fn position(&self, name: &str, data_source_mds_id: Option<&str>) -> Option<usize> {
        self.data_sources.iter().position(|ds| {
            matches_data_source(&ds.name, ds.data_source_mds_id.as_deref(), name, data_source_mds_id)
        })
    }

    pub fn find(
        &self,
        name: &str,
        data_source_mds_id: Option<&str>,
    ) -> Option<&CachedAccelerationByDataSource> {
        self.position(name, data_source_mds_id)
            .map(|index| &self.data_sources[index])
    }

    pub fn get_or_insert(
        &mut self,
        name: &str,
        data_source_mds_id: Option<&str>,
    ) -> &mut CachedAccelerationByDataSource {
        let index = match self.position(name, data_source_mds_id) {
            Some(index) => index,
            None => {
                self.data_sources
                    .push(CachedAccelerationByDataSource::new(name, data_source_mds_id));
                self.data_sources.len() - 1
            }
        };
        &mut self.data_sources[index]
    }

    pub fn upsert(&mut self, data_source: CachedAccelerationByDataSource) {
        match self.position(&data_source.name, data_source.data_source_mds_id.as_deref()) {
            Some(index) => self.data_sources[index] = data_source,
            None => self.data_sources.push(data_source),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDataSource {
    pub name: String,
    pub status: String,
    pub data_source_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDataSourcesCacheData {
    pub version: String,
    pub data_sources: Vec<ExternalDataSource>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub status: CachedDataSourceStatus,
}

impl Default for ExternalDataSourcesCacheData {
    fn default() -> Self {
        Self {
            version: CATALOG_CACHE_VERSION.to_string(),
            data_sources: Vec::new(),
            last_updated: String::new(),
            status: CachedDataSourceStatus::Empty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentDataSet {
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_set_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentDataSetOptionsCacheData {
    pub version: String,
    pub recent_data_sets: Vec<RecentDataSet>,
}

impl Default for RecentDataSetOptionsCacheData {
    fn default() -> Self {
        Self {
            version: CATALOG_CACHE_VERSION.to_string(),
            recent_data_sets: Vec::new(),
        }
    }
}

/// Treats an empty connection id the same as an absent one.
pub fn normalize_mds_id(data_source_mds_id: Option<&str>) -> Option<&str> {
    data_source_mds_id.filter(|id| !id.is_empty())
}

/// Identity rule shared by every data source lookup and write: match on
/// `(name, mdsId)` when a connection id is supplied, else on name alone.
pub fn matches_data_source(
    entry_name: &str,
    entry_mds_id: Option<&str>,
    name: &str,
    data_source_mds_id: Option<&str>,
) -> bool {
    if entry_name != name {
        return false;
    }
    match normalize_mds_id(data_source_mds_id) {
        Some(id) => entry_mds_id == Some(id),
        None => true,
    }
}

/// Timestamp format used for `lastUpdated` fields.
pub fn current_timestamp() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
