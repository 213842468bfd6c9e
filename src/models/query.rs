use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of a submitted discovery or operation query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectQueryLoadingStatus {
    #[default]
    Initial,
    Scheduled,
    Running,
    Waiting,
    Success,
    Failed,
    Cancelled,
}

impl DirectQueryLoadingStatus {
    /// Parses the status string reported by the engine. Case-insensitive;
    /// unknown values are treated as still running.
    pub fn from_engine(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "initial" => DirectQueryLoadingStatus::Initial,
            "scheduled" => DirectQueryLoadingStatus::Scheduled,
            "waiting" => DirectQueryLoadingStatus::Waiting,
            "success" => DirectQueryLoadingStatus::Success,
            "failed" => DirectQueryLoadingStatus::Failed,
            "cancelled" => DirectQueryLoadingStatus::Cancelled,
            "running" => DirectQueryLoadingStatus::Running,
            other => {
                tracing::debug!("Unrecognised job status '{}', treating as running", other);
                DirectQueryLoadingStatus::Running
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DirectQueryLoadingStatus::Success
                | DirectQueryLoadingStatus::Failed
                | DirectQueryLoadingStatus::Cancelled
        )
    }

    pub fn is_fetching(&self) -> bool {
        matches!(
            self,
            DirectQueryLoadingStatus::Scheduled
                | DirectQueryLoadingStatus::Running
                | DirectQueryLoadingStatus::Waiting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectQueryLoadingStatus::Initial => "initial",
            DirectQueryLoadingStatus::Scheduled => "scheduled",
            DirectQueryLoadingStatus::Running => "running",
            DirectQueryLoadingStatus::Waiting => "waiting",
            DirectQueryLoadingStatus::Success => "success",
            DirectQueryLoadingStatus::Failed => "failed",
            DirectQueryLoadingStatus::Cancelled => "cancelled",
        }
    }
}

/// True while any of the given loads is still in flight.
pub fn is_catalog_cache_fetching(statuses: &[DirectQueryLoadingStatus]) -> bool {
    statuses.iter().any(DirectQueryLoadingStatus::is_fetching)
}

/// Catalog discovery intents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LoadCacheType {
    Databases,
    Tables,
    Accelerations,
    TableColumns,
}

impl LoadCacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadCacheType::Databases => "databases",
            LoadCacheType::Tables => "tables",
            LoadCacheType::Accelerations => "accelerations",
            LoadCacheType::TableColumns => "tableColumns",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct StartLoadingParams {
    pub data_source_name: String,
    #[serde(rename = "dataSourceMDSId", default)]
    pub data_source_mds_id: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
}

impl StartLoadingParams {
    pub fn new(data_source_name: impl Into<String>) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            ..Default::default()
        }
    }

    pub fn with_mds_id(mut self, data_source_mds_id: impl Into<String>) -> Self {
        self.data_source_mds_id = Some(data_source_mds_id.into());
        self
    }

    pub fn with_database(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = Some(database_name.into());
        self
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }
}

/// Body of a query submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectQueryRequest {
    pub query: String,
    pub lang: String,
    pub datasource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl DirectQueryRequest {
    pub fn sql(query: impl Into<String>, datasource: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            lang: "sql".to_string(),
            datasource: datasource.into(),
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQueryResponse {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

/// Job status as returned by the engine: columnar schema plus rows once done.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AsyncPollingResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub schema: Option<Vec<SchemaField>>,
    #[serde(default)]
    pub datarows: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AsyncPollingResult {
    pub fn normalized_status(&self) -> DirectQueryLoadingStatus {
        DirectQueryLoadingStatus::from_engine(&self.status)
    }

    /// Zips every data row with the schema's column names.
    pub fn combined_rows(&self) -> Vec<Map<String, Value>> {
        let schema = self.schema.as_deref().unwrap_or_default();
        self.datarows
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|row| {
                schema
                    .iter()
                    .zip(row.iter())
                    .map(|(field, value)| (field.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Reads a column as text; missing and null values read as empty.
pub fn row_string(row: &Map<String, Value>, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub fn row_bool(row: &Map<String, Value>, column: &str) -> bool {
    match row.get(column) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// A data connection registered on a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataConnection {
    pub name: String,
    pub connector: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!(
            DirectQueryLoadingStatus::from_engine("SUCCESS"),
            DirectQueryLoadingStatus::Success
        );
        assert_eq!(
            DirectQueryLoadingStatus::from_engine("Failed"),
            DirectQueryLoadingStatus::Failed
        );
        assert_eq!(
            DirectQueryLoadingStatus::from_engine("waiting"),
            DirectQueryLoadingStatus::Waiting
        );
        assert_eq!(
            DirectQueryLoadingStatus::from_engine("pending_something"),
            DirectQueryLoadingStatus::Running
        );
    }

    #[test]
    fn test_fetching_helper() {
        use DirectQueryLoadingStatus::*;
        assert!(is_catalog_cache_fetching(&[Success, Running]));
        assert!(is_catalog_cache_fetching(&[Scheduled]));
        assert!(!is_catalog_cache_fetching(&[Initial, Success, Failed, Cancelled]));
        assert!(!is_catalog_cache_fetching(&[]));
    }

    #[test]
    fn test_combined_rows() {
        let result: AsyncPollingResult = serde_json::from_value(json!({
            "status": "SUCCESS",
            "schema": [{"name": "namespace", "type": "string"}, {"name": "count", "type": "integer"}],
            "datarows": [["db1", 3], ["db2", null]]
        }))
        .unwrap();

        let rows = result.combined_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(row_string(&rows[0], "namespace"), "db1");
        assert_eq!(row_string(&rows[0], "count"), "3");
        assert_eq!(row_string(&rows[1], "count"), "");
        assert_eq!(row_string(&rows[1], "missing"), "");
    }

    #[test]
    fn test_combined_rows_without_payload() {
        let result = AsyncPollingResult {
            status: "running".to_string(),
            ..Default::default()
        };
        assert!(result.combined_rows().is_empty());
    }

    #[test]
    fn test_request_omits_missing_session() {
        let request = DirectQueryRequest::sql("SHOW SCHEMAS IN `s3`", "s3");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["lang"], "sql");
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_load_params_deserialize() {
        let params: StartLoadingParams = serde_json::from_value(json!({
            "dataSourceName": "s3",
            "dataSourceMDSId": "c1",
            "databaseName": "default"
        }))
        .unwrap();
        assert_eq!(params.data_source_mds_id.as_deref(), Some("c1"));
        assert!(params.table_name.is_none());
    }
}
