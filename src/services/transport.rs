// Async query engine transport
//
// Submits statements to the engine's job API and fetches job status.
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use url::Url;

use crate::error::CatalogError;
use crate::models::{AsyncPollingResult, DataConnection, DirectQueryRequest, SubmitQueryResponse};

const JOBS_PATH: &str = "api/enhancements/datasource/jobs";
const DATA_CONNECTIONS_PATH: &str = "api/dataconnections";

/// Transport to the remote query engine
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Submit a statement; the engine answers with a job id and session id.
    async fn submit_query(
        &self,
        request: &DirectQueryRequest,
        connection_id: Option<&str>,
    ) -> Result<SubmitQueryResponse, CatalogError>;

    /// Fetch the current status (and rows, once done) of a job.
    async fn fetch_job_status(
        &self,
        query_id: &str,
        connection_id: Option<&str>,
    ) -> Result<AsyncPollingResult, CatalogError>;

    /// List the data connections registered on a cluster.
    async fn list_data_connections(
        &self,
        connection_id: Option<&str>,
    ) -> Result<Vec<DataConnection>, CatalogError>;
}

/// HTTP transport using the engine's REST job API
pub struct HttpQueryTransport {
    base_url: Url,
    client: Client,
}

impl HttpQueryTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, CatalogError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::Validation(format!("Invalid engine URL: {}", e)))?;

        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(CatalogError::Validation(
                "Engine URL must use http:// or https:// scheme".to_string(),
            ));
        }
        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CatalogError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::Validation(format!("Invalid endpoint {}: {}", path, e)))
    }

    /// Turn a non-2xx response into a transport error, preferring the
    /// `message` field of a JSON error body.
    async fn check(response: Response) -> Result<Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        Err(CatalogError::Transport(format!("HTTP {}: {}", status, message)))
    }
}

#[async_trait]
impl QueryTransport for HttpQueryTransport {
    async fn submit_query(
        &self,
        request: &DirectQueryRequest,
        connection_id: Option<&str>,
    ) -> Result<SubmitQueryResponse, CatalogError> {
        let endpoint = self.endpoint(JOBS_PATH)?;
        tracing::debug!("Submitting query to {}: {}", endpoint, request.query);

        let response = self
            .client
            .post(endpoint)
            .query(&[("id", connection_id.unwrap_or_default())])
            .json(request)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn fetch_job_status(
        &self,
        query_id: &str,
        connection_id: Option<&str>,
    ) -> Result<AsyncPollingResult, CatalogError> {
        let endpoint = self.endpoint(JOBS_PATH)?;

        let response = self
            .client
            .get(endpoint)
            .query(&[("id", connection_id.unwrap_or_default()), ("queryId", query_id)])
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn list_data_connections(
        &self,
        connection_id: Option<&str>,
    ) -> Result<Vec<DataConnection>, CatalogError> {
        let endpoint = self.endpoint(&format!(
            "{}/dataSourceMDSId={}",
            DATA_CONNECTIONS_PATH,
            connection_id.unwrap_or_default()
        ))?;

        let response = self.client.get(endpoint).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

/// Scripted transport for exercising the orchestration layers in tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct ScriptedTransport {
        submit_response: Mutex<Result<SubmitQueryResponse, String>>,
        statuses: Mutex<VecDeque<AsyncPollingResult>>,
        last_status: Mutex<Option<AsyncPollingResult>>,
        connections: Mutex<HashMap<String, Result<Vec<DataConnection>, String>>>,
        pub submitted: Mutex<Vec<(DirectQueryRequest, Option<String>)>>,
        pub status_calls: AtomicUsize,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self {
                submit_response: Mutex::new(Ok(SubmitQueryResponse {
                    query_id: Some("query-1".to_string()),
                    session_id: Some("session-1".to_string()),
                })),
                statuses: Mutex::new(VecDeque::new()),
                last_status: Mutex::new(None),
                connections: Mutex::new(HashMap::new()),
                submitted: Mutex::new(Vec::new()),
                status_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_submit_response(self, response: SubmitQueryResponse) -> Self {
            *self.submit_response.lock().unwrap() = Ok(response);
            self
        }

        pub(crate) fn with_submit_error(self, message: &str) -> Self {
            *self.submit_response.lock().unwrap() = Err(message.to_string());
            self
        }

        /// Statuses are returned in order; the last one repeats.
        pub(crate) fn with_statuses(self, statuses: Vec<AsyncPollingResult>) -> Self {
            *self.statuses.lock().unwrap() = statuses.into();
            self
        }

        pub(crate) fn with_connections(
            self,
            connection_id: &str,
            connections: Result<Vec<DataConnection>, String>,
        ) -> Self {
            self.connections
                .lock()
                .unwrap()
                .insert(connection_id.to_string(), connections);
            self
        }

        pub(crate) fn submitted_queries(&self) -> Vec<String> {
            self.submitted
                .lock()
                .unwrap()
                .iter()
                .map(|(request, _)| request.query.clone())
                .collect()
        }

        pub(crate) fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn status(status: &str) -> AsyncPollingResult {
        AsyncPollingResult {
            status: status.to_string(),
            ..Default::default()
        }
    }

    #[async_trait]
    impl QueryTransport for ScriptedTransport {
        async fn submit_query(
            &self,
            request: &DirectQueryRequest,
            connection_id: Option<&str>,
        ) -> Result<SubmitQueryResponse, CatalogError> {
            self.submitted
                .lock()
                .unwrap()
                .push((request.clone(), connection_id.map(str::to_string)));
            self.submit_response
                .lock()
                .unwrap()
                .clone()
                .map_err(CatalogError::Transport)
        }

        async fn fetch_job_status(
            &self,
            _query_id: &str,
            _connection_id: Option<&str>,
        ) -> Result<AsyncPollingResult, CatalogError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.statuses.lock().unwrap().pop_front();
            let mut last = self.last_status.lock().unwrap();
            if let Some(next) = next {
                *last = Some(next);
            }
            Ok(last.clone().unwrap_or_else(|| status("running")))
        }

        async fn list_data_connections(
            &self,
            connection_id: Option<&str>,
        ) -> Result<Vec<DataConnection>, CatalogError> {
            self.connections
                .lock()
                .unwrap()
                .get(connection_id.unwrap_or_default())
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
                .map_err(CatalogError::Transport)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_scheme() {
        let result = HttpQueryTransport::new("ftp://localhost:5601", 30);
        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(HttpQueryTransport::new("not a url", 30).is_err());
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let transport = HttpQueryTransport::new("http://localhost:5601/dashboards", 30).unwrap();
        assert_eq!(
            transport.endpoint(JOBS_PATH).unwrap().as_str(),
            "http://localhost:5601/dashboards/api/enhancements/datasource/jobs"
        );

        let root = HttpQueryTransport::new("http://localhost:5601", 30).unwrap();
        assert_eq!(
            root.endpoint(JOBS_PATH).unwrap().as_str(),
            "http://localhost:5601/api/enhancements/datasource/jobs"
        );
    }
}
