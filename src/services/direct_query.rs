// Direct Query Runner
//
// Submits one statement to the engine, then polls the job until it reaches a
// terminal state. Status transitions are published on a watch channel and the
// terminal outcome is handed to a completion handler exactly once per run.
//
//   INITIAL -> SCHEDULED -> {RUNNING, WAITING} -> {SUCCESS, FAILED, CANCELLED}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::CatalogError;
use crate::models::{AsyncPollingResult, DirectQueryLoadingStatus, DirectQueryRequest};
use crate::services::polling::{Poller, DEFAULT_POLLING_INTERVAL};
use crate::services::session::SessionStore;
use crate::services::transport::QueryTransport;

/// How a run ended.
#[derive(Debug)]
pub enum QueryOutcome {
    /// The job finished, or returned rows.
    Succeeded(AsyncPollingResult),
    /// The job was accepted and is left running on the engine.
    Scheduled,
    /// Submission was rejected or the job reached FAILED/CANCELLED.
    Failed {
        status: DirectQueryLoadingStatus,
        error: CatalogError,
    },
}

/// Invoked once with the terminal outcome of a run. Must not call back into
/// the runner that invoked it.
pub type CompletionHandler = Box<dyn FnOnce(QueryOutcome) + Send>;

#[derive(Debug, Clone, Copy)]
pub struct DirectQueryOptions {
    pub interval: Duration,
    /// Treat SCHEDULED as terminal (fire-and-forget jobs such as refreshes).
    pub stop_on_scheduled: bool,
}

impl Default for DirectQueryOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLLING_INTERVAL,
            stop_on_scheduled: false,
        }
    }
}

#[derive(Debug, Clone)]
struct PollTarget {
    query_id: String,
    connection_id: Option<String>,
}

struct RunState {
    /// Bumped on every start and stop; handlers of older runs are dropped.
    run: AtomicU64,
    handler: Mutex<Option<(u64, CompletionHandler)>>,
    status: watch::Sender<DirectQueryLoadingStatus>,
}

impl RunState {
    fn is_current(&self, run: u64) -> bool {
        self.run.load(Ordering::SeqCst) == run
    }

    fn set_status(&self, run: u64, status: DirectQueryLoadingStatus) {
        if self.is_current(run) {
            self.status.send_replace(status);
        }
    }

    /// Publish a terminal status and hand the outcome to the run's handler.
    fn finish(&self, run: u64, status: DirectQueryLoadingStatus, outcome: QueryOutcome) {
        let mut handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        if !self.is_current(run) {
            return;
        }
        self.status.send_replace(status);
        tracing::debug!("Query run {} finished with status {}", run, status.as_str());

        // Held across the call so a concurrent stop waits for the commit.
        if let Some((owner, on_complete)) = handler.take() {
            if owner == run {
                on_complete(outcome);
            }
        }
    }
}

/// Submit-and-poll driver shared by the cache loaders and acceleration
/// operations.
pub struct DirectQueryRunner {
    transport: Arc<dyn QueryTransport>,
    sessions: Arc<dyn SessionStore>,
    options: DirectQueryOptions,
    state: Arc<RunState>,
    poller: Mutex<Option<Poller<AsyncPollingResult, PollTarget>>>,
}

impl DirectQueryRunner {
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        sessions: Arc<dyn SessionStore>,
        options: DirectQueryOptions,
    ) -> Self {
        let (status, _) = watch::channel(DirectQueryLoadingStatus::Initial);
        Self {
            transport,
            sessions,
            options,
            state: Arc::new(RunState {
                run: AtomicU64::new(0),
                handler: Mutex::new(None),
                status,
            }),
            poller: Mutex::new(None),
        }
    }

    pub fn status(&self) -> DirectQueryLoadingStatus {
        *self.state.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectQueryLoadingStatus> {
        self.state.status.subscribe()
    }

    /// Last transport error seen while polling, if the latest fetch failed.
    pub fn poll_error(&self) -> Option<String> {
        self.poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|poller| poller.error())
    }

    /// Submit `request` and start polling its job. Any run still in progress
    /// is superseded and its handler dropped.
    ///
    /// Returns the status once submission has settled.
    pub async fn start(
        &self,
        mut request: DirectQueryRequest,
        connection_id: Option<String>,
        on_complete: CompletionHandler,
    ) -> DirectQueryLoadingStatus {
        self.stop_poller();
        let run = self.state.run.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some((run, on_complete));
        self.state.status.send_replace(DirectQueryLoadingStatus::Scheduled);

        let data_source = request.datasource.clone();
        match self.sessions.get_session_id(&data_source) {
            Ok(Some(session_id)) => request.session_id = Some(session_id),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read session id for {}: {}", data_source, e),
        }

        tracing::info!("Submitting query for data source {}: {}", data_source, request.query);
        let submitted = self
            .transport
            .submit_query(&request, connection_id.as_deref())
            .await;

        if !self.state.is_current(run) {
            tracing::debug!("Discarding submission response for a superseded run");
            return self.status();
        }

        let response = match submitted {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Query submission failed: {}", e);
                self.state.finish(
                    run,
                    DirectQueryLoadingStatus::Failed,
                    QueryOutcome::Failed {
                        status: DirectQueryLoadingStatus::Failed,
                        error: CatalogError::Submission(e.detail().to_string()),
                    },
                );
                return self.status();
            }
        };

        if let Some(session_id) = response.session_id.as_deref().filter(|id| !id.is_empty()) {
            if let Err(e) = self.sessions.set_session_id(&data_source, session_id) {
                tracing::warn!("Failed to store session id for {}: {}", data_source, e);
            }
        }

        let Some(query_id) = response.query_id.filter(|id| !id.is_empty()) else {
            tracing::error!("No query id found in response");
            self.state.finish(
                run,
                DirectQueryLoadingStatus::Failed,
                QueryOutcome::Failed {
                    status: DirectQueryLoadingStatus::Failed,
                    error: CatalogError::Submission("No query id found in response".to_string()),
                },
            );
            return self.status();
        };

        tracing::debug!("Polling job {} every {:?}", query_id, self.options.interval);
        let poller = self.build_poller(run);
        poller.start_polling(PollTarget {
            query_id,
            connection_id,
        });
        *self.poller.lock().unwrap_or_else(|e| e.into_inner()) = Some(poller);

        self.status()
    }

    fn build_poller(&self, run: u64) -> Poller<AsyncPollingResult, PollTarget> {
        let transport = self.transport.clone();
        let state = self.state.clone();
        let stop_on_scheduled = self.options.stop_on_scheduled;

        Poller::new(
            move |target: PollTarget| {
                let transport = transport.clone();
                async move {
                    transport
                        .fetch_job_status(&target.query_id, target.connection_id.as_deref())
                        .await
                }
            },
            self.options.interval,
        )
        .on_success(move |result: &AsyncPollingResult| {
            let status = result.normalized_status();
            match status {
                _ if status == DirectQueryLoadingStatus::Success || result.datarows.is_some() => {
                    state.finish(
                        run,
                        DirectQueryLoadingStatus::Success,
                        QueryOutcome::Succeeded(result.clone()),
                    );
                    true
                }
                DirectQueryLoadingStatus::Failed | DirectQueryLoadingStatus::Cancelled => {
                    let detail = result.error.clone().unwrap_or_default();
                    tracing::warn!("Job ended with status {}: {}", status.as_str(), detail);
                    state.finish(
                        run,
                        status,
                        QueryOutcome::Failed {
                            status,
                            error: CatalogError::Poll(detail),
                        },
                    );
                    true
                }
                DirectQueryLoadingStatus::Scheduled if stop_on_scheduled => {
                    state.finish(run, status, QueryOutcome::Scheduled);
                    true
                }
                _ => {
                    state.set_status(run, status);
                    false
                }
            }
        })
    }

    fn stop_poller(&self) {
        if let Some(poller) = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take() {
            poller.stop_polling();
        }
    }

    /// Stop polling and drop the pending handler; nothing is committed for
    /// the cancelled run. A run that had not finished goes back to INITIAL.
    pub fn stop(&self) {
        {
            let mut handler = self.state.handler.lock().unwrap_or_else(|e| e.into_inner());
            self.state.run.fetch_add(1, Ordering::SeqCst);
            handler.take();
        }
        self.stop_poller();

        if !self.status().is_terminal() {
            self.state.status.send_replace(DirectQueryLoadingStatus::Initial);
        }
    }
}

impl Drop for DirectQueryRunner {
    fn drop(&mut self) {
        self.state.run.fetch_add(1, Ordering::SeqCst);
    }
}
