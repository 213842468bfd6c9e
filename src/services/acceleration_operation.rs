// Acceleration Operations
//
// Runs DROP / VACUUM / REFRESH against a cached acceleration and reports a
// simplified in-progress / success / failure signal plus user notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CatalogError;
use crate::models::{
    AccelerationOperation, CachedAcceleration, DirectQueryLoadingStatus, DirectQueryRequest,
};
use crate::services::direct_query::{DirectQueryOptions, DirectQueryRunner, QueryOutcome};
use crate::services::notifications::NotificationSink;
use crate::services::query_builder::generate_acceleration_operation_query;
use crate::services::session::SessionStore;
use crate::services::transport::QueryTransport;

fn past_tense(operation: AccelerationOperation) -> &'static str {
    match operation {
        AccelerationOperation::Delete => "deleted",
        AccelerationOperation::Vacuum => "vacuumed",
        AccelerationOperation::Sync => "refreshed",
    }
}

#[derive(Default)]
struct OperationState {
    is_operating: AtomicBool,
    operation_success: AtomicBool,
    /// The latest operation went through the sync runner.
    sync_active: AtomicBool,
}

pub struct AccelerationOperator {
    notifications: Arc<dyn NotificationSink>,
    runner: DirectQueryRunner,
    /// Refresh jobs keep running after acknowledgment, so SCHEDULED ends them.
    sync_runner: DirectQueryRunner,
    state: Arc<OperationState>,
}

impl AccelerationOperator {
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        sessions: Arc<dyn SessionStore>,
        notifications: Arc<dyn NotificationSink>,
        interval: Duration,
    ) -> Self {
        let runner = DirectQueryRunner::new(
            transport.clone(),
            sessions.clone(),
            DirectQueryOptions {
                interval,
                stop_on_scheduled: false,
            },
        );
        let sync_runner = DirectQueryRunner::new(
            transport,
            sessions,
            DirectQueryOptions {
                interval,
                stop_on_scheduled: true,
            },
        );
        Self {
            notifications,
            runner,
            sync_runner,
            state: Arc::new(OperationState::default()),
        }
    }

    pub fn is_operating(&self) -> bool {
        self.state.is_operating.load(Ordering::SeqCst)
    }

    pub fn operation_success(&self) -> bool {
        self.state.operation_success.load(Ordering::SeqCst)
    }

    /// Status of the most recently started operation's job.
    pub fn status(&self) -> DirectQueryLoadingStatus {
        if self.state.sync_active.load(Ordering::SeqCst) {
            self.sync_runner.status()
        } else {
            self.runner.status()
        }
    }

    /// Start `operation` against `acceleration`. Fails immediately, without
    /// submitting anything, when no statement can be built for it.
    pub async fn perform_operation(
        &self,
        acceleration: &CachedAcceleration,
        data_source_name: &str,
        data_source_mds_id: Option<&str>,
        operation: AccelerationOperation,
    ) -> Result<DirectQueryLoadingStatus, CatalogError> {
        let query = generate_acceleration_operation_query(acceleration, data_source_name, operation)?;
        let display_name = acceleration.display_name().to_string();

        self.state.operation_success.store(false, Ordering::SeqCst);
        self.state.is_operating.store(true, Ordering::SeqCst);
        self.notifications.add_success(&format!(
            "Operation {} on acceleration {} is in progress",
            operation.as_str(),
            display_name
        ));

        let (runner, other) = match operation {
            AccelerationOperation::Sync => (&self.sync_runner, &self.runner),
            _ => (&self.runner, &self.sync_runner),
        };
        other.stop();
        self.state
            .sync_active
            .store(operation == AccelerationOperation::Sync, Ordering::SeqCst);

        let state = self.state.clone();
        let notifications = self.notifications.clone();
        let on_complete = Box::new(move |outcome: QueryOutcome| {
            state.is_operating.store(false, Ordering::SeqCst);
            match outcome {
                QueryOutcome::Succeeded(_) | QueryOutcome::Scheduled => {
                    state.operation_success.store(true, Ordering::SeqCst);
                    notifications.add_success(&format!(
                        "Successfully {} acceleration: {}",
                        past_tense(operation),
                        display_name
                    ));
                }
                QueryOutcome::Failed { error, .. } => {
                    state.operation_success.store(false, Ordering::SeqCst);
                    tracing::error!(
                        "Acceleration {} {} failed: {}",
                        display_name,
                        operation.as_str(),
                        error
                    );
                    notifications.add_danger(&format!(
                        "Failed to {} acceleration: {}",
                        operation.as_str(),
                        display_name
                    ));
                }
            }
        });

        tracing::info!("Running acceleration operation: {}", query);
        let request = DirectQueryRequest::sql(query, data_source_name);
        let connection_id = data_source_mds_id
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        Ok(runner.start(request, connection_id, on_complete).await)
    }

    /// Abandon the current operation; no outcome is reported for it.
    pub fn cancel(&self) {
        self.runner.stop();
        self.sync_runner.stop();
        self.state.is_operating.store(false, Ordering::SeqCst);
    }
}
