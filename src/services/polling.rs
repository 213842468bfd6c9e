// Interval Poller
//
// Repeatedly invokes an async fetch function on a fixed interval and keeps
// the latest result, loading flag and error. Polling ends when a caller
// supplied predicate accepts a result or error, or when stopped explicitly.
//
// Fetches never overlap: the loop awaits each fetch before waiting for the
// next tick, and ticks missed while a fetch is in flight are skipped.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::CatalogError;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(5000);

pub type FetchFn<T, P> =
    Arc<dyn Fn(P) -> BoxFuture<'static, Result<T, CatalogError>> + Send + Sync>;
pub type SuccessPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub type ErrorPredicate = Arc<dyn Fn(&CatalogError) -> bool + Send + Sync>;

#[derive(Debug)]
struct PollState<T> {
    data: Option<T>,
    loading: bool,
    error: Option<String>,
}

struct Shared<T> {
    state: Mutex<PollState<T>>,
    should_poll: AtomicBool,
    in_flight: AtomicBool,
    /// Bumped on every start and stop so a superseded loop can tell it is stale.
    generation: AtomicU64,
}

impl<T> Shared<T> {
    fn is_current(&self, generation: u64) -> bool {
        self.should_poll.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn halt(&self) {
        self.should_poll.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Restartable, cancellable interval poller.
///
/// Dropping the poller stops it; a tick that fires afterwards has no effect.
pub struct Poller<T, P = ()> {
    fetch: FetchFn<T, P>,
    interval: Duration,
    on_success: Option<SuccessPredicate<T>>,
    on_error: Option<ErrorPredicate>,
    shared: Arc<Shared<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T, P> Poller<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(fetch: F, interval: Duration) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CatalogError>> + Send + 'static,
    {
        let fetch: FetchFn<T, P> = Arc::new(move |params| fetch(params).boxed());
        Self {
            fetch,
            interval,
            on_success: None,
            on_error: None,
            shared: Arc::new(Shared {
                state: Mutex::new(PollState {
                    data: None,
                    loading: false,
                    error: None,
                }),
                should_poll: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Stop polling once this returns true for a fetched result.
    pub fn on_success<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(predicate));
        self
    }

    /// Stop polling once this returns true for a fetch error.
    pub fn on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CatalogError) -> bool + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(predicate));
        self
    }

    /// Start ticking. A no-op while a polling loop is already active.
    pub fn start_polling(&self, params: P) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if self.shared.should_poll.load(Ordering::SeqCst) {
            tracing::debug!("Polling already active, ignoring start request");
            return;
        }
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.should_poll.store(true, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.loading = true;
        }

        let shared = self.shared.clone();
        let fetch = self.fetch.clone();
        let on_success = self.on_success.clone();
        let on_error = self.on_error.clone();
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !shared.is_current(generation) {
                    break;
                }

                shared.in_flight.store(true, Ordering::SeqCst);
                let result = fetch(params.clone()).await;
                shared.in_flight.store(false, Ordering::SeqCst);

                if !shared.is_current(generation) {
                    tracing::debug!("Discarding poll result that arrived after cancellation");
                    break;
                }

                let finished = match result {
                    Ok(data) => {
                        {
                            let mut state =
                                shared.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.data = Some(data.clone());
                            state.error = None;
                            state.loading = false;
                        }
                        on_success.as_ref().is_some_and(|done| done(&data))
                    }
                    Err(err) => {
                        tracing::warn!("Poll fetch failed: {}", err);
                        {
                            let mut state =
                                shared.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.error = Some(err.to_string());
                            state.loading = false;
                        }
                        on_error.as_ref().is_some_and(|done| done(&err))
                    }
                };

                if finished {
                    // Only halt if nothing restarted or stopped us meanwhile.
                    if shared.is_current(generation) {
                        shared.halt();
                    }
                    break;
                }
            }
        }));
    }

    /// Disable future ticks and cancel the timer. Idempotent.
    pub fn stop_polling(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if self.shared.should_poll.load(Ordering::SeqCst) {
            tracing::debug!("Stopping poller");
        }
        self.shared.halt();
        self.shared.in_flight.store(false, Ordering::SeqCst);
        if let Some(handle) = task.take() {
            handle.abort();
        }
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.loading = false;
    }

    pub fn is_polling(&self) -> bool {
        self.shared.should_poll.load(Ordering::SeqCst)
    }

    /// True while a fetch has been issued and not yet resolved.
    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn data(&self) -> Option<T> {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.data.clone()
    }

    pub fn loading(&self) -> bool {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.loading
    }

    pub fn error(&self) -> Option<String> {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.error.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<T, P> Drop for Poller<T, P> {
    fn drop(&mut self) {
        self.shared.halt();
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}
