//! Bounded-time, single-flight location query
//!
//! A cycle runs `Idle -> Running -> {Completed, Failed, Cancelled}` and can be
//! restarted from any terminal state. The provider's update, its failure, an
//! external [`LocationAcquirer::cancel`] and the timeout race each other; all
//! transitions happen under one mutex and the first to land wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{LocationEvent, LocationProvider, LocationRequest};
use crate::models::LocationFix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
struct QueryState {
    status: QueryStatus,
    deadline: Option<Instant>,
    last_fix: Option<LocationFix>,
    /// Distinguishes cycles so a late signal from an old cycle is ignored
    generation: u64,
    task: Option<JoinHandle<()>>,
}

enum Outcome {
    Fix(LocationFix),
    Failed(String),
    Cancelled(&'static str),
}

struct Inner {
    provider: Arc<dyn LocationProvider>,
    state: Mutex<QueryState>,
    status_tx: watch::Sender<QueryStatus>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        self: Arc<Self>,
        generation: u64,
        mut updates: BoxStream<'static, LocationEvent>,
        timeout: Duration,
    ) {
        let outcome = tokio::select! {
            event = updates.next() => match event {
                Some(LocationEvent::Update(fix)) => Outcome::Fix(fix),
                Some(LocationEvent::Failure(reason)) => Outcome::Failed(reason),
                Some(LocationEvent::Cancelled) => Outcome::Cancelled("provider cancelled"),
                None => Outcome::Failed("updates ended without a fix".to_string()),
            },
            () = tokio::time::sleep(timeout) => Outcome::Cancelled("timed out"),
        };
        drop(updates);
        self.finish(generation, outcome);
    }

    fn finish(&self, generation: u64, outcome: Outcome) {
        let mut state = self.lock();
        if state.generation != generation || state.status != QueryStatus::Running {
            debug!(generation, "Ignoring signal for a finished location query");
            return;
        }

        self.provider.cancel_updates();
        state.task = None;
        state.status = match outcome {
            Outcome::Fix(fix) => {
                info!("Location fix acquired: {}", fix.coordinate.format_coordinates());
                state.last_fix = Some(fix);
                QueryStatus::Completed
            }
            Outcome::Failed(reason) => {
                warn!("Location query failed: {reason}");
                state.last_fix = None;
                QueryStatus::Failed
            }
            Outcome::Cancelled(reason) => {
                info!("Location query cancelled: {reason}");
                state.last_fix = None;
                QueryStatus::Cancelled
            }
        };
        self.status_tx.send_replace(state.status);
    }
}

/// Acquires one location fix at a time.
///
/// Cloning yields another handle to the same query state.
#[derive(Clone)]
pub struct LocationAcquirer {
    inner: Arc<Inner>,
}

impl LocationAcquirer {
    #[must_use]
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        let (status_tx, _) = watch::channel(QueryStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                provider,
                state: Mutex::new(QueryState {
                    status: QueryStatus::Idle,
                    deadline: None,
                    last_fix: None,
                    generation: 0,
                    task: None,
                }),
                status_tx,
            }),
        }
    }

    /// Start a query cycle bounded by `timeout`.
    ///
    /// Returns `false` without touching the running cycle when one is already
    /// in flight. Must be called from within a Tokio runtime.
    pub fn start(&self, timeout: Duration) -> bool {
        let mut state = self.inner.lock();
        if state.status == QueryStatus::Running {
            debug!("Location query already running");
            return false;
        }

        state.generation += 1;
        state.status = QueryStatus::Running;
        state.last_fix = None;
        state.deadline = Some(Instant::now() + timeout);

        let updates = self
            .inner
            .provider
            .request_one_update(&LocationRequest::single_update(timeout));
        let inner = Arc::clone(&self.inner);
        state.task = Some(tokio::spawn(inner.run(state.generation, updates, timeout)));

        info!(generation = state.generation, ?timeout, "Location query started");
        self.inner.status_tx.send_replace(QueryStatus::Running);
        true
    }

    /// Cancel the running cycle, if any
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        if state.status != QueryStatus::Running {
            return;
        }

        if let Some(task) = state.task.take() {
            task.abort();
        }
        self.inner.provider.cancel_updates();
        state.last_fix = None;
        state.status = QueryStatus::Cancelled;
        info!(generation = state.generation, "Location query cancelled externally");
        self.inner.status_tx.send_replace(QueryStatus::Cancelled);
    }

    #[must_use]
    pub fn status(&self) -> QueryStatus {
        self.inner.lock().status
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == QueryStatus::Running
    }

    /// The fix from the last finished cycle; always `None` while running
    #[must_use]
    pub fn last_fix(&self) -> Option<LocationFix> {
        let state = self.inner.lock();
        match state.status {
            QueryStatus::Running => None,
            _ => state.last_fix,
        }
    }

    /// When the running (or last) cycle times out
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.lock().deadline
    }

    /// Wait until no cycle is running and return the resulting status
    pub async fn settled(&self) -> QueryStatus {
        let mut status_rx = self.inner.status_tx.subscribe();
        match status_rx
            .wait_for(|status| *status != QueryStatus::Running)
            .await
        {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;
    use futures::channel::mpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider whose events are pushed by the test
    #[derive(Default)]
    struct ScriptedProvider {
        senders: Mutex<Vec<mpsc::UnboundedSender<LocationEvent>>>,
        requests: Mutex<Vec<LocationRequest>>,
        cancels: AtomicUsize,
    }

    impl ScriptedProvider {
        fn emit(&self, event: LocationEvent) {
            if let Some(sender) = self.senders.lock().unwrap().last() {
                let _ = sender.unbounded_send(event);
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl LocationProvider for ScriptedProvider {
        fn request_one_update(
            &self,
            request: &LocationRequest,
        ) -> BoxStream<'static, LocationEvent> {
            let (tx, rx) = mpsc::unbounded();
            self.senders.lock().unwrap().push(tx);
            self.requests.lock().unwrap().push(request.clone());
            rx.boxed()
        }

        fn cancel_updates(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (LocationAcquirer, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::default());
        (LocationAcquirer::new(provider.clone()), provider)
    }

    fn fix() -> LocationFix {
        LocationFix::now(Coordinate::new(37.7, -122.4))
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_completes_query() {
        let (acquirer, provider) = setup();
        assert_eq!(acquirer.status(), QueryStatus::Idle);
        assert!(acquirer.last_fix().is_none());

        assert!(acquirer.start(Duration::from_secs(30)));
        assert!(acquirer.is_running());

        let fix = fix();
        provider.emit(LocationEvent::Update(fix));

        assert_eq!(acquirer.settled().await, QueryStatus::Completed);
        assert!(!acquirer.is_running());
        assert_eq!(acquirer.last_fix(), Some(fix));
        assert_eq!(acquirer.last_fix(), Some(fix));
        assert_eq!(provider.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_query() {
        let (acquirer, provider) = setup();
        let started = Instant::now();
        acquirer.start(Duration::from_secs(30));

        assert_eq!(acquirer.settled().await, QueryStatus::Cancelled);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
        assert!(acquirer.last_fix().is_none());
        assert_eq!(provider.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_coalesced() {
        let (acquirer, provider) = setup();
        let started = Instant::now();
        assert!(acquirer.start(Duration::from_secs(10)));
        let deadline = acquirer.deadline();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!acquirer.start(Duration::from_secs(10)));
        assert_eq!(acquirer.deadline(), deadline);
        assert_eq!(provider.request_count(), 1);

        // The first timer still fires at 10s
        assert_eq!(acquirer.settled().await, QueryStatus::Cancelled);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure() {
        let (acquirer, provider) = setup();
        acquirer.start(Duration::from_secs(30));
        provider.emit(LocationEvent::Failure("location disabled".to_string()));

        assert_eq!(acquirer.settled().await, QueryStatus::Failed);
        assert!(acquirer.last_fix().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_cancellation() {
        let (acquirer, provider) = setup();
        acquirer.start(Duration::from_secs(30));
        provider.emit(LocationEvent::Cancelled);

        assert_eq!(acquirer.settled().await, QueryStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_wins_over_late_update() {
        let (acquirer, provider) = setup();
        acquirer.start(Duration::from_secs(30));
        acquirer.cancel();
        provider.emit(LocationEvent::Update(fix()));

        assert_eq!(acquirer.settled().await, QueryStatus::Cancelled);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(acquirer.status(), QueryStatus::Cancelled);
        assert!(acquirer.last_fix().is_none());
        assert_eq!(provider.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_clears_previous_fix() {
        let (acquirer, provider) = setup();
        acquirer.start(Duration::from_secs(30));
        provider.emit(LocationEvent::Update(fix()));
        assert_eq!(acquirer.settled().await, QueryStatus::Completed);
        assert!(acquirer.last_fix().is_some());

        assert!(acquirer.start(Duration::from_secs(30)));
        assert!(acquirer.last_fix().is_none());
        assert_eq!(provider.request_count(), 2);

        assert_eq!(acquirer.settled().await, QueryStatus::Cancelled);
        assert!(acquirer.last_fix().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_parameters() {
        let (acquirer, provider) = setup();
        acquirer.start(Duration::from_millis(1500));

        let requests = provider.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![LocationRequest::single_update(Duration::from_millis(1500))]);
    }
}
