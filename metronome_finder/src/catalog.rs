//! The cached universe of metric paths
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use metronome_time::{Time, TimeProvider};
use tokio::{sync::Mutex, time::Instant};
use tracing::{info, warn};

use crate::{
    BackendError, Error, MetricsBackend, Result,
    instrument::{Instrumentation, RequestKind},
    view::ViewMapper,
};

/// What to do when refreshing an expired catalog fails
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OnRefreshError {
    /// Keep serving the previous catalog, if there is one
    #[default]
    ServeStale,
    /// Report [`Error::CatalogUnavailable`]
    Fail,
}

/// How a catalog request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStatus {
    /// The cached catalog had not expired
    Hit,
    /// This caller refreshed the catalog
    Refreshed,
    /// This caller waited for a refresh started by another caller
    RefreshedByOther,
    /// The refresh failed and the previous catalog was served
    Stale,
}

/// An immutable, expanded catalog as loaded at one point in time
#[derive(Debug)]
pub struct CatalogSnapshot {
    paths: Vec<String>,
    set: HashSet<String>,
    loaded_at: Time,
}

impl CatalogSnapshot {
    fn new(paths: Vec<String>, loaded_at: Time) -> Self {
        let set = paths.iter().cloned().collect();
        Self {
            paths,
            set,
            loaded_at,
        }
    }

    /// Every known path, in backend order
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.set.contains(path)
    }

    pub fn loaded_at(&self) -> Time {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Outcome of the most recent refresh, shared with the callers that waited for it
#[derive(Debug, Default)]
struct RefreshState {
    last_error: Option<Arc<BackendError>>,
}

/// Holds the metric paths known to the backend, expanded with view paths
///
/// Reading a catalog that has not expired never blocks. Once it has expired, exactly one caller
/// refreshes it while concurrent callers wait for, and then share, that refresh's outcome.
#[derive(Debug)]
pub struct MetricCatalog {
    backend: Arc<dyn MetricsBackend>,
    view: ViewMapper,
    expiry: Duration,
    on_refresh_error: OnRefreshError,
    time_provider: Arc<dyn TimeProvider>,
    instrumentation: Arc<dyn Instrumentation>,
    /// Deadline for a single `get-metrics` call
    request_timeout: Option<Duration>,
    snapshot: ArcSwapOption<CatalogSnapshot>,
    /// Incremented after every refresh attempt
    generation: AtomicU64,
    refresh: Mutex<RefreshState>,
}

impl MetricCatalog {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        view: ViewMapper,
        expiry: Duration,
        on_refresh_error: OnRefreshError,
        time_provider: Arc<dyn TimeProvider>,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> Self {
        Self {
            backend,
            view,
            expiry,
            on_refresh_error,
            time_provider,
            instrumentation,
            request_timeout: None,
            snapshot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    /// Give up on a refresh after `timeout`, handling it like any other refresh failure
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The current catalog, refreshed first if it has expired
    pub async fn get_paths(&self) -> Result<Arc<CatalogSnapshot>> {
        self.get_paths_with_status()
            .await
            .map(|(snapshot, _)| snapshot)
    }

    pub async fn get_paths_with_status(&self) -> Result<(Arc<CatalogSnapshot>, CatalogStatus)> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok((snapshot, CatalogStatus::Hit));
        }

        let observed = self.generation.load(Ordering::Acquire);
        let mut state = self.refresh.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            // another caller refreshed while this one waited for the lock
            match &state.last_error {
                Some(e) => return self.refresh_failed(Arc::clone(e)),
                None => {
                    if let Some(snapshot) = self.snapshot.load_full() {
                        return Ok((snapshot, CatalogStatus::RefreshedByOther));
                    }
                }
            }
        }
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok((snapshot, CatalogStatus::RefreshedByOther));
        }

        let result = self.load().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        match result {
            Ok(snapshot) => {
                state.last_error = None;
                self.snapshot.store(Some(Arc::clone(&snapshot)));
                Ok((snapshot, CatalogStatus::Refreshed))
            }
            Err(e) => {
                let e = Arc::new(e);
                state.last_error = Some(Arc::clone(&e));
                self.refresh_failed(e)
            }
        }
    }

    /// The cached catalog regardless of its age, without contacting the backend
    pub fn cached(&self) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot.load_full()
    }

    fn fresh_snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        let snapshot = self.snapshot.load_full()?;
        let expired = match snapshot.loaded_at.checked_add(self.expiry) {
            Some(expires_at) => self.time_provider.now() > expires_at,
            None => false,
        };
        (!expired).then_some(snapshot)
    }

    fn refresh_failed(
        &self,
        error: Arc<BackendError>,
    ) -> Result<(Arc<CatalogSnapshot>, CatalogStatus)> {
        match (self.on_refresh_error, self.snapshot.load_full()) {
            (OnRefreshError::ServeStale, Some(stale)) => {
                warn!(
                    %error,
                    loaded_at = %stale.loaded_at,
                    age = ?self.time_provider.now().checked_duration_since(stale.loaded_at),
                    paths = stale.len(),
                    "failed to refresh metric catalog, serving stale catalog"
                );
                Ok((stale, CatalogStatus::Stale))
            }
            _ => Err(Error::CatalogUnavailable { source: error }),
        }
    }

    async fn load(&self) -> Result<Arc<CatalogSnapshot>, BackendError> {
        self.instrumentation
            .request_start(RequestKind::ListMetrics, 0);
        let t0 = Instant::now();

        let list = self.backend.list_metrics();
        let result = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, list)
                .await
                .unwrap_or_else(|_| Err(BackendError::DeadlineElapsed)),
            None => list.await,
        };
        let metrics = match result {
            Ok(metrics) => metrics,
            Err(e) => {
                self.instrumentation
                    .request_error(RequestKind::ListMetrics, &e);
                return Err(e);
            }
        };
        self.instrumentation
            .request_end(RequestKind::ListMetrics, t0.elapsed());
        info!(paths = metrics.len(), "Loaded {} metric paths", metrics.len());

        let paths = self.view.expand(&metrics);
        Ok(Arc::new(CatalogSnapshot::new(
            paths,
            self.time_provider.now(),
        )))
    }
}
