//! The query interface exposed to the frontend
use std::{collections::HashSet, sync::Arc, time::Duration};

use metronome_time::{SystemProvider, Time, TimeProvider};
use tracing::{debug, info};

use crate::{
    MetricsBackend, Result, SeriesData,
    catalog::{CatalogSnapshot, MetricCatalog, OnRefreshError},
    chunk::DEFAULT_URL_BUDGET,
    fetch::ChunkedFetcher,
    instrument::{Instrumentation, TracingInstrumentation},
    matcher::{MatchResult, PathMatcher},
    pool::WorkerPool,
    view::ViewMapper,
    window::TimeWindow,
    window_cache::WindowCache,
};

pub const DEFAULT_METRICS_CACHE_EXPIRY: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_POINTS: usize = 720;
pub const DEFAULT_ADDITIONAL_POINTS: usize = 100;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Tuning of a [`MetronomeFinder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinderConfig {
    /// How long the metric catalog is served before it is refreshed
    pub metrics_cache_expiry: Duration,
    /// Upper bound on the number of points requested per series
    pub max_points: usize,
    /// Leading samples fetched in addition to the requested range, see [`WindowCache`]
    pub additional_points: usize,
    /// Byte budget of the path list in one request URL
    pub url_budget: usize,
    /// Maximum number of requests in flight
    pub concurrency: usize,
    /// Deadline for each backend request
    pub request_timeout: Option<Duration>,
    pub on_refresh_error: OnRefreshError,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            metrics_cache_expiry: DEFAULT_METRICS_CACHE_EXPIRY,
            max_points: DEFAULT_MAX_POINTS,
            additional_points: DEFAULT_ADDITIONAL_POINTS,
            url_budget: DEFAULT_URL_BUDGET,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: None,
            on_refresh_error: OnRefreshError::default(),
        }
    }
}

/// A node of the metric tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    /// A metric that has data
    Leaf(String),
    /// A prefix of deeper metric paths
    Branch(String),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Self::Leaf(path) | Self::Branch(path) => path,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

#[derive(Debug)]
enum Query {
    Literal(String),
    Pattern(PathMatcher),
}

/// Lazily matches a query against one catalog snapshot
///
/// Every distinct matched path is yielded once.
#[derive(Debug)]
pub struct FindNodes {
    catalog: Arc<CatalogSnapshot>,
    query: Query,
    position: usize,
    seen: HashSet<String>,
}

impl Iterator for FindNodes {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        match &self.query {
            Query::Literal(path) => {
                if self.position > 0 {
                    return None;
                }
                self.position = 1;
                self.catalog
                    .contains(path)
                    .then(|| Node::Leaf(path.clone()))
            }
            Query::Pattern(matcher) => {
                while let Some(candidate) = self.catalog.paths().get(self.position) {
                    self.position += 1;
                    let node = match matcher.matches(candidate) {
                        MatchResult::NoMatch => continue,
                        MatchResult::Leaf(path) => Node::Leaf(path.to_string()),
                        MatchResult::Branch(path) => Node::Branch(path.to_string()),
                    };
                    if self.seen.insert(node.path().to_string()) {
                        return Some(node);
                    }
                }
                None
            }
        }
    }
}

/// Series for a set of paths over one window
#[derive(Debug)]
pub struct FetchResult {
    pub window: TimeWindow,
    pub series: SeriesData,
    /// Chunks that could not be fetched; their paths are missing from `series`
    pub warnings: Vec<crate::Error>,
}

/// Range of time data may be available for, in UNIX seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub earliest: i64,
    pub latest: i64,
}

/// Finds metric paths and fetches their series from a Metronome backend
#[derive(Debug)]
pub struct MetronomeFinder {
    backend: Arc<dyn MetricsBackend>,
    config: FinderConfig,
    view: ViewMapper,
    time_provider: Arc<dyn TimeProvider>,
    instrumentation: Arc<dyn Instrumentation>,
    catalog: MetricCatalog,
    fetcher: ChunkedFetcher,
    window_cache: WindowCache,
}

impl MetronomeFinder {
    pub fn new(backend: Arc<dyn MetricsBackend>, config: FinderConfig) -> Self {
        Self::assemble(
            backend,
            config,
            ViewMapper::default(),
            Arc::new(SystemProvider::new()),
            Arc::new(TracingInstrumentation),
        )
    }

    pub fn with_time_provider(self, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::assemble(
            self.backend,
            self.config,
            self.view,
            time_provider,
            self.instrumentation,
        )
    }

    pub fn with_instrumentation(self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        Self::assemble(
            self.backend,
            self.config,
            self.view,
            self.time_provider,
            instrumentation,
        )
    }

    fn assemble(
        backend: Arc<dyn MetricsBackend>,
        config: FinderConfig,
        view: ViewMapper,
        time_provider: Arc<dyn TimeProvider>,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> Self {
        let catalog = MetricCatalog::new(
            Arc::clone(&backend),
            view.clone(),
            config.metrics_cache_expiry,
            config.on_refresh_error,
            Arc::clone(&time_provider),
            Arc::clone(&instrumentation),
        )
        .with_request_timeout(config.request_timeout);
        let fetcher = ChunkedFetcher::new(
            Arc::clone(&backend),
            view.clone(),
            WorkerPool::new(config.concurrency),
            config.url_budget,
            Arc::clone(&instrumentation),
        );
        Self {
            backend,
            config,
            view,
            time_provider,
            instrumentation,
            catalog,
            fetcher,
            window_cache: WindowCache::new(),
        }
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Find the nodes matching a `foo.*.{a,b}.latency` query
    ///
    /// The pattern is validated before the catalog is consulted. Every call matches against the
    /// catalog as it is at that time.
    pub async fn find(&self, pattern: &str) -> Result<FindNodes> {
        let query = if PathMatcher::is_literal(pattern) {
            Query::Literal(pattern.to_string())
        } else {
            Query::Pattern(PathMatcher::compile(pattern)?)
        };
        let catalog = self.catalog.get_paths().await?;

        if let Query::Pattern(_) = query {
            info!(pattern, "find nodes");
        }
        Ok(FindNodes {
            catalog,
            query,
            position: 0,
            seen: HashSet::new(),
        })
    }

    /// Fetch the series of `paths` over `[start, end)`, in UNIX seconds
    pub async fn fetch(&self, paths: &[String], start: i64, end: i64) -> Result<FetchResult> {
        self.fetch_with_timeout(paths, start, end, self.config.request_timeout)
            .await
    }

    /// Like [`fetch`](Self::fetch), with a deadline for each backend request
    pub async fn fetch_with_timeout(
        &self,
        paths: &[String],
        start: i64,
        end: i64,
        timeout: Option<Duration>,
    ) -> Result<FetchResult> {
        let window = TimeWindow::new(start, end, self.config.max_points)?;
        info!(paths = %summarize(paths), start, end, "fetch");

        let cached = match paths {
            [path] => self
                .window_cache
                .try_serve(path, start, end)
                .map(|hit| (path, hit)),
            _ => None,
        };
        if let Some((path, (window, values))) = cached {
            debug!(%path, "window cache hit");
            return Ok(FetchResult {
                window,
                series: SeriesData::from([(path.clone(), values)]),
                warnings: vec![],
            });
        }

        let fetched = self
            .fetcher
            .fetch(paths, window, self.config.additional_points, timeout)
            .await?;
        let series = fetched.trimmed();
        self.window_cache.record(
            fetched.window,
            fetched.additional_points,
            fetched.extended_start,
            fetched.data,
        );

        Ok(FetchResult {
            window,
            series,
            warnings: fetched.warnings,
        })
    }

    /// A reader for the series of a single leaf
    pub fn reader(&self, path: impl Into<String>) -> MetricReader<'_> {
        MetricReader {
            path: path.into(),
            finder: self,
        }
    }

    /// The backend does not expose its retention, so data is assumed to span from the epoch
    /// until now
    pub fn get_time_bounds(&self, _path: &str) -> TimeBounds {
        TimeBounds {
            earliest: Time::EPOCH.timestamp(),
            latest: self.time_provider.now().timestamp(),
        }
    }
}

/// `a,b,c...+N`, listing at most three paths
fn summarize(paths: &[String]) -> String {
    let mut s = paths
        .iter()
        .take(3)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");
    if paths.len() > 3 {
        s.push_str(&format!("...+{}", paths.len() - 3));
    }
    s
}

/// Reads the series of one leaf path
#[derive(Debug)]
pub struct MetricReader<'a> {
    path: String,
    finder: &'a MetronomeFinder,
}

impl MetricReader<'_> {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The series over `[start, end)`, empty if the backend has no data for this path
    pub async fn fetch(&self, start: i64, end: i64) -> Result<(TimeWindow, Vec<Option<f64>>)> {
        let mut result = self
            .finder
            .fetch(std::slice::from_ref(&self.path), start, end)
            .await?;
        let values = result.series.remove(&self.path).unwrap_or_default();
        Ok((result.window, values))
    }

    pub fn intervals(&self) -> TimeBounds {
        self.finder.get_time_bounds(&self.path)
    }
}
