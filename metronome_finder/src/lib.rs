//! Graphite-style metric finder backed by a Metronome metrics service
//!
//! [`MetronomeFinder`] resolves `foo.*.{a,b}.latency` queries against the catalog of metric paths
//! known to the backend, and fetches series for matched leaves in URL-length-safe chunks. Two
//! caches sit in front of the backend: the [`MetricCatalog`], refreshed on expiry by a single
//! caller at a time, and the [`WindowCache`], which serves the narrow follow-up fetch a
//! `movingAverage()` call issues right after the wide one.
use std::{collections::HashMap, sync::Arc};

pub mod backend;
pub mod catalog;
pub mod chunk;
pub mod fetch;
pub mod finder;
pub mod instrument;
pub mod matcher;
pub mod pool;
pub mod view;
pub mod window;
pub mod window_cache;

pub use backend::{BackendError, MetricsBackend, RetrieveRequest};
pub use catalog::{CatalogSnapshot, CatalogStatus, MetricCatalog, OnRefreshError};
pub use finder::{
    FetchResult, FindNodes, FinderConfig, MetricReader, MetronomeFinder, Node, TimeBounds,
};
pub use instrument::{Instrumentation, RequestKind, TracingInstrumentation};
pub use matcher::{MatchResult, PathMatcher};
pub use view::{DERIVATIVE_SUFFIX, Unmapped, ViewMapper};
pub use window::TimeWindow;
pub use window_cache::WindowCache;

/// Series values keyed by metric path, one value per point of the owning [`TimeWindow`]
pub type SeriesData = HashMap<String, Vec<Option<f64>>>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("metric catalog unavailable: {source}")]
    CatalogUnavailable {
        #[source]
        source: Arc<BackendError>,
    },

    #[error("backend protocol error: {source}")]
    BackendProtocol {
        #[source]
        source: BackendError,
    },

    #[error("fetching a chunk of {paths} paths failed: {source}")]
    ChunkFetch {
        paths: usize,
        #[source]
        source: BackendError,
    },

    #[error("malformed view path {path:?}: expected at least {expected} segments")]
    MalformedViewPath { path: String, expected: usize },

    #[error("invalid time range: end {end} is not after start {start}")]
    InvalidTimeRange { start: i64, end: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
