//! Hooks invoked around every backend request
use std::{fmt::Display, time::Duration};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// A `get-metrics` catalog listing
    ListMetrics,
    /// A `retrieve` call for one chunk of paths
    Retrieve,
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListMetrics => write!(f, "get-metrics"),
            Self::Retrieve => write!(f, "retrieve"),
        }
    }
}

/// Observer of backend requests, injected into the catalog and the fetcher
pub trait Instrumentation: std::fmt::Debug + Send + Sync + 'static {
    /// A request for `paths` metric paths is about to be sent
    fn request_start(&self, kind: RequestKind, paths: usize);

    /// A request completed successfully after `elapsed`
    fn request_end(&self, kind: RequestKind, elapsed: Duration);

    /// A request failed
    fn request_error(&self, kind: RequestKind, error: &(dyn std::error::Error + 'static));
}

/// Logs request timings at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn request_start(&self, kind: RequestKind, paths: usize) {
        debug!(%kind, paths, "backend request");
    }

    fn request_end(&self, kind: RequestKind, elapsed: Duration) {
        debug!(%kind, elapsed_secs = elapsed.as_secs_f64(), "backend request took {elapsed:?}");
    }

    fn request_error(&self, kind: RequestKind, error: &(dyn std::error::Error + 'static)) {
        debug!(%kind, %error, "backend request failed");
    }
}
