//! Chunked, concurrent retrieval of series from the backend
use std::{collections::HashSet, sync::Arc, time::Duration};

use metronome_client::{DataPoint, RetrieveResponse};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::{
    BackendError, Error, MetricsBackend, Result, RetrieveRequest, SeriesData,
    chunk::chunk_paths,
    instrument::{Instrumentation, RequestKind},
    pool::WorkerPool,
    view::{DERIVATIVE_SUFFIX, ViewMapper},
    window::TimeWindow,
};

/// Series fetched over a [`TimeWindow`] extended by `additional_points` leading samples
#[derive(Debug)]
pub struct ExtendedFetch {
    pub window: TimeWindow,
    pub additional_points: usize,
    pub extended_start: i64,
    /// Keyed by the requested paths, including the leading samples
    pub data: SeriesData,
    /// Chunks that failed and were left out of `data`
    pub warnings: Vec<Error>,
}

impl ExtendedFetch {
    /// `data` without the leading samples, aligned with `window`
    pub fn trimmed(&self) -> SeriesData {
        self.data
            .iter()
            .map(|(path, values)| {
                let values = values
                    .get(self.additional_points..)
                    .map(<[_]>::to_vec)
                    .unwrap_or_default();
                (path.clone(), values)
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct ChunkedFetcher {
    backend: Arc<dyn MetricsBackend>,
    view: ViewMapper,
    pool: WorkerPool,
    url_budget: usize,
    instrumentation: Arc<dyn Instrumentation>,
}

impl ChunkedFetcher {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        view: ViewMapper,
        pool: WorkerPool,
        url_budget: usize,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> Self {
        Self {
            backend,
            view,
            pool,
            url_budget,
            instrumentation,
        }
    }

    /// Fetch `paths` over `window`, with `additional_points` extra samples before its start
    ///
    /// A failed chunk leaves its paths out of the result and is reported in
    /// [`ExtendedFetch::warnings`]; only a protocol violation fails the whole fetch.
    ///
    /// `timeout` bounds the whole fetch: chunks still queued for the pool when it runs out are not
    /// sent, and are reported like any other failed chunk.
    pub async fn fetch(
        &self,
        paths: &[String],
        window: TimeWindow,
        additional_points: usize,
        timeout: Option<Duration>,
    ) -> Result<ExtendedFetch> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let unmapped = self.view.unmap(paths)?;
        let extended_start = window.extended_start(additional_points);
        let datapoints = window
            .points
            .checked_add(additional_points)
            .ok_or(Error::InvalidTimeRange {
                start: window.start,
                end: window.end,
            })?;

        let chunks = chunk_paths(&unmapped.backend_paths, self.url_budget);
        debug!(
            paths = paths.len(),
            chunks = chunks.len(),
            extended_start,
            datapoints,
            "fetching chunks"
        );
        let results = self
            .pool
            .run_all(chunks.into_iter().map(|chunk| {
                self.retrieve_chunk(chunk, extended_start, window.end, datapoints, deadline)
            }))
            .await;

        let mut data = SeriesData::new();
        let mut warnings = Vec::new();
        for result in results {
            match result {
                Ok(series) => data.extend(series),
                Err(e @ Error::ChunkFetch { .. }) => warnings.push(e),
                Err(e) => return Err(e),
            }
        }
        unmapped.restore(&mut data);

        Ok(ExtendedFetch {
            window,
            additional_points,
            extended_start,
            data,
            warnings,
        })
    }

    async fn retrieve_chunk(
        &self,
        paths: &[String],
        begin: i64,
        end: i64,
        datapoints: usize,
        deadline: Option<Instant>,
    ) -> Result<SeriesData> {
        // `x` and `x_dt` are both served by a single request for `x`
        let mut base_paths = Vec::with_capacity(paths.len());
        let mut seen = HashSet::with_capacity(paths.len());
        for path in paths {
            let base = path.strip_suffix(DERIVATIVE_SUFFIX).unwrap_or(path);
            if seen.insert(base) {
                base_paths.push(base.to_string());
            }
        }
        let n_paths = base_paths.len();
        debug!(
            paths = %base_paths.join(" "),
            n = n_paths,
            begin,
            end,
            datapoints,
            "retrieving chunk"
        );

        let timeout = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => Some(remaining),
                _ => return Err(chunk_error(n_paths, BackendError::DeadlineElapsed)),
            },
            None => None,
        };

        self.instrumentation
            .request_start(RequestKind::Retrieve, n_paths);
        let t0 = Instant::now();
        let request = RetrieveRequest {
            names: base_paths,
            begin,
            end,
            datapoints,
            timeout,
        };
        let retrieve = self.backend.retrieve(request);
        let result = match deadline {
            Some(deadline) => timeout_at(deadline, retrieve)
                .await
                .unwrap_or_else(|_| Err(BackendError::DeadlineElapsed)),
            None => retrieve.await,
        };
        let response = match result {
            Ok(response) => response,
            Err(source) => {
                self.instrumentation
                    .request_error(RequestKind::Retrieve, &source);
                return Err(chunk_error(n_paths, source));
            }
        };
        self.instrumentation
            .request_end(RequestKind::Retrieve, t0.elapsed());

        Ok(select_series(paths, response))
    }
}

fn chunk_error(paths: usize, source: BackendError) -> Error {
    if source.is_protocol() {
        Error::BackendProtocol { source }
    } else {
        warn!(paths, error = %source, "failed to fetch chunk, leaving its series empty");
        Error::ChunkFetch { paths, source }
    }
}

/// Keep the raw series of paths requested as-is and the derivative of paths requested with the
/// derivative suffix, dropping timestamps
fn select_series(requested: &[String], response: RetrieveResponse) -> SeriesData {
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let values = |series: Vec<DataPoint>| -> Vec<Option<f64>> {
        series.iter().map(DataPoint::value).collect()
    };

    let mut data = SeriesData::new();
    for (path, series) in response.raw {
        if requested.contains(path.as_str()) {
            data.insert(path, values(series));
        }
    }
    for (path, series) in response.derivative {
        let path = format!("{path}{DERIVATIVE_SUFFIX}");
        if requested.contains(path.as_str()) {
            data.insert(path, values(series));
        }
    }
    data
}
