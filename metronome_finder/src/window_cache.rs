//! Serving the follow-up fetch of `movingAverage()` from the previous fetch
//!
//! The query frontend first fetches every series of a `movingAverage()` call over the requested
//! range, then fetches each series again, one by one, over the range that ends exactly where the
//! first fetch began. Every fetch that reaches the backend asks for extra leading samples, which
//! are kept here so that the second round never has to hit the network.
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;

use crate::{SeriesData, window::TimeWindow};

#[derive(Debug)]
struct Entry {
    window: TimeWindow,
    additional_points: usize,
    extended_start: i64,
    data: SeriesData,
}

/// Remembers the single most recent extended fetch
///
/// Recording replaces the entry atomically, the last writer wins. A lookup racing with a record
/// may see either entry, which at worst turns a hit into a miss.
#[derive(Debug, Default)]
pub struct WindowCache {
    last: ArcSwapOption<Entry>,
}

impl WindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached fetch
    ///
    /// `data` holds `additional_points` samples before `window.start` followed by the samples of
    /// `window`.
    pub fn record(
        &self,
        window: TimeWindow,
        additional_points: usize,
        extended_start: i64,
        data: SeriesData,
    ) {
        self.last.store(Some(Arc::new(Entry {
            window,
            additional_points,
            extended_start,
            data,
        })));
    }

    /// Serve a single-path fetch of `[start, end)` from the cached leading samples
    ///
    /// Only a range that ends exactly at the cached window's start and lies within the extended
    /// range is served.
    pub fn try_serve(
        &self,
        path: &str,
        start: i64,
        end: i64,
    ) -> Option<(TimeWindow, Vec<Option<f64>>)> {
        let entry = self.last.load_full()?;
        if end != entry.window.start || start < entry.extended_start {
            return None;
        }
        let series = entry.data.get(path)?;

        let step = entry.window.step;
        let points = usize::try_from((end - start) / step).ok()?;
        if points == 0 {
            return None;
        }
        let from = entry.additional_points.checked_sub(points)?;
        let values = series.get(from..entry.additional_points)?.to_vec();

        debug!(
            path,
            start,
            end,
            extended_start = entry.extended_start,
            cached_start = entry.window.start,
            cached_end = entry.window.end,
            points,
            "serving movingAverage fetch from cached data"
        );
        Some((
            TimeWindow {
                start,
                end,
                step,
                points,
            },
            values,
        ))
    }
}
