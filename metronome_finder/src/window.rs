use crate::{Error, Result};

/// Seconds of data each requested point should cover, before capping at the maximum point count
pub const GRANULARITY_SECS: i64 = 10;

/// The `(start, end, step)` description of a fetched series
///
/// All timestamps are UNIX seconds. `step` is `(end - start) / points`, rounded down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub points: usize,
}

impl TimeWindow {
    /// Derive the window for a `[start, end)` request
    ///
    /// Asks for one point per [`GRANULARITY_SECS`], at least one and at most `max_points`.
    pub fn new(start: i64, end: i64, max_points: usize) -> Result<Self> {
        let span = match end.checked_sub(start) {
            Some(span) if span > 0 => span,
            _ => return Err(Error::InvalidTimeRange { start, end }),
        };
        let points = usize::try_from(span / GRANULARITY_SECS)
            .unwrap_or(usize::MAX)
            .min(max_points)
            .max(1);
        let step = span / points as i64;

        Ok(Self {
            start,
            end,
            step,
            points,
        })
    }

    /// Start of the window after prepending `additional_points` steps
    pub fn extended_start(&self, additional_points: usize) -> i64 {
        self.start
            .saturating_sub((additional_points as i64).saturating_mul(self.step))
    }
}
