//! Implementation of command line option for fetching series
use std::{collections::BTreeMap, time::Duration};

use metronome_time::{SystemProvider, TimeProvider};
use serde_json::json;
use tracing::warn;

use super::common::MetronomeCommandConfig;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Common(#[from] super::common::Error),

    #[error(transparent)]
    Finder(#[from] metronome_finder::Error),

    #[error("error formatting the series as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    pub(crate) common: MetronomeCommandConfig,

    /// Length of the fetched range, ending at `--end`, e.g. `6h`
    #[clap(
        short = 'r',
        long = "range",
        default_value = "1h",
        value_parser = humantime::parse_duration
    )]
    range: Duration,

    /// End of the fetched range in UNIX seconds, defaults to now
    #[clap(short = 'e', long = "end", action)]
    end: Option<i64>,

    /// The metric paths to fetch, view paths and `_dt` derivatives included
    #[clap(required = true, num_args = 1..)]
    paths: Vec<String>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let finder = config.common.finder()?;

    let end = config
        .end
        .unwrap_or_else(|| SystemProvider::new().now().timestamp());
    let range = i64::try_from(config.range.as_secs()).unwrap_or(i64::MAX);
    let start = end.saturating_sub(range);

    let result = finder.fetch(&config.paths, start, end).await?;
    for warning in &result.warnings {
        warn!(%warning, "series missing from the result");
    }

    let series: BTreeMap<_, _> = result.series.into_iter().collect();
    let document = json!({
        "start": result.window.start,
        "end": result.window.end,
        "step": result.window.step,
        "series": series,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);

    Ok(())
}
