//! CLI config for the Metronome backend and the finder on top of it
use std::{num::NonZeroUsize, time::Duration};

use url::Url;

/// What to do when the metric catalog cannot be refreshed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RefreshErrorPolicy {
    /// Keep serving the previously loaded catalog.
    #[default]
    ServeStale,

    /// Fail the request.
    Fail,
}

/// CLI config for connecting to Metronome and tuning the finder
#[derive(Debug, Clone, clap::Parser)]
pub struct MetronomeConfig {
    /// The URL of the Metronome endpoint, e.g. `http://metronome:8000/`
    #[clap(long = "metronome-url", env = "METRONOME_URL", action)]
    pub url: Url,

    /// How long the list of metric paths is cached before it is fetched again.
    #[clap(
        long = "metrics-cache-expiry",
        env = "METRONOME_METRICS_CACHE_EXPIRY",
        default_value = "300s",
        value_parser = humantime::parse_duration
    )]
    pub metrics_cache_expiry: Duration,

    /// Maximum number of points requested per series.
    #[clap(
        long = "max-points",
        env = "METRONOME_MAX_POINTS",
        default_value = "720",
        action
    )]
    pub max_points: NonZeroUsize,

    /// Number of points fetched before the requested range, kept to answer `movingAverage()`
    /// follow-up fetches without another request.
    #[clap(
        long = "additional-points",
        env = "METRONOME_ADDITIONAL_POINTS",
        default_value = "100",
        action
    )]
    pub additional_points: usize,

    /// Maximum length in bytes of the comma-separated path list sent in one request.
    ///
    /// Metronome rejects URLs longer than 2048 bytes; the default leaves room for the other
    /// parameters and the request headers.
    #[clap(
        long = "url-budget",
        env = "METRONOME_URL_BUDGET",
        default_value = "1748",
        action
    )]
    pub url_budget: NonZeroUsize,

    /// Maximum number of concurrent requests to Metronome.
    #[clap(
        long = "concurrency",
        env = "METRONOME_CONCURRENCY",
        default_value = "4",
        action
    )]
    pub concurrency: NonZeroUsize,

    /// Timeout for establishing a connection to Metronome.
    #[clap(
        long = "connect-timeout",
        env = "METRONOME_CONNECT_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub connect_timeout: Duration,

    /// Timeout for each request to Metronome, e.g. `30s`.
    #[clap(
        long = "request-timeout",
        env = "METRONOME_REQUEST_TIMEOUT",
        value_parser = humantime::parse_duration
    )]
    pub request_timeout: Option<Duration>,

    /// What to do when the list of metric paths cannot be refreshed.
    #[clap(
        long = "on-refresh-error",
        env = "METRONOME_ON_REFRESH_ERROR",
        default_value_t = RefreshErrorPolicy::default(),
        value_enum,
        action
    )]
    pub on_refresh_error: RefreshErrorPolicy,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        metronome: MetronomeConfig,
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["metronome", "--metronome-url", "http://localhost:8000"])
            .unwrap();
        let config = cli.metronome;

        assert_eq!(config.url.as_str(), "http://localhost:8000/");
        assert_eq!(config.metrics_cache_expiry, Duration::from_secs(300));
        assert_eq!(config.max_points.get(), 720);
        assert_eq!(config.additional_points, 100);
        assert_eq!(config.url_budget.get(), 2048 - 300);
        assert_eq!(config.concurrency.get(), 4);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.on_refresh_error, RefreshErrorPolicy::ServeStale);
    }

    #[test]
    fn overrides() {
        let cli = Cli::try_parse_from([
            "metronome",
            "--metronome-url",
            "http://metronome:8000/",
            "--metrics-cache-expiry",
            "1m",
            "--max-points",
            "2000",
            "--connect-timeout",
            "1s",
            "--request-timeout",
            "2s 500ms",
            "--on-refresh-error",
            "fail",
        ])
        .unwrap();
        let config = cli.metronome;

        assert_eq!(config.metrics_cache_expiry, Duration::from_secs(60));
        assert_eq!(config.max_points.get(), 2000);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.on_refresh_error, RefreshErrorPolicy::Fail);
    }

    #[test]
    fn invalid_values() {
        for args in [
            vec!["metronome", "--metronome-url", "not a url"],
            vec!["metronome", "--metronome-url", "http://m/", "--concurrency", "0"],
            vec!["metronome", "--metronome-url", "http://m/", "--metrics-cache-expiry", "soon"],
        ] {
            assert!(Cli::try_parse_from(&args).is_err(), "{args:?}");
        }
    }
}
