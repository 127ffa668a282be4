use std::sync::Arc;

use metronome_clap_blocks::{
    logging::LoggingConfig,
    metronome::{MetronomeConfig, RefreshErrorPolicy},
};
use metronome_client::Client;
use metronome_finder::{FinderConfig, MetronomeFinder, OnRefreshError};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to build the HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error(transparent)]
    Client(#[from] metronome_client::Error),
}

/// Options shared by every command talking to Metronome
#[derive(Debug, clap::Parser)]
pub(crate) struct MetronomeCommandConfig {
    #[clap(flatten)]
    pub(crate) metronome: MetronomeConfig,

    #[clap(flatten)]
    pub(crate) logging: LoggingConfig,
}

impl MetronomeCommandConfig {
    pub(crate) fn finder(&self) -> Result<MetronomeFinder, Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(self.metronome.connect_timeout)
            .build()
            .map_err(Error::HttpClient)?;
        let client = Client::new(self.metronome.url.clone())?.with_http_client(http_client);
        Ok(MetronomeFinder::new(
            Arc::new(client),
            finder_config(&self.metronome),
        ))
    }
}

fn finder_config(config: &MetronomeConfig) -> FinderConfig {
    FinderConfig {
        metrics_cache_expiry: config.metrics_cache_expiry,
        max_points: config.max_points.get(),
        additional_points: config.additional_points,
        url_budget: config.url_budget.get(),
        concurrency: config.concurrency.get(),
        request_timeout: config.request_timeout,
        on_refresh_error: match config.on_refresh_error {
            RefreshErrorPolicy::ServeStale => OnRefreshError::ServeStale,
            RefreshErrorPolicy::Fail => OnRefreshError::Fail,
        },
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn default_finder_config() {
        let config = MetronomeCommandConfig::parse_from([
            "metronome",
            "--metronome-url",
            "http://localhost:8000/",
        ]);
        assert_eq!(finder_config(&config.metronome), FinderConfig::default());
    }

    #[test]
    fn tuned_finder_config() {
        let config = MetronomeCommandConfig::parse_from([
            "metronome",
            "--metronome-url",
            "http://localhost:8000/",
            "--concurrency",
            "16",
            "--url-budget",
            "512",
            "--on-refresh-error",
            "fail",
        ]);
        let finder = finder_config(&config.metronome);
        assert_eq!(finder.concurrency, 16);
        assert_eq!(finder.url_budget, 512);
        assert_eq!(finder.on_refresh_error, OnRefreshError::Fail);
    }

    #[tokio::test]
    async fn finder_uses_configured_client() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/")
            .match_query(mockito::Matcher::UrlEncoded(
                "do".into(),
                "get-metrics".into(),
            ))
            .with_status(200)
            .with_body(r#"_({"metrics": ["a.b"]});"#)
            .expect(1)
            .create_async()
            .await;

        let url = server.url();
        let config = MetronomeCommandConfig::parse_from([
            "metronome",
            "--metronome-url",
            url.as_str(),
            "--connect-timeout",
            "1s",
        ]);
        let finder = config.finder().unwrap();
        let paths: Vec<_> = finder
            .find("a.*")
            .await
            .unwrap()
            .map(|node| node.path().to_owned())
            .collect();
        assert_eq!(paths, ["a.b", "a.b_dt"]);

        list.assert_async().await;
    }
}
