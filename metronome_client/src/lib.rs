//! HTTP client for the Metronome metrics service
//!
//! Metronome exposes a single endpoint that is driven by a `do` query parameter and always answers
//! with JSONP, see [`jsonp`] for how those bodies are decoded.
pub mod jsonp;

use std::{collections::HashMap, time::Duration, time::Instant};

use reqwest::{IntoUrl, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::jsonp::{CALLBACK, JsonpError, load_jsonp};

/// Primary error type for the [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("failed to read the API response text: {0}")]
    Text(#[source] reqwest::Error),

    #[error("server responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode `{operation}` response: {source}")]
    Jsonp {
        operation: &'static str,
        #[source]
        source: JsonpError,
    },
}

impl Error {
    fn request_send(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::RequestSend {
            method,
            url: url.into(),
            source,
        }
    }

    /// Whether the backend answered, but with a body that breaks the JSONP contract
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Jsonp { .. })
    }

    /// Whether the request ran into its deadline
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::RequestSend { source, .. } | Self::Text(source) => source.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The Metronome client
///
/// Cheap to clone, the underlying [`reqwest::Client`] shares its connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    /// The URL of the Metronome endpoint, e.g., `http://metronome:8000/`
    base_url: Url,
    /// A [`reqwest::Client`] for handling HTTP requests
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new [`Client`]
    pub fn new<U: IntoUrl>(base_url: U) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            http_client: reqwest::Client::new(),
        })
    }

    /// Use a pre-configured [`reqwest::Client`], e.g., one with a connect timeout
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Make a `do=get-metrics` request, listing every metric path known to the backend
    pub async fn get_metrics(&self) -> Result<MetricsList> {
        let params = GetMetricsParams {
            action: "get-metrics",
            callback: CALLBACK,
        };
        let resp = self
            .http_client
            .get(self.base_url.clone())
            .query(&params)
            .send()
            .await
            .map_err(|src| Error::request_send(Method::GET, self.base_url.as_str(), src))?;
        let body = checked_text(resp).await?;

        load_jsonp(&body).map_err(|source| Error::Jsonp {
            operation: "get-metrics",
            source,
        })
    }

    /// Compose a `do=retrieve` request for the given metric paths
    ///
    /// # Example
    /// ```no_run
    /// # use metronome_client::Client;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    /// let client = Client::new("http://localhost:8000")?;
    /// let resp = client
    ///     .retrieve(["pdns.ns1.auth.queries", "pdns.ns2.auth.queries"])
    ///     .begin(1_500_000_000)
    ///     .end(1_500_003_600)
    ///     .datapoints(360)
    ///     .send()
    ///     .await?;
    /// println!("{:?}", resp.raw.keys());
    /// # Ok(())
    /// # }
    /// ```
    pub fn retrieve<S: Into<String>>(
        &self,
        names: impl IntoIterator<Item = S>,
    ) -> RetrieveRequestBuilder<'_> {
        RetrieveRequestBuilder {
            client: self,
            names: names.into_iter().map(Into::into).collect(),
            begin: None,
            end: None,
            datapoints: None,
            timeout: None,
        }
    }
}

/// Read the body of a response, turning anything other than `200 OK` into [`Error::ApiError`]
async fn checked_text(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await.map_err(Error::Text)?;
    match status {
        StatusCode::OK => Ok(text),
        code => Err(Error::ApiError {
            code,
            message: text,
        }),
    }
}

/// URL parameters of a `do=get-metrics` request
#[derive(Debug, Serialize)]
struct GetMetricsParams<'a> {
    #[serde(rename = "do")]
    action: &'a str,
    callback: &'a str,
}

/// The body of a `do=get-metrics` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsList {
    pub metrics: Vec<String>,
}

/// A single `[timestamp, value]` sample as returned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint(pub f64, pub Option<f64>);

impl DataPoint {
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    pub fn value(&self) -> Option<f64> {
        self.1
    }
}

/// The body of a `do=retrieve` response
///
/// The backend always answers with both the raw series and their time derivative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub raw: HashMap<String, Vec<DataPoint>>,
    pub derivative: HashMap<String, Vec<DataPoint>>,
}

/// Builder type for composing a `do=retrieve` request
///
/// Produced by [`Client::retrieve`]
#[derive(Debug)]
pub struct RetrieveRequestBuilder<'c> {
    client: &'c Client,
    names: Vec<String>,
    begin: Option<i64>,
    end: Option<i64>,
    datapoints: Option<usize>,
    timeout: Option<Duration>,
}

impl RetrieveRequestBuilder<'_> {
    /// Set the start of the requested range, in UNIX seconds
    pub fn begin(mut self, begin: i64) -> Self {
        self.begin = Some(begin);
        self
    }

    /// Set the end of the requested range, in UNIX seconds
    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Set the number of samples the backend should aggregate each series into
    pub fn datapoints(mut self, datapoints: usize) -> Self {
        self.datapoints = Some(datapoints);
        self
    }

    /// Abort the request if it has not completed within `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the request to the server
    pub async fn send(self) -> Result<RetrieveResponse> {
        let params = RetrieveParams::from(&self);
        let mut req = self
            .client
            .http_client
            .get(self.client.base_url.clone())
            .query(&params);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        debug!(
            paths = self.names.len(),
            begin = ?self.begin,
            end = ?self.end,
            datapoints = ?self.datapoints,
            "sending retrieve request"
        );
        let t0 = Instant::now();
        let resp = req.send().await.map_err(|src| {
            Error::request_send(Method::GET, self.client.base_url.as_str(), src)
        })?;
        let body = checked_text(resp).await?;

        let elapsed = t0.elapsed().as_secs_f64();
        let size_kb = body.len() as f64 / 1024.0;
        debug!(
            paths = self.names.len(),
            elapsed_secs = elapsed,
            size_kb,
            kb_per_sec = size_kb / elapsed.max(f64::EPSILON),
            "retrieve request complete"
        );

        load_jsonp(&body).map_err(|source| Error::Jsonp {
            operation: "retrieve",
            source,
        })
    }
}

/// URL parameters of a `do=retrieve` request
#[derive(Debug, Serialize)]
struct RetrieveParams<'a> {
    #[serde(rename = "do")]
    action: &'a str,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    begin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datapoints: Option<usize>,
    callback: &'a str,
}

impl<'a> From<&'a RetrieveRequestBuilder<'a>> for RetrieveParams<'a> {
    fn from(builder: &'a RetrieveRequestBuilder<'a>) -> Self {
        Self {
            action: "retrieve",
            name: builder.names.join(","),
            begin: builder.begin,
            end: builder.end,
            datapoints: builder.datapoints,
            callback: CALLBACK,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    use crate::{Client, DataPoint, Error};

    #[test_log::test(tokio::test)]
    async fn get_metrics() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("do".into(), "get-metrics".into()),
                Matcher::UrlEncoded("callback".into(), "_".into()),
            ]))
            .with_status(200)
            .with_body(r#"_({"metrics": ["pdns.x.auth.queries", "other.metric"]});"#)
            .create_async()
            .await;

        let client = Client::new(mock_server.url()).expect("create client");
        let list = client.get_metrics().await.expect("list metrics");

        assert_eq!(list.metrics, vec!["pdns.x.auth.queries", "other.metric"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_metrics_non_200() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = Client::new(mock_server.url()).unwrap();
        let err = client.get_metrics().await.unwrap_err();

        match err {
            Error::ApiError { code, message } => {
                assert_eq!(code.as_u16(), 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_metrics_invalid_jsonp() {
        let mut mock_server = Server::new_async().await;
        let _mock = mock_server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"_({"metrics": [});"#)
            .create_async()
            .await;

        let client = Client::new(mock_server.url()).unwrap();
        let err = client.get_metrics().await.unwrap_err();

        assert!(err.is_protocol());
        let Error::Jsonp { operation, source } = err else {
            panic!("expected a JSONP error");
        };
        assert_eq!(operation, "get-metrics");
        assert_eq!(source.body(), r#"_({"metrics": [});"#);
    }

    #[test_log::test(tokio::test)]
    async fn retrieve() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("do".into(), "retrieve".into()),
                Matcher::UrlEncoded("name".into(), "a.b,c.d".into()),
                Matcher::UrlEncoded("begin".into(), "1000".into()),
                Matcher::UrlEncoded("end".into(), "2000".into()),
                Matcher::UrlEncoded("datapoints".into(), "100".into()),
                Matcher::UrlEncoded("callback".into(), "_".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"_({ raw: {"a.b": [[1000, 1.0], [1010, null]], "c.d": []}, derivative: {"a.b": [[1000, 0.5]]}});"#,
            )
            .create_async()
            .await;

        let client = Client::new(mock_server.url()).unwrap();
        let resp = client
            .retrieve(["a.b", "c.d"])
            .begin(1_000)
            .end(2_000)
            .datapoints(100)
            .send()
            .await
            .expect("send retrieve request");

        assert_eq!(
            resp.raw["a.b"],
            vec![DataPoint(1000.0, Some(1.0)), DataPoint(1010.0, None)]
        );
        assert!(resp.raw["c.d"].is_empty());
        assert_eq!(resp.derivative["a.b"][0].value(), Some(0.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retrieve_missing_section_is_protocol_error() {
        let mut mock_server = Server::new_async().await;
        let _mock = mock_server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"_({ raw: {}});"#)
            .create_async()
            .await;

        let client = Client::new(mock_server.url()).unwrap();
        let err = client.retrieve(["a.b"]).send().await.unwrap_err();
        assert!(err.is_protocol());
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn retrieve_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                open.push(socket);
            }
        });

        let client = Client::new(format!("http://{addr}/")).unwrap();
        let err = client
            .retrieve(["a.b"])
            .timeout(Duration::from_millis(100))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(matches!(err, Error::RequestSend { .. }), "{err}");

        silent.abort();
    }

    #[test]
    fn invalid_base_url() {
        assert!(matches!(Client::new("not a url"), Err(Error::BaseUrl(_))));
    }
}
