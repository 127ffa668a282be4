//! The seam between the finder and the metrics service
use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use metronome_client::{Client, RetrieveResponse};

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single backend call
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend answered, but the body broke the JSONP contract
    #[error("{0}")]
    Protocol(#[source] DynError),

    /// The request could not be completed: connection failure, timeout or non-200 status
    #[error("{0}")]
    Request(#[source] DynError),

    /// The caller's deadline passed before the backend answered
    #[error("deadline elapsed")]
    DeadlineElapsed,
}

impl BackendError {
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

impl From<metronome_client::Error> for BackendError {
    fn from(e: metronome_client::Error) -> Self {
        if e.is_protocol() {
            Self::Protocol(Box::new(e))
        } else {
            Self::Request(Box::new(e))
        }
    }
}

/// Parameters of one `retrieve` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveRequest {
    /// Base metric paths, without any derivative suffix
    pub names: Vec<String>,
    pub begin: i64,
    pub end: i64,
    pub datapoints: usize,
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait MetricsBackend: Debug + Send + Sync + 'static {
    /// List every metric path the backend knows about
    async fn list_metrics(&self) -> Result<Vec<String>, BackendError>;

    /// Retrieve raw and derivative series for the requested paths
    async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveResponse, BackendError>;
}

#[async_trait]
impl MetricsBackend for Client {
    async fn list_metrics(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.get_metrics().await?.metrics)
    }

    async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveResponse, BackendError> {
        let RetrieveRequest {
            names,
            begin,
            end,
            datapoints,
            timeout,
        } = request;
        let mut builder = Client::retrieve(self, names)
            .begin(begin)
            .end(end)
            .datapoints(datapoints);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.send().await?)
    }
}
