//! The injected network probe and its HTTP implementation.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct ProbeResponse {
    pub status: u16,
    pub response_time: Duration,
}

#[derive(Debug, Error)]
pub(crate) enum ProbeError {
    #[error("probe timed out after {0:?}")]
    TimedOut(Duration),

    #[error("connection failed: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("probe target answered with server error status {0}")]
    ServerError(u16),
}

/// An async probe against a provider endpoint. The implementation must
/// enforce `timeout` itself by cancelling the underlying request; callers
/// additionally wrap the future in a timer so a misbehaving probe cannot
/// stall a batch.
#[async_trait]
pub(crate) trait NetworkProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError>;

    /// Lightweight reachability check used by the detailed diagnostics.
    /// Defaults to a full probe for implementations without a cheaper
    /// option.
    async fn connectivity(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
        self.probe(url, timeout).await
    }
}

pub(crate) struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub(crate) fn new() -> HttpProbe {
        HttpProbe {
            client: reqwest::Client::new(),
        }
    }

    fn classify(err: reqwest::Error, timeout: Duration) -> ProbeError {
        if err.is_timeout() {
            ProbeError::TimedOut(timeout)
        } else {
            ProbeError::Connection(err)
        }
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| Self::classify(err, timeout))?;

        let status = response.status().as_u16();

        if status >= 500 {
            return Err(ProbeError::ServerError(status));
        }

        Ok(ProbeResponse {
            status,
            response_time: started.elapsed(),
        })
    }

    async fn connectivity(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
        let started = Instant::now();

        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| Self::classify(err, timeout))?;

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            response_time: started.elapsed(),
        })
    }
}
