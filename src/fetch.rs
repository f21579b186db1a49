use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{EngineConfig, FetchOutcome, Result, Target};

/// The fetch capability: one bounded GET against a target, classified into a
/// `FetchOutcome`. The engine depends only on this trait, so a real network
/// client and a deterministic fake are interchangeable.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        target: &Target,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> FetchOutcome;
}

/// The `HttpFetcher` struct performs real HTTP GETs with a shared `reqwest`
/// client. Redirects are followed by the client's default policy.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher from the engine configuration.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .connect_timeout(config.request_timeout())
            .build()?;

        Ok(Self { client })
    }

    /// One full attempt: send the request and, on a success status, read the
    /// body to completion. The caller bounds this with the attempt deadline.
    async fn attempt(&self, url: &str) -> FetchOutcome {
        let response = match self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_error(e),
        };

        let status = response.status();
        if !status.is_success() {
            debug!("Non-success status {} from {}", status, url);
            return FetchOutcome::HttpError {
                status: status.as_u16(),
            };
        }

        // A failure while streaming the body degrades to a network error.
        match response.text().await {
            Ok(body) => FetchOutcome::Success {
                status: status.as_u16(),
                body,
            },
            Err(e) => FetchOutcome::NetworkError {
                cause: format!("connection closed mid-stream: {e}"),
            },
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        target: &Target,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        if !target.url.starts_with("http://") && !target.url.starts_with("https://") {
            return FetchOutcome::Invalid {
                reason: format!("unsupported url scheme in {}", target.url),
            };
        }

        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        // Cancellation wins over the deadline; dropping the request future
        // abandons the in-flight connection.
        tokio::select! {
            _ = cancel.cancelled() => FetchOutcome::Cancelled,
            outcome = tokio::time::timeout(deadline, self.attempt(&target.url)) => {
                outcome.unwrap_or(FetchOutcome::Timeout)
            }
        }
    }
}

/// Folds a request error into an outcome, keeping the transport-level cause
/// distinguishable in diagnostics.
fn classify_error(e: reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        return FetchOutcome::Timeout;
    }

    let cause = if e.is_connect() {
        format!("connection failed: {e}")
    } else if e.is_body() || e.is_decode() {
        format!("connection closed by remote: {e}")
    } else {
        format!("request error: {e}")
    };

    FetchOutcome::NetworkError { cause }
}
