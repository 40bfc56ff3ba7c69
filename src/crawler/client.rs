//! Query API client: transport seam, retry, pacing and cancellation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::events::{CrawlEvent, EventSink, TracingEvents};
use super::feed::{self, Feed};
use super::CrawlError;
use crate::models::SearchParameters;
use crate::utils::{with_retry, HttpClient, RateGate, RetryConfig, Sleeper, TokioSleeper, DEFAULT_TIMEOUT};

/// Base URL for arXiv API
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Body of one successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// One attempt at one request. No retry, no pacing.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn get(&self, params: &SearchParameters) -> Result<RawResponse, CrawlError>;
}

/// Transport over HTTP with reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport against the public arXiv endpoint
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self::with_client(HttpClient::new()?, ARXIV_API_URL))
    }

    /// Create with a custom client and endpoint (for testing)
    pub fn with_client(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, params: &SearchParameters) -> Result<RawResponse, CrawlError> {
        let response = self
            .client
            .client()
            .get(&self.endpoint)
            .query(&params.query_pairs())
            .header("Accept", "application/atom+xml")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;

        Ok(RawResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

/// Client for the query API.
///
/// Every attempt first waits on the shared [`RateGate`], then runs under the
/// per-call timeout. Transient failures are retried with backoff up to the
/// configured bound. Cancelling the token aborts the gate wait, the request
/// and any backoff sleep.
#[derive(Debug, Clone)]
pub struct QueryClient {
    transport: Arc<dyn Transport>,
    gate: RateGate,
    retry: RetryConfig,
    timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    events: Arc<dyn EventSink>,
}

impl QueryClient {
    /// Create a client with default pacing, retry and timeout
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            gate: RateGate::default(),
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            events: Arc::new(TracingEvents),
        }
    }

    /// Share a rate gate with other clients
    pub fn with_gate(mut self, gate: RateGate) -> Self {
        self.gate = gate;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Abort everything when this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send retry notifications to this sink
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Whether the crawl has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send a request, retrying transient transport failures
    pub async fn send(&self, params: &SearchParameters) -> Result<RawResponse, CrawlError> {
        with_retry(
            &self.retry,
            self.sleeper.as_ref(),
            &self.cancel,
            |attempt, delay, error| self.notify_retry(params, attempt, delay, error),
            || self.attempt(params),
        )
        .await
    }

    /// Send a request and decode the feed, retrying undecodable bodies too
    pub async fn fetch_feed(&self, params: &SearchParameters) -> Result<Feed, CrawlError> {
        with_retry(
            &self.retry,
            self.sleeper.as_ref(),
            &self.cancel,
            |attempt, delay, error| self.notify_retry(params, attempt, delay, error),
            || async {
                let response = self.attempt(params).await?;
                feed::decode_feed(&response.body)
            },
        )
        .await
    }

    async fn attempt(&self, params: &SearchParameters) -> Result<RawResponse, CrawlError> {
        let request = async {
            self.gate.acquire().await;
            tracing::debug!(
                query = %params.search_query,
                start = params.start,
                max_results = params.max_results,
                order = %params.sort_order,
                "sending request"
            );
            match timeout(self.timeout, self.transport.get(params)).await {
                Ok(result) => result,
                Err(_) => Err(CrawlError::Timeout),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled),
            result = request => result,
        }
    }

    fn notify_retry(&self, params: &SearchParameters, attempt: u32, delay: Duration, error: &CrawlError) {
        self.events.emit(&CrawlEvent::Retrying {
            query: params.search_query.clone(),
            start: params.start,
            attempt,
            delay,
            error: error.to_string(),
        });
    }
}
