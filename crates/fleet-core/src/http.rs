//! Bounded HTTP client shared by all components.
//!
//! A thin wrapper over the pooled hyper client. Every call takes an
//! explicit timeout; transport failures (connect, DNS, timeout) come back
//! as `FetchError` values, never panics. Components fold these into their
//! own failure accounting.

use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Errors from a single HTTP call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// The HTTP status, when the server did answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Pooled HTTP/1 client with per-call timeouts.
#[derive(Clone)]
pub struct FetchClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl FetchClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Send a prepared request, bounded by `timeout`.
    ///
    /// Used directly by the router's proxy, which needs the raw response
    /// (status, headers, streaming body) to relay verbatim.
    pub async fn send(
        &self,
        req: Request<Full<Bytes>>,
        timeout: Duration,
    ) -> Result<http::Response<Incoming>, FetchError> {
        let fut = self.client.request(req);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(FetchError::Transport(e.to_string())),
            Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// GET a JSON document. Non-2xx statuses are errors.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let resp = self.send(req, timeout).await?;
        let status = resp.status();
        let body = collect_body(resp, timeout).await?;
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// POST a JSON body, decode a JSON response. Non-2xx statuses are
    /// errors (carrying the status for callers that branch on 404).
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let payload =
            serde_json::to_vec(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let resp = self.send(req, timeout).await?;
        let status = resp.status();
        let bytes = collect_body(resp, timeout).await?;
        if !status.is_success() {
            debug!(%url, status = status.as_u16(), "post rejected");
            return Err(FetchError::Status(status.as_u16()));
        }
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Probe an endpoint: any received HTTP status is a completed probe.
    ///
    /// Returns the status and round-trip latency. Only transport-level
    /// failures (timeout, refused connection, DNS) are errors.
    pub async fn probe(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(StatusCode, Duration), FetchError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let started = std::time::Instant::now();
        let resp = self.send(req, timeout).await?;
        let status = resp.status();
        // Drain the body so the connection returns to the pool.
        let _ = collect_body(resp, timeout).await;
        Ok((status, started.elapsed()))
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn collect_body(
    resp: http::Response<Incoming>,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    match tokio::time::timeout(timeout, resp.into_body().collect()).await {
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
        Ok(Err(e)) => Err(FetchError::Transport(e.to_string())),
        Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
    }
}
