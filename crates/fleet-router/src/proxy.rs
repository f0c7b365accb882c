//! Dispatch — forward one inbound request to a healthy target, with
//! bounded retries.
//!
//! Any HTTP status received from a target counts as success and is
//! relayed verbatim; only transport-level failures (timeout, refused
//! connection, DNS) increment the target's consecutive-failure count and
//! trigger a retry against the next healthy target. When every attempt fails the
//! router answers with its own synthetic 503 — the only response it ever
//! generates itself.

use std::time::Duration;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName};
use http::{Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use tracing::{debug, warn};

use fleet_core::{epoch_ms, FetchClient};

use crate::metrics::MetricsBook;
use crate::table::RouteTable;

/// Headers that must not travel across the proxy hop.
const HOP_HEADERS: [HeaderName; 10] = [
    header::HOST,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Retry parameters for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Forwards requests for a class to its next healthy target.
#[derive(Clone)]
pub struct Dispatcher {
    table: RouteTable,
    metrics: MetricsBook,
    client: FetchClient,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(table: RouteTable, metrics: MetricsBook, config: DispatchConfig) -> Self {
        Self {
            table,
            metrics,
            client: FetchClient::new(),
            config,
        }
    }

    /// Dispatch one request. Always produces a response: the target's
    /// (any status, relayed) or the synthetic 503 after exhausted
    /// retries.
    pub async fn dispatch(
        &self,
        class: &str,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let target = match self.table.next_healthy(class) {
                Ok(target) => target,
                Err(e) => {
                    warn!(%class, attempt, error = %e, "no target available");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                    continue;
                }
            };

            let uri = format!("{}{}", target.url, path_and_query);
            debug!(%class, %uri, attempt, method = %method, "routing request");

            let req = match build_upstream_request(&method, &uri, headers, body.clone()) {
                Ok(req) => req,
                Err(e) => {
                    warn!(%class, %uri, error = %e, "failed to build upstream request");
                    self.record_failure(class, &target.url, &target.name);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                    continue;
                }
            };

            match self.client.send(req, self.config.request_timeout).await {
                Ok(resp) => {
                    // Any received status is a completed dispatch; the
                    // caller sees it verbatim.
                    self.table.record_success(class, &target.url);
                    self.metrics.record(&target.url, &target.name, class, true);
                    self.metrics.record_self(true);
                    return relay(resp, self.config.request_timeout).await;
                }
                Err(e) => {
                    warn!(%class, url = %target.url, attempt, error = %e, "dispatch failed");
                    self.record_failure(class, &target.url, &target.name);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }

        self.metrics.record_self(false);
        unavailable(class, max_attempts)
    }

    fn record_failure(&self, class: &str, url: &str, name: &str) {
        self.table.record_failure(class, url);
        self.metrics.record(url, name, class, false);
    }
}

fn build_upstream_request(
    method: &Method,
    uri: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<http::Request<Full<Bytes>>, http::Error> {
    let parsed: Uri = uri.parse()?;

    let mut builder = http::Request::builder().method(method.clone()).uri(parsed.clone());
    for (name, value) in headers {
        if !HOP_HEADERS.contains(name) && name != header::CONTENT_LENGTH {
            builder = builder.header(name, value);
        }
    }
    // The upstream sees the target's own authority, not the router's.
    if let Some(authority) = parsed.authority() {
        builder = builder.header(header::HOST, authority.as_str());
    }
    builder.body(Full::new(body))
}

/// Turn an upstream response into the response we hand back, status and
/// headers preserved.
async fn relay(resp: http::Response<hyper::body::Incoming>, timeout: Duration) -> Response {
    let status = resp.status();
    let headers = resp.headers().clone();

    let bytes = match tokio::time::timeout(timeout, resp.into_body().collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) => {
            warn!(error = %e, "upstream body read failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "Upstream body read failed" })),
            )
                .into_response();
        }
        Err(_) => {
            warn!("upstream body read timed out");
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "Upstream body read timed out" })),
            )
                .into_response();
        }
    };

    let mut builder = http::Response::builder().status(status);
    for (name, value) in &headers {
        if !HOP_HEADERS.contains(name) && name != header::CONTENT_LENGTH {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn unavailable(class: &str, attempts: u32) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "Service unavailable",
            "message": format!("Failed to reach {class} service after {attempts} attempts"),
            "attempts": attempts,
            "timestamp": epoch_ms(),
        })),
    )
        .into_response()
}
