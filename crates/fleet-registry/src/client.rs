//! Registry HTTP client — discovery and lifecycle calls.
//!
//! Used by the router and monitor for target discovery, and by the agent
//! for the worker lifecycle. Every call is bounded by the client timeout;
//! failures come back as values for the caller to fold into its own
//! policy (keep last known state, fall back to static seeds, retry later).

use std::time::Duration;

use serde::Deserialize;

use fleet_core::{FetchClient, FetchError, Registration, ServiceFilter, ServiceRecord};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Typed client for the registry's HTTP surface.
#[derive(Clone)]
pub struct RegistryClient {
    base: String,
    client: FetchClient,
    timeout: Duration,
}

#[derive(Deserialize)]
struct RegisterResponse {
    service: ServiceRecord,
}

#[derive(Deserialize)]
struct ServicesResponse {
    services: Vec<ServiceRecord>,
}

impl RegistryClient {
    /// `base` is the registry origin, e.g. `http://127.0.0.1:3005`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: FetchClient::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn register(&self, reg: &Registration) -> Result<ServiceRecord, FetchError> {
        let url = format!("{}/api/registry/register", self.base);
        let resp: RegisterResponse = self.client.post_json(&url, reg, self.timeout).await?;
        Ok(resp.service)
    }

    pub async fn heartbeat(&self, service_id: &str) -> Result<(), FetchError> {
        let url = format!("{}/api/registry/heartbeat", self.base);
        let body = serde_json::json!({ "serviceId": service_id });
        let _: serde_json::Value = self.client.post_json(&url, &body, self.timeout).await?;
        Ok(())
    }

    pub async fn deregister(&self, service_id: &str) -> Result<(), FetchError> {
        let url = format!("{}/api/registry/deregister", self.base);
        let body = serde_json::json!({ "serviceId": service_id });
        let _: serde_json::Value = self.client.post_json(&url, &body, self.timeout).await?;
        Ok(())
    }

    /// All instances of one service class.
    pub async fn discover(
        &self,
        service_type: &str,
        healthy_only: bool,
    ) -> Result<Vec<ServiceRecord>, FetchError> {
        let mut url = format!("{}/api/registry/services/{service_type}", self.base);
        if healthy_only {
            url.push_str("?healthy=true");
        }
        let resp: ServicesResponse = self.client.get_json(&url, self.timeout).await?;
        Ok(resp.services)
    }

    pub async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceRecord>, FetchError> {
        let mut params = Vec::new();
        if let Some(ref t) = filter.service_type {
            params.push(format!("type={t}"));
        }
        if let Some(h) = filter.healthy {
            params.push(format!("healthy={h}"));
        }
        let mut url = format!("{}/api/registry/services", self.base);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        let resp: ServicesResponse = self.client.get_json(&url, self.timeout).await?;
        Ok(resp.services)
    }

    pub async fn get_service(&self, service_id: &str) -> Result<ServiceRecord, FetchError> {
        let url = format!("{}/api/registry/service/{service_id}", self.base);
        self.client.get_json(&url, self.timeout).await
    }
}
