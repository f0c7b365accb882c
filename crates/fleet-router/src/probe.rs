//! Active health probing of route targets.
//!
//! Dispatch only learns about targets that receive traffic; this loop
//! probes every target's `/health` on its own timer so an unhealthy
//! target can recover while idle. All probes in a pass run concurrently.

use std::time::Duration;

use tracing::{debug, info, warn};

use fleet_core::FetchClient;

use crate::table::RouteTable;

/// Periodic prober for every target in the route table.
pub struct HealthProber {
    table: RouteTable,
    client: FetchClient,
    interval: Duration,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(table: RouteTable, interval: Duration, timeout: Duration) -> Self {
        Self {
            table,
            client: FetchClient::new(),
            interval,
            timeout,
        }
    }

    /// Probe every target once, concurrently.
    pub async fn check_all(&self) {
        let targets = self.table.all_targets();
        if targets.is_empty() {
            return;
        }

        let checks = targets.into_iter().map(|(class, url)| {
            let client = self.client.clone();
            let timeout = self.timeout;
            async move {
                let result = client.probe(&format!("{url}/health"), timeout).await;
                let ok = matches!(result, Ok((status, _)) if status.is_success());
                (class, url, ok)
            }
        });

        for (class, url, ok) in futures::future::join_all(checks).await {
            if ok {
                if self.table.record_success(&class, &url) {
                    info!(%class, %url, "probe recovered target");
                } else {
                    debug!(%class, %url, "probe ok");
                }
            } else if self.table.record_failure(&class, &url) {
                warn!(%class, %url, "probe marked target unhealthy");
            } else {
                debug!(%class, %url, "probe failed");
            }
        }
    }

    /// Run the probe loop until shutdown. The first pass is immediate.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "health probe loop started"
        );
        self.check_all().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.check_all().await;
                }
                _ = shutdown.changed() => {
                    info!("health probe loop shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;

    async fn spawn_worker(healthy: bool) -> String {
        let app = if healthy {
            Router::new().route("/health", get(|| async { "OK" }))
        } else {
            Router::new().route(
                "/health",
                get(|| async { (http::StatusCode::INTERNAL_SERVER_ERROR, "down") }),
            )
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn probe_pass_recovers_idle_target() {
        let url = spawn_worker(true).await;
        let table = RouteTable::new(3, false);
        table.add_class("compute", &[url.clone()]);

        // Drive it unhealthy first.
        for _ in 0..3 {
            table.record_failure("compute", &url);
        }
        assert_eq!(table.counts("compute"), (0, 1));

        let prober = HealthProber::new(
            table.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        prober.check_all().await;

        assert_eq!(table.counts("compute"), (1, 0));
    }

    #[tokio::test]
    async fn probe_counts_failures_up_to_threshold() {
        let table = RouteTable::new(3, false);
        table.add_class("compute", &["http://127.0.0.1:1".to_string()]);

        let prober = HealthProber::new(
            table.clone(),
            Duration::from_secs(10),
            Duration::from_millis(200),
        );

        prober.check_all().await;
        prober.check_all().await;
        assert_eq!(table.counts("compute"), (1, 0));

        prober.check_all().await;
        assert_eq!(table.counts("compute"), (0, 1));
    }

    #[tokio::test]
    async fn non_success_health_status_counts_as_failure() {
        let url = spawn_worker(false).await;
        let table = RouteTable::new(3, false);
        table.add_class("compute", &[url.clone()]);

        let prober = HealthProber::new(
            table.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        for _ in 0..3 {
            prober.check_all().await;
        }
        assert_eq!(table.counts("compute"), (0, 1));
    }
}
