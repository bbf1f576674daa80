//! Prometheus metrics collection.

use ferry_git::Service;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Git route label, `other` for non-git paths
    pub route: String,
    /// Response status code
    pub status: u16,
}

/// Transfer process labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProcessLabels {
    /// `git-upload-pack` or `git-receive-pack`
    pub service: String,
    /// `ok`, `failed` or `spawn_error`
    pub outcome: String,
}

/// Global metrics state.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// Requests currently being handled.
    pub http_requests_in_flight: Gauge,
    /// Transfer processes by service and outcome.
    pub git_processes_total: Family<ProcessLabels, Counter>,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "ferry_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "ferry_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_requests_in_flight = Gauge::default();
        registry.register(
            "ferry_http_requests_in_flight",
            "Number of HTTP requests being handled",
            http_requests_in_flight.clone(),
        );

        let git_processes_total = Family::<ProcessLabels, Counter>::default();
        registry.register(
            "ferry_git_processes",
            "Transfer processes by service and outcome",
            git_processes_total.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            git_processes_total,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            route: route.to_string(),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a transfer process outcome.
    pub fn record_git_process(&self, service: Service, outcome: &str) {
        self.git_processes_total
            .get_or_create(&ProcessLabels {
                service: service.as_str().to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &registry) {
            tracing::error!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_state_creation() {
        let metrics = MetricsState::new();
        metrics.record_http_request("GET", "info_refs", 200, 0.001);
        metrics.record_git_process(Service::UploadPack, "ok");

        let encoded = metrics.encode();
        assert!(encoded.contains("ferry_http_requests"));
        assert!(encoded.contains(r#"route="info_refs""#));
        assert!(encoded.contains(r#"service="git-upload-pack",outcome="ok""#));
    }
}
