//! Prometheus metrics for the gateway
//!
//! One `GatewayMetrics` instance is built at startup and handed to the
//! instrumentation middleware and every recording call site through
//! `AppContext`. All collectors are atomics internally; the summary keeps a
//! short per-series window behind a mutex.

mod summary;

pub use summary::SummaryVec;

use anyhow::Result;
use parking_lot::Mutex;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Route label used when no template, path or URL can be resolved
pub const UNKNOWN_ROUTE: &str = "unknown";

/// Distinct raw-path labels kept for requests that matched no route.
/// Past this, unmatched requests share `UNKNOWN_ROUTE`.
pub const MAX_UNMATCHED_ROUTE_LABELS: usize = 100;

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Outcome label for `auth_operations_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failure,
}

impl AuthOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::Failure => "failure",
        }
    }

    pub fn from_success(success: bool) -> Self {
        if success {
            AuthOutcome::Success
        } else {
            AuthOutcome::Failure
        }
    }
}

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    started_at: Instant,
    unmatched_routes: Arc<Mutex<HashSet<String>>>,

    // -- HTTP --
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_request_duration_summary: Arc<SummaryVec>,
    pub http_requests_in_flight: IntGauge,
    pub http_errors_total: IntCounterVec,

    // -- Operations --
    pub auth_operations_total: IntCounterVec,
    pub business_operations_total: IntCounterVec,

    // -- Backends & process --
    pub backend_up: IntGaugeVec,
    pub uptime_seconds: Gauge,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "route", "status_code"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "route", "status_code"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let http_request_duration_summary = Arc::new(SummaryVec::new(
            "http_request_duration_summary_seconds",
            "HTTP request duration quantiles in seconds",
            &["method", "route"],
        )?);
        registry.register(Box::new(SharedCollector(
            http_request_duration_summary.clone(),
        )))?;

        let http_requests_in_flight = IntGauge::new(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
        )?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;

        let http_errors_total = IntCounterVec::new(
            Opts::new("http_errors_total", "Total number of failed HTTP requests"),
            &["type", "method", "route"],
        )?;
        registry.register(Box::new(http_errors_total.clone()))?;

        let auth_operations_total = IntCounterVec::new(
            Opts::new(
                "auth_operations_total",
                "Authentication operations by outcome",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(auth_operations_total.clone()))?;

        let business_operations_total = IntCounterVec::new(
            Opts::new(
                "business_operations_total",
                "Operations forwarded to backend services",
            ),
            &["operation", "service"],
        )?;
        registry.register(Box::new(business_operations_total.clone()))?;

        let backend_up = IntGaugeVec::new(
            Opts::new(
                "backend_up",
                "Backend health as seen by the last readiness probe (1=up, 0=down)",
            ),
            &["service"],
        )?;
        registry.register(Box::new(backend_up.clone()))?;

        let uptime_seconds = Gauge::new(
            "gateway_uptime_seconds",
            "Seconds since the gateway process started",
        )?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        // Standard process metrics (CPU, RSS, open FDs)
        #[cfg(target_os = "linux")]
        {
            let pc = prometheus::process_collector::ProcessCollector::for_self();
            registry.register(Box::new(pc))?;
        }

        Ok(Self {
            registry,
            started_at: Instant::now(),
            unmatched_routes: Arc::new(Mutex::new(HashSet::new())),
            http_requests_total,
            http_request_duration_seconds,
            http_request_duration_summary,
            http_requests_in_flight,
            http_errors_total,
            auth_operations_total,
            business_operations_total,
            backend_up,
            uptime_seconds,
        })
    }

    /// Terminal record for one request
    pub fn record_request(&self, method: &str, route: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        let secs = duration.as_secs_f64();

        self.http_requests_total
            .with_label_values(&[method, route, &status])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route, &status])
            .observe(secs);
        self.http_request_duration_summary
            .observe(&[method, route], secs);
    }

    pub fn record_error(&self, kind: &str, method: &str, route: &str) {
        self.http_errors_total
            .with_label_values(&[kind, method, route])
            .inc();
    }

    pub fn record_auth_operation(&self, operation: &str, outcome: AuthOutcome) {
        self.auth_operations_total
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
    }

    pub fn record_business_operation(&self, operation: &str, service: &str) {
        self.business_operations_total
            .with_label_values(&[operation, service])
            .inc();
    }

    pub fn set_backend_up(&self, service: &str, up: bool) {
        self.backend_up
            .with_label_values(&[service])
            .set(i64::from(up));
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn gather(&self) -> Result<String> {
        self.uptime_seconds
            .set(self.started_at.elapsed().as_secs_f64());

        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// Zero all request and operation metrics.
    ///
    /// The in-flight gauge tracks live requests and is left alone.
    pub fn reset(&self) {
        self.http_requests_total.reset();
        self.http_request_duration_seconds.reset();
        self.http_request_duration_summary.reset();
        self.http_errors_total.reset();
        self.auth_operations_total.reset();
        self.business_operations_total.reset();
        self.backend_up.reset();
        self.unmatched_routes.lock().clear();
    }

    /// Route label for a request, bounding the labels minted from raw paths.
    ///
    /// Matched templates are a fixed set. Raw paths come from clients, so only
    /// the first `MAX_UNMATCHED_ROUTE_LABELS` distinct ones get their own series.
    pub fn resolve_route(&self, matched: Option<&str>, path: &str, url: &str) -> String {
        if let Some(template) = matched.filter(|t| !t.trim().is_empty()) {
            return template.trim().to_string();
        }

        let label = route_label(None, path, url);
        if label == UNKNOWN_ROUTE {
            return label;
        }

        let mut seen = self.unmatched_routes.lock();
        if seen.contains(&label) || seen.len() < MAX_UNMATCHED_ROUTE_LABELS {
            seen.insert(label.clone());
            label
        } else {
            UNKNOWN_ROUTE.to_string()
        }
    }
}

/// Lets the registry own a handle to a collector the gateway also records into
struct SharedCollector(Arc<SummaryVec>);

impl prometheus::core::Collector for SharedCollector {
    fn desc(&self) -> Vec<&prometheus::core::Desc> {
        self.0.desc()
    }

    fn collect(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.0.collect()
    }
}

/// Resolve the route label: matched template, then raw path, then full URL
pub fn route_label(matched: Option<&str>, path: &str, url: &str) -> String {
    [matched.unwrap_or(""), path, url]
        .into_iter()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(UNKNOWN_ROUTE)
        .to_string()
}
