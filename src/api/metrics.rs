//! Pipeline-wide request metrics.
//!
//! Every request that reaches the router is counted on the way in and on the
//! way out, and its processing time is accumulated in microseconds. The
//! running totals are served at `GET /debug/vars`; the same observations go to
//! the global `OpenTelemetry` meter, which exports when a meter provider is
//! installed.

use axum::{
    Json,
    extract::{Extension, Request, State},
    middleware::Next,
    response::Response,
};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::time::Instant;
use utoipa::ToSchema;

pub struct HttpMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    received_counter: Counter<u64>,
    sent_counter: Counter<u64>,
    duration: Histogram<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
}

impl HttpMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = global::meter(env!("CARGO_PKG_NAME"));
        Self {
            requests_received: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            processing_time_us: AtomicU64::new(0),
            received_counter: meter
                .u64_counter("http.server.requests_received")
                .with_description("Requests that entered the pipeline")
                .build(),
            sent_counter: meter
                .u64_counter("http.server.responses_sent")
                .with_description("Responses that left the pipeline")
                .build(),
            duration: meter
                .f64_histogram("http.server.request.duration")
                .with_description("Time spent in the pipeline")
                .with_unit("s")
                .build(),
        }
    }

    fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        self.received_counter.add(1, &[]);
    }

    fn response_sent(&self, method: &str, status: u16, elapsed: std::time::Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);

        let attributes = [
            KeyValue::new("http.request.method", method.to_string()),
            KeyValue::new("http.response.status_code", i64::from(status)),
        ];
        self.sent_counter.add(1, &attributes);
        self.duration.record(elapsed.as_secs_f64(), &attributes);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Outermost middleware: counts the request before any gate can reject it.
pub async fn track(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    metrics.request_received();

    let response = next.run(request).await;

    metrics.response_sent(method.as_str(), response.status().as_u16(), start.elapsed());
    response
}

#[utoipa::path(
    get,
    path = "/debug/vars",
    responses(
        (status = 200, description = "Request totals since start.", body = MetricsSnapshot),
    ),
    tag = "metrics"
)]
pub async fn debug_vars(Extension(metrics): Extension<Arc<HttpMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}
