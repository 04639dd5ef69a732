//! Request metrics in Prometheus text format
//!
//! Counts every request and response (by status) plus processing time.
//! Exposed on `GET /debug/vars` when a recorder is installed.

use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::AppState;

/// How often histogram buckets are drained
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Install the process-wide Prometheus recorder
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Start the periodic recorder upkeep task
pub fn spawn_upkeep(handle: PrometheusHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        loop {
            interval.tick().await;
            handle.run_upkeep();
        }
    })
}

/// Record request count, response status and processing time
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    metrics::counter!("http_requests_received_total").increment(1);

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16().to_string();
    metrics::counter!("http_responses_sent_total", "status" => status).increment(1);
    metrics::counter!("http_processing_time_microseconds_total")
        .increment(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
    metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

    response
}

/// GET /debug/vars
pub async fn render_metrics(State(state): State<AppState>) -> Result<String> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(AppError::NotFound)
}
