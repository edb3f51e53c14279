//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): answered requests by site, status
//! - `proxy_request_duration_seconds` (histogram): latency by site
//! - `proxy_rejections_total` (counter): admission rejections by reason
//! - `proxy_abandoned_total` (counter): jobs abandoned by reason
//! - `proxy_jobs_in_flight` (gauge): jobs currently running on a worker
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(site: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "site" => site.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "site" => site.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("proxy_rejections_total", "reason" => reason).increment(1);
}

pub fn record_abandoned(reason: &'static str) {
    counter!("proxy_abandoned_total", "reason" => reason).increment(1);
}

pub fn job_started() {
    gauge!("proxy_jobs_in_flight").increment(1.0);
}

pub fn job_finished() {
    gauge!("proxy_jobs_in_flight").decrement(1.0);
}
