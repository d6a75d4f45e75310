//! Metrics collection and exposition.
//!
//! # Metrics
//! - `transclusion_resolutions_total` (counter): resolution calls by outcome
//! - `transclusion_resolution_duration_seconds` (histogram): whole-call latency
//! - `transclusion_cache_lookups_total` (counter): lookups by outcome (hit, miss, joined)
//! - `transclusion_fragment_fetches_total` (counter): outbound fetches by status
//! - `transclusion_fragment_fetch_duration_seconds` (histogram): fetch latency
//! - `transclusion_fragment_errors_total` (counter): failed sources by kind
//! - `transclusion_cache_entries` / `transclusion_cache_size_bytes` (gauges)
//! - `http_requests_total` / `http_request_duration_seconds`: host server traffic
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is only installed by the binary

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// `outcome` is one of `hit`, `miss` or `joined`.
pub fn record_cache_lookup(outcome: &'static str) {
    ::metrics::counter!("transclusion_cache_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_fragment_fetch(status: u16, elapsed: Duration) {
    ::metrics::counter!("transclusion_fragment_fetches_total", "status" => status.to_string())
        .increment(1);
    ::metrics::histogram!("transclusion_fragment_fetch_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_fragment_error(kind: &'static str) {
    ::metrics::counter!("transclusion_fragment_errors_total", "kind" => kind).increment(1);
}

pub fn record_cache_size(entries: usize, bytes: usize) {
    ::metrics::gauge!("transclusion_cache_entries").set(entries as f64);
    ::metrics::gauge!("transclusion_cache_size_bytes").set(bytes as f64);
}

/// `outcome` is one of `ok`, `passthrough` or `rejected`.
pub fn record_resolution(outcome: &'static str, includes: usize, elapsed: Duration) {
    ::metrics::counter!("transclusion_resolutions_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("transclusion_includes_per_document").record(includes as f64);
    ::metrics::histogram!("transclusion_resolution_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    ::metrics::counter!("http_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    ::metrics::histogram!("http_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}
