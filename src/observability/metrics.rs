//! Metrics collection and exposition.
//!
//! # Metrics
//! - `console_requests_admitted_total` (counter): requests past the pipeline, by tier
//! - `console_rate_limited_total` (counter): 429s, by tier
//! - `console_admission_denied_total` (counter): rejections, by reason
//! - `console_authorization_degraded_total` (counter): directory failures, by lookup
//! - `console_rate_limit_visitors` (gauge): tracked visitors, by tier
//! - `console_visitors_evicted_total` (counter): visitors removed by the sweep, by tier
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub fn record_admitted(tier: &'static str) {
    counter!("console_requests_admitted_total", "tier" => tier).increment(1);
}

pub fn record_rate_limited(tier: &'static str) {
    counter!("console_rate_limited_total", "tier" => tier).increment(1);
}

pub fn record_denied(reason: &'static str) {
    counter!("console_admission_denied_total", "reason" => reason).increment(1);
}

/// A directory lookup failed and the guard failed closed.
pub fn record_authorization_degraded(lookup: &'static str) {
    counter!("console_authorization_degraded_total", "lookup" => lookup).increment(1);
}

pub fn record_visitors(tier: &'static str, count: usize) {
    gauge!("console_rate_limit_visitors", "tier" => tier).set(count as f64);
}

pub fn record_visitors_evicted(tier: &'static str, count: usize) {
    counter!("console_visitors_evicted_total", "tier" => tier).increment(count as u64);
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to start Prometheus exporter: {}", e))?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_admitted("general");
        record_rate_limited("auth");
        record_denied("insufficient_role");
        record_authorization_degraded("lookup_permission");
        record_visitors("strict", 3);
        record_visitors_evicted("strict", 1);
    }
}
