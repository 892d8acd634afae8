//! # Metrics Collection
//!
//! Prometheus metrics for the credential gateway. Recording goes through the
//! `metrics` facade, so every call is a no-op until [`init_metrics`] installs
//! the exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{GatewayError, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks gateway metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a lifecycle operation outcome (`success`, or an error code)
    pub fn record_operation(&self, operation: &str, outcome: &str) {
        let labels = [("operation", operation.to_string()), ("outcome", outcome.to_string())];
        counter!("credgate_operations_total", &labels).increment(1);
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, status: u16, duration: f64) {
        let labels = [("method", method.to_string()), ("status", status.to_string())];
        counter!("credgate_http_requests_total", &labels).increment(1);
        histogram!("credgate_http_request_duration_seconds").record(duration);
    }

    /// Record a request rejected before reaching a handler
    /// (`rate_limit`, `blocked_caller`, `payload_too_large`)
    pub fn record_rate_limited(&self, kind: &str) {
        let labels = [("kind", kind.to_string())];
        counter!("credgate_requests_rejected_total", &labels).increment(1);
    }

    /// Record an audit append that exhausted its retries
    pub fn record_audit_write_failure(&self) {
        counter!("credgate_audit_write_failures_total").increment(1);
    }

    /// Record an audit event dropped because the local backlog was full
    pub fn record_audit_backlog_dropped(&self) {
        counter!("credgate_audit_backlog_dropped_total").increment(1);
    }

    /// Record a raised security alert
    pub fn record_alert(&self, kind: &str) {
        let labels = [("kind", kind.to_string())];
        counter!("credgate_security_alerts_total", &labels).increment(1);
    }

    /// Record a vault health audit run
    pub fn record_vault_audit(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("credgate_vault_audits_total", &labels).increment(1);
    }

    /// Register descriptions and zero counters so exports appear before events occur.
    pub fn register_gateway_metrics(&self) {
        describe_counter!(
            "credgate_operations_total",
            Unit::Count,
            "Lifecycle operations grouped by operation and outcome"
        );
        describe_counter!(
            "credgate_http_requests_total",
            Unit::Count,
            "HTTP requests grouped by method and status"
        );
        describe_histogram!(
            "credgate_http_request_duration_seconds",
            Unit::Seconds,
            "HTTP request latency"
        );
        describe_counter!(
            "credgate_requests_rejected_total",
            Unit::Count,
            "Requests rejected by boundary middleware"
        );
        describe_counter!(
            "credgate_audit_write_failures_total",
            Unit::Count,
            "Audit events that could not be persisted after retries"
        );
        describe_counter!(
            "credgate_audit_backlog_dropped_total",
            Unit::Count,
            "Audit events dropped from a full local backlog"
        );
        describe_counter!(
            "credgate_security_alerts_total",
            Unit::Count,
            "Security alerts raised by anomaly detection"
        );
        describe_counter!(
            "credgate_vault_audits_total",
            Unit::Count,
            "Vault health audit runs grouped by overall status"
        );

        counter!("credgate_audit_write_failures_total").absolute(0);
        counter!("credgate_audit_backlog_dropped_total").absolute(0);
        for kind in ["rate_limit", "blocked_caller", "payload_too_large"] {
            counter!("credgate_requests_rejected_total", "kind" => kind).absolute(0);
        }
    }
}

/// Initialize the Prometheus exporter when a metrics port is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        GatewayError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| GatewayError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_gateway_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        let recorder = MetricsRecorder::new();
        recorder.record_operation("rotate", "success");
        recorder.record_rate_limited("rate_limit");
        recorder.record_audit_write_failure();
        recorder.record_alert("repeated_validation_failures");
        recorder.record_vault_audit("healthy");
        recorder.register_gateway_metrics();
    }

    #[test]
    fn test_disabled_metrics_is_ok() {
        let config = ObservabilityConfig { metrics_port: 0, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }
}
