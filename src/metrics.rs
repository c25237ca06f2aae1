//! Prometheus metrics collection for modelrelay
//!
//! This module provides metrics instrumentation for tracking:
//! - Routed requests by final outcome
//! - Individual candidate attempts by outcome class
//! - How deep into the candidate list a request had to go
//! - Catalog refreshes by result
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::router::AttemptOutcome;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Final outcome of a routed request
///
/// Restricts `outcome` label values at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A candidate answered
    Success,
    /// Every candidate failed
    Exhausted,
    /// Selection produced no candidates
    NoCandidates,
    /// No catalog could be obtained
    CatalogUnavailable,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::Exhausted => "exhausted",
            RequestOutcome::NoCandidates => "no_candidates",
            RequestOutcome::CatalogUnavailable => "catalog_unavailable",
        }
    }
}

/// Result of a catalog refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshResult {
    Success,
    Error,
}

impl RefreshResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshResult::Success => "success",
            RefreshResult::Error => "error",
        }
    }
}

/// Metrics collector for modelrelay
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    attempts_total: IntCounterVec,
    fallback_depth: Histogram,
    catalog_refreshes: IntCounterVec,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 4 outcomes
        let requests_total = IntCounterVec::new(
            Opts::new(
                "modelrelay_requests_total",
                "Total number of routed completion requests by final outcome",
            ),
            &["outcome"],
        )?;

        // Cardinality: success + 5 failure classes
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "modelrelay_attempts_total",
                "Total number of candidate attempts by outcome",
            ),
            &["outcome"],
        )?;

        // Attempts needed before a candidate answered (1 = first try)
        let fallback_depth = Histogram::with_opts(
            HistogramOpts::new(
                "modelrelay_fallback_depth",
                "Number of attempts needed to serve a successful request",
            )
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 12.0]),
        )?;

        let catalog_refreshes = IntCounterVec::new(
            Opts::new(
                "modelrelay_catalog_refreshes_total",
                "Total number of model catalog refreshes by result",
            ),
            &["result"],
        )?;

        // Prometheus internal errors while recording one of the above.
        // Any increment deserves investigation.
        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "modelrelay_metrics_recording_failures_total",
                "Total number of metrics recording operation failures by operation",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(fallback_depth.clone()))?;
        registry.register(Box::new(catalog_refreshes.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            attempts_total,
            fallback_depth,
            catalog_refreshes,
            metrics_recording_failures,
        })
    }

    /// Record the final outcome of a routed request
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_request(&self, outcome: RequestOutcome) -> Result<(), prometheus::Error> {
        self.requests_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record one candidate attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_attempt(&self, outcome: &AttemptOutcome) -> Result<(), prometheus::Error> {
        self.attempts_total
            .get_metric_with_label_values(&[outcome.label()])?
            .inc();
        Ok(())
    }

    /// Record how many attempts a successful request needed
    ///
    /// # Errors
    ///
    /// Returns an error if `attempts` is zero; a served request took at least one attempt.
    pub fn record_fallback_depth(&self, attempts: usize) -> Result<(), prometheus::Error> {
        if attempts == 0 {
            return Err(prometheus::Error::Msg(
                "fallback depth must be at least 1 for a served request".to_string(),
            ));
        }
        self.fallback_depth.observe(attempts as f64);
        Ok(())
    }

    /// Record a catalog refresh
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_catalog_refresh(&self, result: RefreshResult) -> Result<(), prometheus::Error> {
        self.catalog_refreshes
            .get_metric_with_label_values(&[result.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a failure of one of the `record_*` operations
    ///
    /// `operation` is the failing method name, e.g. `"record_attempt"`.
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Total metrics recording failures across all operations
    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.name() == "modelrelay_metrics_recording_failures_total")
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Gather all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    "Prometheus text encoder failed"
                );
                prometheus::Error::Msg(format!(
                    "Failed to encode {} metric families: {}",
                    metric_count, e
                ))
            })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics
            .record_request(RequestOutcome::Success)
            .expect("Test operation should succeed");
        metrics
            .record_attempt(&AttemptOutcome::Success("hi".to_string()))
            .expect("Test operation should succeed");
        metrics
            .record_fallback_depth(1)
            .expect("Test operation should succeed");
        metrics
            .record_catalog_refresh(RefreshResult::Success)
            .expect("Test operation should succeed");
        metrics.metrics_recording_failure("record_request");

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names.len(), 5, "Expected 5 metric families, got {:?}", names);
        assert!(names.contains(&"modelrelay_requests_total".to_string()));
        assert!(names.contains(&"modelrelay_attempts_total".to_string()));
        assert!(names.contains(&"modelrelay_fallback_depth".to_string()));
        assert!(names.contains(&"modelrelay_catalog_refreshes_total".to_string()));
        assert!(names.contains(&"modelrelay_metrics_recording_failures_total".to_string()));
    }

    #[test]
    fn test_record_attempt_uses_failure_class_labels() {
        let metrics = Metrics::new().expect("Failed to create test metrics");

        metrics
            .record_attempt(&AttemptOutcome::RateLimited("429".to_string()))
            .expect("Test operation should succeed");
        metrics
            .record_attempt(&AttemptOutcome::TransientError("timeout".to_string()))
            .expect("Test operation should succeed");

        let output = metrics.gather().expect("Failed to gather test metrics");
        assert!(output.contains("outcome=\"rate_limited\""));
        assert!(output.contains("outcome=\"transient_error\""));
    }

    #[test]
    fn test_fallback_depth_rejects_zero() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        assert!(metrics.record_fallback_depth(0).is_err());
        assert!(metrics.record_fallback_depth(3).is_ok());
    }

    #[test]
    fn test_gather_produces_prometheus_text_format() {
        let metrics = Metrics::new().expect("Failed to create test metrics");

        metrics
            .record_request(RequestOutcome::Exhausted)
            .expect("Test operation should succeed");
        let output = metrics.gather().expect("Failed to gather test metrics");

        assert!(output.contains("# HELP modelrelay_requests_total"));
        assert!(output.contains("# TYPE modelrelay_requests_total counter"));
        assert!(output.contains("modelrelay_requests_total{outcome=\"exhausted\"} 1"));
    }

    #[test]
    fn test_metrics_recording_failures_count_sums_operations() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        assert_eq!(metrics.metrics_recording_failures_count(), 0);

        metrics.metrics_recording_failure("record_attempt");
        metrics.metrics_recording_failure("record_attempt");
        metrics.metrics_recording_failure("record_request");
        assert_eq!(metrics.metrics_recording_failures_count(), 3);
    }

    #[test]
    fn test_metrics_is_clonable() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        let clone = metrics.clone();

        clone
            .record_catalog_refresh(RefreshResult::Error)
            .expect("Test operation should succeed");
        let output = metrics.gather().expect("Failed to gather test metrics");
        assert!(output.contains("result=\"error\""), "clones share a registry");
    }
}
