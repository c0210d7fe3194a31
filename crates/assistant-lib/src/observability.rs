//! Observability infrastructure for the assistant service
//!
//! Provides:
//! - Prometheus metrics (recommendation latency, inference latency, outcomes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets for end-to-end recommendations (in seconds); dominated by
/// upstream HTTP calls
const REQUEST_LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Latency buckets for model inference (in seconds)
const INFERENCE_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// One bucket per stress level
const STRESS_LEVEL_BUCKETS: &[f64] = &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];

static GLOBAL_METRICS: OnceLock<AssistantMetricsInner> = OnceLock::new();

struct AssistantMetricsInner {
    recommendation_latency_seconds: Histogram,
    inference_latency_seconds: Histogram,
    stress_level: Histogram,
    recommendations_total: IntCounterVec,
    errors_total: IntCounterVec,
    urgency_fallbacks_total: IntCounter,
    engine_info: GaugeVec,
}

impl AssistantMetricsInner {
    fn new() -> Self {
        Self {
            recommendation_latency_seconds: register_histogram!(
                "harmonia_assistant_recommendation_latency_seconds",
                "End-to-end time to produce and dispatch a recommendation",
                REQUEST_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register recommendation_latency_seconds"),

            inference_latency_seconds: register_histogram!(
                "harmonia_assistant_inference_latency_seconds",
                "Time spent in the stress model",
                INFERENCE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            stress_level: register_histogram!(
                "harmonia_assistant_stress_level",
                "Distribution of raw stress levels produced by the model",
                STRESS_LEVEL_BUCKETS.to_vec()
            )
            .expect("Failed to register stress_level"),

            recommendations_total: register_int_counter_vec!(
                "harmonia_assistant_recommendations_total",
                "Recommendations dispatched, by action",
                &["action"]
            )
            .expect("Failed to register recommendations_total"),

            errors_total: register_int_counter_vec!(
                "harmonia_assistant_errors_total",
                "Failed recommendation requests, by error class",
                &["class"]
            )
            .expect("Failed to register errors_total"),

            urgency_fallbacks_total: register_int_counter!(
                "harmonia_assistant_urgency_fallbacks_total",
                "Times the neural urgency classifier failed and keywords were used"
            )
            .expect("Failed to register urgency_fallbacks_total"),

            engine_info: register_gauge_vec!(
                "harmonia_assistant_engine_info",
                "Information about the loaded decision engine",
                &["kind", "version"]
            )
            .expect("Failed to register engine_info"),
        }
    }
}

/// Assistant metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone, Debug)]
pub struct AssistantMetrics {
    _private: (),
}

impl Default for AssistantMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AssistantMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AssistantMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_recommendation_latency(&self, duration_secs: f64) {
        self.inner()
            .recommendation_latency_seconds
            .observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn observe_stress_level(&self, level: i64) {
        self.inner().stress_level.observe(level as f64);
    }

    pub fn inc_recommendations(&self, action: &str) {
        self.inner()
            .recommendations_total
            .with_label_values(&[action])
            .inc();
    }

    pub fn inc_errors(&self, class: &str) {
        self.inner().errors_total.with_label_values(&[class]).inc();
    }

    pub fn inc_urgency_fallbacks(&self) {
        self.inner().urgency_fallbacks_total.inc();
    }

    /// Update loaded engine info
    pub fn set_engine_info(&self, kind: &str, version: &str) {
        self.inner().engine_info.reset();
        self.inner()
            .engine_info
            .with_label_values(&[kind, version])
            .set(1.0);
    }
}

/// Structured logger for assistant events
///
/// Emits event-tagged records so log pipelines can key on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_recommendation(
        &self,
        stress_level: i64,
        action: &str,
        urgent_emails_flag: f64,
        elapsed_ms: u128,
    ) {
        info!(
            event = "recommendation_generated",
            service = %self.service,
            stress_level = stress_level,
            action = %action,
            urgent_emails_flag = urgent_emails_flag,
            elapsed_ms = elapsed_ms as u64,
            "Recommendation dispatched"
        );
    }

    pub fn log_recommendation_failed(&self, class: &str, error: &str) {
        warn!(
            event = "recommendation_failed",
            service = %self.service,
            class = %class,
            error = %error,
            "Recommendation request failed"
        );
    }

    pub fn log_dispatch_failed(&self, action: &str, error: &str) {
        warn!(
            event = "dispatch_failed",
            service = %self.service,
            action = %action,
            error = %error,
            "Action dispatch failed"
        );
    }

    pub fn log_engine_loaded(&self, path: &str, kind: &str, version: &str) {
        info!(
            event = "engine_loaded",
            service = %self.service,
            path = %path,
            kind = %kind,
            version = %version,
            "Decision engine loaded"
        );
    }

    pub fn log_engine_load_failed(&self, path: &str, error: &str) {
        warn!(
            event = "engine_load_failed",
            service = %self.service,
            path = %path,
            error = %error,
            "Decision engine not loaded, recommendations will be refused"
        );
    }

    pub fn log_startup(&self, version: &str, urgency_backend: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            urgency_backend = %urgency_backend,
            "Assistant service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Assistant service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_metrics_handles_share_registry() {
        let metrics = AssistantMetrics::new();
        let other = metrics.clone();

        metrics.observe_recommendation_latency(0.120);
        metrics.observe_inference_latency(0.002);
        metrics.observe_stress_level(5);
        metrics.inc_recommendations("create_break_event");
        other.inc_errors("prediction_failed");
        other.inc_urgency_fallbacks();
        other.set_engine_info("direct_predictor", "v2");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "harmonia_assistant_recommendations_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("assistant");
        assert_eq!(logger.service, "assistant");
    }
}
