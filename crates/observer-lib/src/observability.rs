//! Observability infrastructure for the node observer
//!
//! Provides:
//! - Prometheus metrics (monitor cycle latency, reports by state, failures, hung monitors)
//! - Structured JSON logging with tracing

use crate::health::{HealthReport, HealthState};
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for monitor cycle latency (in seconds)
const CYCLE_LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    monitor_cycle_seconds: HistogramVec,
    health_reports: IntCounterVec,
    monitor_failures: IntCounterVec,
    hung_monitors: IntGauge,
    samples_collected: IntCounterVec,
    series_average: GaugeVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            monitor_cycle_seconds: register_histogram_vec!(
                "node_observer_monitor_cycle_seconds",
                "Time spent in one observe and report cycle of a monitor",
                &["monitor"],
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register monitor_cycle_seconds"),

            health_reports: register_int_counter_vec!(
                "node_observer_health_reports_total",
                "Health reports submitted, by state",
                &["monitor", "state"]
            )
            .expect("Failed to register health_reports_total"),

            monitor_failures: register_int_counter_vec!(
                "node_observer_monitor_failures_total",
                "Monitor cycles that ended with an error",
                &["monitor"]
            )
            .expect("Failed to register monitor_failures_total"),

            hung_monitors: register_int_gauge!(
                "node_observer_hung_monitors",
                "Monitors disabled after exceeding their execution timeout"
            )
            .expect("Failed to register hung_monitors"),

            samples_collected: register_int_counter_vec!(
                "node_observer_samples_collected_total",
                "Resource samples read from the sample provider",
                &["property"]
            )
            .expect("Failed to register samples_collected_total"),

            series_average: register_gauge_vec!(
                "node_observer_series_average",
                "Average of the last observed data series",
                &["property", "entity"]
            )
            .expect("Failed to register series_average"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, monitor: &str, duration: Duration) {
        self.inner()
            .monitor_cycle_seconds
            .with_label_values(&[monitor])
            .observe(duration.as_secs_f64());
    }

    pub fn inc_health_reports(&self, monitor: &str, state: HealthState) {
        self.inner()
            .health_reports
            .with_label_values(&[monitor, &state.to_string()])
            .inc();
    }

    pub fn inc_monitor_failures(&self, monitor: &str) {
        self.inner()
            .monitor_failures
            .with_label_values(&[monitor])
            .inc();
    }

    pub fn inc_hung_monitors(&self) {
        self.inner().hung_monitors.inc();
    }

    pub fn inc_samples_collected(&self, property: &str) {
        self.inner()
            .samples_collected
            .with_label_values(&[property])
            .inc();
    }

    pub fn set_series_average(&self, property: &str, entity: &str, value: f64) {
        self.inner()
            .series_average
            .with_label_values(&[property, entity])
            .set(value);
    }

    /// Content type of [`AgentMetrics::render`] output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Every registered metric in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for agent events
///
/// Every record carries an `event` field so log pipelines can filter on
/// agent events without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, monitors: &[String]) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            monitors = ?monitors,
            "Node observer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Node observer shutting down"
        );
    }

    /// Local copy of a report whose emit-log flag is set
    pub fn log_health_report(&self, report: &HealthReport) {
        match report.state {
            HealthState::Error | HealthState::Warning => {
                warn!(
                    event = "health_report_emitted",
                    node = %self.node_name,
                    source = %report.source_id,
                    property = %report.property,
                    target = %report.target.key(),
                    state = %report.state,
                    description = %report.description,
                    "Unhealthy state reported"
                );
            }
            _ => {
                info!(
                    event = "health_report_emitted",
                    node = %self.node_name,
                    source = %report.source_id,
                    property = %report.property,
                    target = %report.target.key(),
                    state = %report.state,
                    description = %report.description,
                    "Health state reported"
                );
            }
        }
    }

    pub fn log_monitor_hung(&self, monitor: &str, timeout: Duration) {
        error!(
            event = "monitor_hung",
            node = %self.node_name,
            monitor = %monitor,
            timeout_secs = timeout.as_secs(),
            "Monitor exceeded its execution timeout and will no longer run"
        );
    }

    pub fn log_monitor_failed(&self, monitor: &str, error: &anyhow::Error) {
        warn!(
            event = "monitor_failed",
            node = %self.node_name,
            monitor = %monitor,
            error = %error,
            "Monitor cycle failed"
        );
    }

    pub fn log_node_status_breach(&self, node: &str, status: &str, duration: Duration) {
        warn!(
            event = "node_status_breach",
            node = %self.node_name,
            target_node = %node,
            status = %status,
            duration_secs = duration.as_secs(),
            "Node has not been Up for longer than allowed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ReportTarget;

    #[test]
    fn test_agent_metrics_creation() {
        let metrics = AgentMetrics::new();
        let clone = metrics.clone();

        metrics.observe_cycle_latency("NodeObserver", Duration::from_millis(120));
        metrics.inc_health_reports("NodeObserver", HealthState::Warning);
        metrics.inc_monitor_failures("ClusterObserver");
        metrics.inc_samples_collected("CPU %");
        clone.set_series_average("CPU %", "node", 42.5);
        clone.inc_hung_monitors();
    }

    #[test]
    fn test_render_text_format() {
        let metrics = AgentMetrics::new();
        metrics.inc_health_reports("RenderTest", HealthState::Error);

        let text = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(text.contains("# TYPE node_observer_health_reports_total counter"));
        assert!(text.contains("monitor=\"RenderTest\""));
        assert!(text.contains("node_observer_hung_monitors"));
        assert!(metrics.content_type().starts_with("text/plain"));
    }

    #[test]
    fn test_structured_logger() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");

        let report = HealthReport::builder("NodeObserver", ReportTarget::node("test-node"))
            .state(HealthState::Warning)
            .description("CPU %: 91")
            .build();
        logger.log_health_report(&report);
        logger.log_monitor_hung("NodeObserver", Duration::from_secs(60));
    }
}
