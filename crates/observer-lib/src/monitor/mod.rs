//! Monitors
//!
//! A monitor samples some part of the system in `observe` and turns what
//! it saw into health reports in `report`. Monitors share a
//! [`MonitorContext`] for submission, metrics and logging.

mod cluster_health;
mod resource_usage;


pub use cluster_health::{
    ClusterHealthMonitor, ClusterHealthSnapshot, ClusterHealthSource, HttpClusterHealthSource,
    CLUSTER_HEALTH_PROPERTY,
};
pub use resource_usage::{MetricTarget, ResourceUsageMonitor};

use crate::error::{ObserverError, ObserverResult};
use crate::health::{HealthReport, HealthSubmitter};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::status::StatusRegistry;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A unit of observation driven by the run-loop
#[async_trait]
pub trait Monitor: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// Minimum time between runs
    fn run_interval(&self) -> Duration;

    /// Sample and evaluate
    async fn observe(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Emit health reports for what the last `observe` saw
    async fn report(&mut self, cancel: &CancellationToken) -> Result<()>;
}

/// Collaborators shared by all monitors
#[derive(Clone)]
pub struct MonitorContext {
    pub node_name: String,
    pub submitter: Arc<dyn HealthSubmitter>,
    pub retry: RetryPolicy,
    pub metrics: AgentMetrics,
    pub logger: StructuredLogger,
    /// Submission outcomes are recorded here
    pub status: StatusRegistry,
    /// Per-monitor Prometheus series are only updated when set
    pub telemetry: bool,
}

impl MonitorContext {
    pub fn new(node_name: impl Into<String>, submitter: Arc<dyn HealthSubmitter>) -> Self {
        let node_name = node_name.into();
        Self {
            logger: StructuredLogger::new(node_name.clone()),
            node_name,
            submitter,
            retry: RetryPolicy::default(),
            metrics: AgentMetrics::new(),
            status: StatusRegistry::new(),
            telemetry: true,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_status(mut self, status: StatusRegistry) -> Self {
        self.status = status;
        self
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry = enabled;
        self
    }

    pub(crate) fn record_sample(&self, property: &str) {
        if self.telemetry {
            self.metrics.inc_samples_collected(property);
        }
    }

    pub(crate) fn record_average(&self, property: &str, entity: &str, value: f64) {
        if self.telemetry {
            self.metrics.set_series_average(property, entity, value);
        }
    }

    /// Submit a report under the retry policy, logging it locally first
    /// when its emit-log flag is set. The outcome is recorded against the
    /// submitter unless the submission was cancelled.
    pub async fn submit(
        &self,
        monitor: &str,
        report: &HealthReport,
        cancel: &CancellationToken,
    ) -> ObserverResult<()> {
        if report.emit_log_event {
            self.logger.log_health_report(report);
        }

        let outcome = match self
            .retry
            .execute(|| self.submitter.submit(report), cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(ObserverError::Cancelled) => return Err(ObserverError::Cancelled),
            Err(e) => {
                self.status.record_submission_failure(e.to_string()).await;
                return Err(e);
            }
        };

        if let RetryOutcome::SuccessEquivalent = outcome {
            tracing::debug!(
                monitor = %monitor,
                target = %report.target.key(),
                "Report superseded by a newer one"
            );
        }
        self.status.record_submission_success().await;
        if self.telemetry {
            self.metrics.inc_health_reports(monitor, report.state);
        }
        Ok(())
    }
}
