//! Cluster health monitor
//!
//! Polls the cluster's aggregated health and node statuses, reports
//! unhealthy evaluations through a [`HealthAggregator`] and tracks nodes
//! that stay out of the Up status for too long. Failures to reach the
//! cluster are logged and never fail the cycle.

use super::{Monitor, MonitorContext};
use crate::config::MonitorSettings;
use crate::error::{ObserverError, ObserverResult};
use crate::health::{
    classify_status, classify_transport_error, EvaluationDetail, HealthAggregator, HealthReport,
    HealthState, NodeObservation, NodeStatusTracker, ReportTarget,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Property of aggregated cluster health reports
pub const CLUSTER_HEALTH_PROPERTY: &str = "ClusterHealth";

/// Cluster health as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealthSnapshot {
    pub aggregated_state: HealthState,
    /// Entities contributing to a non-Ok aggregated state
    #[serde(default)]
    pub evaluations: Vec<EvaluationDetail>,
    #[serde(default)]
    pub nodes: Vec<NodeObservation>,
}

/// Source of cluster health snapshots
#[async_trait]
pub trait ClusterHealthSource: Send + Sync {
    async fn fetch(&self) -> ObserverResult<ClusterHealthSnapshot>;
}

/// Reads snapshots as JSON from an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpClusterHealthSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClusterHealthSource {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> ObserverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ObserverError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ClusterHealthSource for HttpClusterHealthSource {
    async fn fetch(&self) -> ObserverResult<ClusterHealthSnapshot> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ObserverError::platform(
                classify_status(status),
                format!("cluster health endpoint returned {}", status),
            ));
        }

        response
            .json::<ClusterHealthSnapshot>()
            .await
            .map_err(classify_transport_error)
    }
}

pub struct ClusterHealthMonitor {
    name: String,
    settings: MonitorSettings,
    ctx: MonitorContext,
    source: Arc<dyn ClusterHealthSource>,
    aggregator: HealthAggregator,
    node_tracker: NodeStatusTracker,
    target: ReportTarget,
    snapshot: Option<ClusterHealthSnapshot>,
}

impl ClusterHealthMonitor {
    /// Reports are filed against the node the observer runs on
    pub fn new(
        name: impl Into<String>,
        settings: MonitorSettings,
        ctx: MonitorContext,
        source: Arc<dyn ClusterHealthSource>,
    ) -> Self {
        let name = name.into();
        let ctx = ctx.with_telemetry(settings.enable_telemetry);
        let aggregator = HealthAggregator::new(
            name.clone(),
            settings.aggregator_options(Some(CLUSTER_HEALTH_PROPERTY.to_string())),
        );
        let node_tracker = NodeStatusTracker::new(name.clone(), settings.max_time_node_status_not_ok)
            .with_time_to_live(settings.report_time_to_live);
        let target = ReportTarget::node(ctx.node_name.clone());

        Self {
            name,
            settings,
            ctx,
            source,
            aggregator,
            node_tracker,
            target,
            snapshot: None,
        }
    }

    pub fn aggregator(&self) -> &HealthAggregator {
        &self.aggregator
    }

    pub fn node_tracker(&self) -> &NodeStatusTracker {
        &self.node_tracker
    }

    async fn submit(&self, report: &HealthReport, cancel: &CancellationToken) -> Result<()> {
        match self.ctx.submit(&self.name, report, cancel).await {
            Ok(()) => Ok(()),
            Err(ObserverError::Cancelled) => Err(ObserverError::Cancelled.into()),
            Err(e) => {
                warn!(
                    monitor = %self.name,
                    target = %report.target.key(),
                    error = %e,
                    "Failed to submit health report"
                );
                Ok(())
            }
        }
    }

    async fn report_fetch_failure(&self, error: &ObserverError, cancel: &CancellationToken) -> Result<()> {
        let report = HealthReport::builder(self.name.clone(), self.target.clone())
            .state(HealthState::Unknown)
            .description(format!(
                "Unable to determine cluster health ({}). Probing will continue.",
                error
            ))
            .property(CLUSTER_HEALTH_PROPERTY)
            .time_to_live(self.settings.report_time_to_live)
            .emit_log_event(self.settings.enable_etw)
            .build();
        self.submit(&report, cancel).await
    }
}

#[async_trait]
impl Monitor for ClusterHealthMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn run_interval(&self) -> Duration {
        self.settings.run_interval
    }

    async fn observe(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.snapshot = None;

        let source = Arc::clone(&self.source);
        match self.ctx.retry.execute(|| source.fetch(), cancel).await {
            Ok(outcome) => {
                self.snapshot = outcome.into_option();
                Ok(())
            }
            Err(ObserverError::Cancelled) => Err(ObserverError::Cancelled.into()),
            Err(e) => {
                warn!(
                    monitor = %self.name,
                    error = %e,
                    "Failed to fetch cluster health, probing will continue"
                );
                if self.settings.emit_unknown_on_failure {
                    self.report_fetch_failure(&e, cancel).await?;
                }
                Ok(())
            }
        }
    }

    async fn report(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(snapshot) = self.snapshot.take() else {
            return Ok(());
        };

        let (decision, report) = self.aggregator.cycle(
            snapshot.aggregated_state,
            &snapshot.evaluations,
            self.target.clone(),
            cancel,
        )?;
        debug!(monitor = %self.name, decision = ?decision, "Cluster health evaluated");

        if let Some(report) = report {
            self.submit(&report, cancel).await?;
        }

        let node_reports = self.node_tracker.update(&snapshot.nodes, Utc::now());
        for report in &node_reports {
            if cancel.is_cancelled() {
                return Err(ObserverError::Cancelled.into());
            }

            if report.state == HealthState::Warning {
                let node = report.target.node_name().unwrap_or_default();
                if let Some(tracked) = self.node_tracker.tracked(node) {
                    self.ctx.logger.log_node_status_breach(
                        node,
                        &tracked.status.to_string(),
                        tracked.duration(),
                    );
                }
            }
            self.submit(report, cancel).await?;
        }

        Ok(())
    }
}
