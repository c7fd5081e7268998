//! Agent self-status
//!
//! The run-loop records every monitor run here and the submission path
//! records whether reports are getting through. The liveness and
//! readiness endpoints are computed from these records. This is the agent's
//! own health, distinct from the reports it submits about the node.

use crate::runner::RunOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Coarse status of a monitor or of the submitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    #[default]
    Healthy,
    /// Last run failed; the monitor is retried next iteration
    Degraded,
    /// Hung; the monitor never runs again
    Unhealthy,
}

/// What the run-loop knows about one monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub status: ComponentStatus,
    pub runs: u64,
    pub failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hung_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MonitorRecord {
    fn apply(&mut self, outcome: RunOutcome, elapsed: Duration, message: Option<String>) {
        let now = Utc::now();
        self.runs += 1;
        self.last_outcome = Some(outcome);
        self.last_run = Some(now);
        self.last_duration_ms = Some(elapsed.as_millis() as u64);

        match outcome {
            RunOutcome::Completed => {
                self.status = ComponentStatus::Healthy;
                self.message = None;
            }
            RunOutcome::Failed => {
                self.status = ComponentStatus::Degraded;
                self.failures += 1;
                self.message = message;
            }
            RunOutcome::Hung => {
                self.status = ComponentStatus::Unhealthy;
                self.hung_since = Some(now);
                self.message = message;
            }
            // An interrupted run says nothing about the monitor itself
            RunOutcome::Cancelled | RunOutcome::Skipped => {}
        }
    }
}

/// Whether health reports are reaching the health subsystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitterRecord {
    pub status: ComponentStatus,
    pub submitted: u64,
    pub consecutive_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ComponentStatus,
    pub running: bool,
    pub monitors: BTreeMap<String, MonitorRecord>,
    pub submitter: SubmitterRecord,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct StatusState {
    running: bool,
    monitors: BTreeMap<String, MonitorRecord>,
    submitter: SubmitterRecord,
}

impl StatusState {
    /// A hung monitor is Unhealthy; failing monitors or a failing
    /// submitter are Degraded
    fn overall(&self) -> ComponentStatus {
        let mut overall = self.submitter.status;
        for record in self.monitors.values() {
            match record.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => overall = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }
        overall
    }
}

/// Shared between the run-loop, the monitors and the API
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    state: Arc<RwLock<StatusState>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a monitor before its first run
    pub async fn register_monitor(&self, name: &str) {
        let mut state = self.state.write().await;
        state.monitors.entry(name.to_string()).or_default();
    }

    /// Record how a monitor run ended
    pub async fn record_run(
        &self,
        name: &str,
        outcome: RunOutcome,
        elapsed: Duration,
        message: Option<String>,
    ) {
        let mut state = self.state.write().await;
        state
            .monitors
            .entry(name.to_string())
            .or_default()
            .apply(outcome, elapsed, message);
    }

    pub async fn record_submission_success(&self) {
        let mut state = self.state.write().await;
        let submitter = &mut state.submitter;
        submitter.status = ComponentStatus::Healthy;
        submitter.submitted += 1;
        submitter.consecutive_failures = 0;
        submitter.last_success = Some(Utc::now());
        submitter.last_error = None;
    }

    pub async fn record_submission_failure(&self, error: impl Into<String>) {
        let mut state = self.state.write().await;
        let submitter = &mut state.submitter;
        submitter.status = ComponentStatus::Degraded;
        submitter.consecutive_failures += 1;
        submitter.last_error = Some(error.into());
    }

    pub async fn set_running(&self, running: bool) {
        self.state.write().await.running = running;
    }

    pub async fn monitor(&self, name: &str) -> Option<MonitorRecord> {
        self.state.read().await.monitors.get(name).cloned()
    }

    pub async fn submitter(&self) -> SubmitterRecord {
        self.state.read().await.submitter.clone()
    }

    pub async fn report(&self) -> StatusReport {
        let state = self.state.read().await;
        StatusReport {
            status: state.overall(),
            running: state.running,
            monitors: state.monitors.clone(),
            submitter: state.submitter.clone(),
        }
    }

    /// Ready while the run-loop is running and no monitor has hung
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.running {
            Some("Run-loop not running".to_string())
        } else {
            state
                .monitors
                .iter()
                .find(|(_, record)| record.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| format!("Monitor {} is hung", name))
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_MONITOR: &str = "NodeObserver";
    const CLUSTER_MONITOR: &str = "ClusterObserver";

    #[tokio::test]
    async fn test_registered_monitor_has_no_runs() {
        let registry = StatusRegistry::new();
        registry.register_monitor(NODE_MONITOR).await;

        let record = registry.monitor(NODE_MONITOR).await.unwrap();
        assert_eq!(record.status, ComponentStatus::Healthy);
        assert_eq!(record.runs, 0);
        assert!(record.last_run.is_none());
        assert!(registry.monitor("missing").await.is_none());
        assert_eq!(registry.report().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failed_run_degrades_until_next_success() {
        let registry = StatusRegistry::new();
        registry
            .record_run(
                CLUSTER_MONITOR,
                RunOutcome::Failed,
                Duration::from_millis(40),
                Some("cluster endpoint unreachable".to_string()),
            )
            .await;

        let record = registry.monitor(CLUSTER_MONITOR).await.unwrap();
        assert_eq!(record.status, ComponentStatus::Degraded);
        assert_eq!(record.failures, 1);
        assert_eq!(record.last_duration_ms, Some(40));
        assert_eq!(
            record.message.as_deref(),
            Some("cluster endpoint unreachable")
        );
        assert_eq!(registry.report().await.status, ComponentStatus::Degraded);

        registry
            .record_run(CLUSTER_MONITOR, RunOutcome::Completed, Duration::ZERO, None)
            .await;
        let record = registry.monitor(CLUSTER_MONITOR).await.unwrap();
        assert_eq!(record.status, ComponentStatus::Healthy);
        assert_eq!(record.runs, 2);
        assert_eq!(record.failures, 1);
        assert!(record.message.is_none());
    }

    #[tokio::test]
    async fn test_hung_monitor_makes_agent_unready() {
        let registry = StatusRegistry::new();
        registry.register_monitor(NODE_MONITOR).await;
        registry.set_running(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .record_run(
                NODE_MONITOR,
                RunOutcome::Hung,
                Duration::from_secs(600),
                Some("Exceeded execution timeout of 600s".to_string()),
            )
            .await;

        let record = registry.monitor(NODE_MONITOR).await.unwrap();
        assert!(record.hung_since.is_some());
        assert_eq!(record.last_outcome, Some(RunOutcome::Hung));

        let report = registry.report().await;
        assert_eq!(report.status, ComponentStatus::Unhealthy);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Monitor NodeObserver is hung")
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_status() {
        let registry = StatusRegistry::new();
        registry
            .record_run(NODE_MONITOR, RunOutcome::Failed, Duration::ZERO, Some("x".into()))
            .await;
        registry
            .record_run(NODE_MONITOR, RunOutcome::Cancelled, Duration::ZERO, None)
            .await;

        let record = registry.monitor(NODE_MONITOR).await.unwrap();
        assert_eq!(record.status, ComponentStatus::Degraded);
        assert_eq!(record.last_outcome, Some(RunOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_submitter_failures_degrade_and_recover() {
        let registry = StatusRegistry::new();
        registry.record_submission_failure("403 Forbidden").await;
        registry.record_submission_failure("403 Forbidden").await;

        let submitter = registry.submitter().await;
        assert_eq!(submitter.status, ComponentStatus::Degraded);
        assert_eq!(submitter.consecutive_failures, 2);
        assert_eq!(registry.report().await.status, ComponentStatus::Degraded);

        registry.record_submission_success().await;
        let submitter = registry.submitter().await;
        assert_eq!(submitter.status, ComponentStatus::Healthy);
        assert_eq!(submitter.consecutive_failures, 0);
        assert_eq!(submitter.submitted, 1);
        assert!(submitter.last_error.is_none());
    }

    #[tokio::test]
    async fn test_not_ready_until_running() {
        let registry = StatusRegistry::new();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Run-loop not running"));

        registry.set_running(true).await;
        assert!(registry.readiness().await.ready);
        registry.set_running(false).await;
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_report_serializes_monitor_records() {
        let registry = StatusRegistry::new();
        registry
            .record_run(NODE_MONITOR, RunOutcome::Completed, Duration::from_millis(5), None)
            .await;

        let json = serde_json::to_value(registry.report().await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["monitors"][NODE_MONITOR]["last_outcome"], "completed");
        assert_eq!(json["monitors"][NODE_MONITOR]["runs"], 1);
        assert!(json["monitors"][NODE_MONITOR].get("hung_since").is_none());
        assert_eq!(json["submitter"]["status"], "healthy");
    }
}
