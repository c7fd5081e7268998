//! Health report model
//!
//! A [`HealthReport`] targets exactly one platform entity, carries a
//! discrete [`HealthState`] and a time-to-live after which the health
//! subsystem expires it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time-to-live used when a report does not set one
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(5 * 60);

/// Discrete health state; `Unknown` means not yet evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HealthState {
    #[default]
    Unknown,
    Ok,
    Warning,
    Error,
}

impl HealthState {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthState::Warning | HealthState::Error)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Unknown => write!(f, "Unknown"),
            HealthState::Ok => write!(f, "Ok"),
            HealthState::Warning => write!(f, "Warning"),
            HealthState::Error => write!(f, "Error"),
        }
    }
}

/// Kind of platform entity a report is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Application,
    Service,
    StatefulServiceReplica,
    StatelessServiceInstance,
    Partition,
    Node,
    DeployedApplication,
}

/// The entity a report targets; exactly one variant applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum ReportTarget {
    Application {
        application_name: String,
    },
    Service {
        service_name: String,
    },
    StatefulServiceReplica {
        partition_id: String,
        replica_id: i64,
    },
    StatelessServiceInstance {
        partition_id: String,
        instance_id: i64,
    },
    Partition {
        partition_id: String,
    },
    Node {
        node_name: String,
    },
    DeployedApplication {
        application_name: String,
        node_name: String,
    },
}

impl ReportTarget {
    pub fn node(node_name: impl Into<String>) -> Self {
        ReportTarget::Node {
            node_name: node_name.into(),
        }
    }

    /// Node the target lives on, where the target names one
    pub fn node_name(&self) -> Option<&str> {
        match self {
            ReportTarget::Node { node_name } | ReportTarget::DeployedApplication { node_name, .. } => {
                Some(node_name)
            }
            _ => None,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            ReportTarget::Application { .. } => EntityType::Application,
            ReportTarget::Service { .. } => EntityType::Service,
            ReportTarget::StatefulServiceReplica { .. } => EntityType::StatefulServiceReplica,
            ReportTarget::StatelessServiceInstance { .. } => EntityType::StatelessServiceInstance,
            ReportTarget::Partition { .. } => EntityType::Partition,
            ReportTarget::Node { .. } => EntityType::Node,
            ReportTarget::DeployedApplication { .. } => EntityType::DeployedApplication,
        }
    }

    /// Stable identity of the target, used to key reports
    pub fn key(&self) -> String {
        match self {
            ReportTarget::Application { application_name } => format!("app:{}", application_name),
            ReportTarget::Service { service_name } => format!("service:{}", service_name),
            ReportTarget::StatefulServiceReplica {
                partition_id,
                replica_id,
            } => format!("replica:{}/{}", partition_id, replica_id),
            ReportTarget::StatelessServiceInstance {
                partition_id,
                instance_id,
            } => format!("instance:{}/{}", partition_id, instance_id),
            ReportTarget::Partition { partition_id } => format!("partition:{}", partition_id),
            ReportTarget::Node { node_name } => format!("node:{}", node_name),
            ReportTarget::DeployedApplication {
                application_name,
                node_name,
            } => format!("deployed:{}@{}", application_name, node_name),
        }
    }
}

/// Delivery priority requested from the health subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPriority {
    /// Bypasses batching; used for Ok reports so recoveries clear quickly
    Immediate,
    Normal,
}

/// A health report ready to hand to a [`HealthSubmitter`](super::HealthSubmitter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub target: ReportTarget,
    pub state: HealthState,
    pub description: String,
    pub source_id: String,
    pub property: String,
    #[serde(with = "duration_secs")]
    pub time_to_live: Duration,
    pub emit_log_event: bool,
    pub created_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn builder(source_id: impl Into<String>, target: ReportTarget) -> HealthReportBuilder {
        HealthReportBuilder::new(source_id, target)
    }

    pub fn priority(&self) -> ReportPriority {
        if self.state == HealthState::Ok {
            ReportPriority::Immediate
        } else {
            ReportPriority::Normal
        }
    }

    /// Reports sharing this key replace each other in the health subsystem
    pub fn key(&self) -> (String, String, String) {
        (
            self.source_id.clone(),
            self.property.clone(),
            self.target.key(),
        )
    }
}

/// Builder for [`HealthReport`] that fills in defaults
#[derive(Debug, Clone)]
pub struct HealthReportBuilder {
    source_id: String,
    target: ReportTarget,
    state: HealthState,
    description: String,
    property: Option<String>,
    time_to_live: Option<Duration>,
    emit_log_event: bool,
}

impl HealthReportBuilder {
    pub fn new(source_id: impl Into<String>, target: ReportTarget) -> Self {
        Self {
            source_id: source_id.into(),
            target,
            state: HealthState::Unknown,
            description: String::new(),
            property: None,
            time_to_live: None,
            emit_log_event: false,
        }
    }

    pub fn state(mut self, state: HealthState) -> Self {
        self.state = state;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Defaults to `<source_id>HealthReport` when unset or empty
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Defaults to [`DEFAULT_TIME_TO_LIVE`] when unset or zero
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn emit_log_event(mut self, emit: bool) -> Self {
        self.emit_log_event = emit;
        self
    }

    pub fn build(self) -> HealthReport {
        let property = self
            .property
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| format!("{}HealthReport", self.source_id));
        let time_to_live = self
            .time_to_live
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(DEFAULT_TIME_TO_LIVE);

        HealthReport {
            target: self.target,
            state: self.state,
            description: self.description,
            source_id: self.source_id,
            property,
            time_to_live,
            emit_log_event: self.emit_log_event,
            created_at: Utc::now(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let report = HealthReport::builder("NodeObserver", ReportTarget::node("node-1"))
            .state(HealthState::Warning)
            .description("CPU high")
            .build();

        assert_eq!(report.property, "NodeObserverHealthReport");
        assert_eq!(report.time_to_live, DEFAULT_TIME_TO_LIVE);
        assert!(!report.emit_log_event);
        assert_eq!(report.target.entity_type(), EntityType::Node);
    }

    #[test]
    fn test_builder_overrides() {
        let report = HealthReport::builder("ClusterObserver", ReportTarget::node("n"))
            .property("ClusterHealth")
            .time_to_live(Duration::from_secs(30))
            .emit_log_event(true)
            .build();

        assert_eq!(report.property, "ClusterHealth");
        assert_eq!(report.time_to_live, Duration::from_secs(30));
        assert!(report.emit_log_event);
    }

    #[test]
    fn test_priority_follows_state() {
        let ok = HealthReport::builder("m", ReportTarget::node("n"))
            .state(HealthState::Ok)
            .build();
        let error = HealthReport::builder("m", ReportTarget::node("n"))
            .state(HealthState::Error)
            .build();

        assert_eq!(ok.priority(), ReportPriority::Immediate);
        assert_eq!(error.priority(), ReportPriority::Normal);
    }

    #[test]
    fn test_report_serializes_target_variant() {
        let report = HealthReport::builder(
            "AppObserver",
            ReportTarget::DeployedApplication {
                application_name: "fabric:/Voting".to_string(),
                node_name: "node-2".to_string(),
            },
        )
        .state(HealthState::Error)
        .build();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["target"]["entity_type"], "deployed_application");
        assert_eq!(json["target"]["node_name"], "node-2");
        assert_eq!(json["state"], "Error");
        assert_eq!(json["time_to_live"], 300);
    }
}
