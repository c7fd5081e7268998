//! Node status tracking
//!
//! Remembers nodes that are observed in a non-Up status and raises a
//! Warning once a node has stayed that way for longer than the allowed
//! duration. A node seen Up again is forgotten and cleared with a single
//! Ok report.

use super::{HealthReport, HealthState, ReportTarget, DEFAULT_TIME_TO_LIVE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Property used for node status reports
pub const NODE_STATUS_PROPERTY: &str = "NodeStatus";

/// Platform-reported status of a cluster node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Up,
    Down,
    Enabling,
    Disabling,
    Disabled,
    Unknown,
}

impl NodeStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, NodeStatus::Up)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Up => "Up",
            NodeStatus::Down => "Down",
            NodeStatus::Enabling => "Enabling",
            NodeStatus::Disabling => "Disabling",
            NodeStatus::Disabled => "Disabled",
            NodeStatus::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// One node's status as seen in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeObservation {
    pub node_name: String,
    pub status: NodeStatus,
}

impl NodeObservation {
    pub fn new(node_name: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            node_name: node_name.into(),
            status,
        }
    }
}

/// Bookkeeping for a node currently not Up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedNode {
    pub status: NodeStatus,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
}

impl TrackedNode {
    pub fn duration(&self) -> Duration {
        (self.last_observed - self.first_observed)
            .to_std()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NodeStatusTracker {
    source_id: String,
    max_time_not_ok: Duration,
    time_to_live: Duration,
    nodes: BTreeMap<String, TrackedNode>,
}

impl NodeStatusTracker {
    pub fn new(source_id: impl Into<String>, max_time_not_ok: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            max_time_not_ok,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            nodes: BTreeMap::new(),
        }
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    pub fn tracked(&self, node_name: &str) -> Option<&TrackedNode> {
        self.nodes.get(node_name)
    }

    pub fn tracked_count(&self) -> usize {
        self.nodes.len()
    }

    /// Apply one cycle of observations taken at `now`.
    ///
    /// Returns an Ok report for every tracked node seen Up again, followed
    /// by a Warning for every tracked node not Up for at least the allowed
    /// duration. Nodes absent from `observations` keep their timestamps.
    pub fn update(&mut self, observations: &[NodeObservation], now: DateTime<Utc>) -> Vec<HealthReport> {
        let mut reports = Vec::new();

        for observation in observations {
            if observation.status.is_up() {
                if self.nodes.remove(&observation.node_name).is_some() {
                    reports.push(self.report(
                        &observation.node_name,
                        HealthState::Ok,
                        format!("Node {} is now Up", observation.node_name),
                    ));
                }
                continue;
            }

            self.nodes
                .entry(observation.node_name.clone())
                .and_modify(|tracked| {
                    tracked.status = observation.status;
                    tracked.last_observed = now;
                })
                .or_insert(TrackedNode {
                    status: observation.status,
                    first_observed: now,
                    last_observed: now,
                });
        }

        for (name, tracked) in &self.nodes {
            let elapsed = tracked.duration();
            if elapsed >= self.max_time_not_ok {
                reports.push(self.report(
                    name,
                    HealthState::Warning,
                    format!(
                        "Node {} has been {} for {}s, longer than the allowed {}s",
                        name,
                        tracked.status,
                        elapsed.as_secs(),
                        self.max_time_not_ok.as_secs()
                    ),
                ));
            }
        }

        reports
    }

    fn report(&self, node_name: &str, state: HealthState, description: String) -> HealthReport {
        HealthReport::builder(self.source_id.clone(), ReportTarget::node(node_name))
            .state(state)
            .description(description)
            .property(NODE_STATUS_PROPERTY)
            .time_to_live(self.time_to_live)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[test]
    fn test_up_nodes_are_not_tracked() {
        let mut tracker = NodeStatusTracker::new("ClusterObserver", Duration::from_secs(600));
        let reports = tracker.update(&[NodeObservation::new("n1", NodeStatus::Up)], at(0));
        assert!(reports.is_empty());
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn test_new_down_node_starts_tracking() {
        let mut tracker = NodeStatusTracker::new("ClusterObserver", Duration::from_secs(600));
        let reports = tracker.update(&[NodeObservation::new("n1", NodeStatus::Down)], at(0));

        assert!(reports.is_empty());
        let tracked = tracker.tracked("n1").unwrap();
        assert_eq!(tracked.first_observed, at(0));
        assert_eq!(tracked.last_observed, at(0));
    }

    #[test]
    fn test_status_change_keeps_first_observed() {
        let mut tracker = NodeStatusTracker::new("ClusterObserver", Duration::from_secs(600));
        tracker.update(&[NodeObservation::new("n1", NodeStatus::Disabling)], at(0));
        tracker.update(&[NodeObservation::new("n1", NodeStatus::Disabled)], at(3));

        let tracked = tracker.tracked("n1").unwrap();
        assert_eq!(tracked.status, NodeStatus::Disabled);
        assert_eq!(tracked.first_observed, at(0));
        assert_eq!(tracked.last_observed, at(3));
    }

    #[test]
    fn test_absent_node_keeps_timestamps() {
        let mut tracker = NodeStatusTracker::new("ClusterObserver", Duration::from_secs(600));
        tracker.update(&[NodeObservation::new("n1", NodeStatus::Down)], at(0));
        tracker.update(&[], at(20));

        assert_eq!(tracker.tracked("n1").unwrap().last_observed, at(0));
    }

    #[test]
    fn test_zero_limit_warns_immediately() {
        let mut tracker = NodeStatusTracker::new("ClusterObserver", Duration::ZERO);
        let reports = tracker.update(&[NodeObservation::new("n1", NodeStatus::Down)], at(0));

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, HealthState::Warning);
        assert_eq!(reports[0].property, NODE_STATUS_PROPERTY);
    }
}
