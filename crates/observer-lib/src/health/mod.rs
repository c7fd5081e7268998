//! Health reporting
//!
//! Reports, the submission boundary to the platform health subsystem,
//! the per-subject aggregation state machine and node status tracking.

mod aggregator;
mod node_status;
mod report;
mod submitter;


pub use aggregator::{
    AggregatorOptions, Decision, EvaluationDetail, HealthAggregator, SuppressReason,
    DEFAULT_SYSTEM_ENTITY_PREFIX,
};
pub use node_status::{
    NodeObservation, NodeStatus, NodeStatusTracker, TrackedNode, NODE_STATUS_PROPERTY,
};
pub use report::{
    EntityType, HealthReport, HealthReportBuilder, HealthState, ReportPriority, ReportTarget,
    DEFAULT_TIME_TO_LIVE,
};
pub use submitter::{
    classify_status, HealthSubmitter, HttpHealthSubmitter, InMemorySubmitter, LogSubmitter,
};
pub(crate) use submitter::classify_transport_error;
