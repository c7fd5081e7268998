//! Node observer library
//!
//! This crate provides the core functionality for:
//! - Resource usage data series over a fixed-capacity ring buffer
//! - Health state aggregation and report submission
//! - Monitors for node resources and cluster health
//! - A sequential, timeout-guarded monitor run-loop
//! - Agent self-status and observability

pub mod config;
pub mod data;
pub mod error;
pub mod health;
pub mod monitor;
pub mod observability;
pub mod provider;
pub mod retry;
pub mod runner;
pub mod status;

pub use config::{ConfigOption, ConfigProvider, MapConfigProvider, MonitorSettings};
pub use data::{ResourceUsageDataSeries, RingBuffer};
pub use error::{ObserverError, ObserverResult, PlatformErrorKind};
pub use health::{HealthAggregator, HealthReport, HealthState, HealthSubmitter, ReportTarget};
pub use monitor::{Monitor, MonitorContext};
pub use observability::{AgentMetrics, StructuredLogger};
pub use runner::{ManagerConfig, ObserverManager, RunOutcome};
pub use status::{
    ComponentStatus, MonitorRecord, ReadinessResponse, StatusRegistry, StatusReport,
    SubmitterRecord,
};
