//! Health report submission
//!
//! The platform health subsystem is reached through [`HealthSubmitter`].
//! Implementations provided here:
//! - [`LogSubmitter`] writes reports as structured log records
//! - [`HttpHealthSubmitter`] posts reports as JSON to an ingestion endpoint
//! - [`InMemorySubmitter`] keeps the latest report per key

use super::{HealthReport, ReportPriority};
use crate::error::{ObserverError, ObserverResult, PlatformErrorKind};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sink for health reports
#[async_trait]
pub trait HealthSubmitter: Send + Sync {
    /// Submit a report; a newer report with the same key replaces the
    /// previous one
    async fn submit(&self, report: &HealthReport) -> ObserverResult<()>;
}

/// Submitter that only logs reports
#[derive(Debug, Clone)]
pub struct LogSubmitter {
    node_name: String,
}

impl LogSubmitter {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }
}

#[async_trait]
impl HealthSubmitter for LogSubmitter {
    async fn submit(&self, report: &HealthReport) -> ObserverResult<()> {
        if report.state.is_unhealthy() {
            warn!(
                event = "health_report",
                node = %self.node_name,
                source = %report.source_id,
                property = %report.property,
                target = %report.target.key(),
                state = %report.state,
                ttl_secs = report.time_to_live.as_secs(),
                description = %report.description,
                "Health report"
            );
        } else {
            info!(
                event = "health_report",
                node = %self.node_name,
                source = %report.source_id,
                property = %report.property,
                target = %report.target.key(),
                state = %report.state,
                ttl_secs = report.time_to_live.as_secs(),
                description = %report.description,
                "Health report"
            );
        }
        Ok(())
    }
}

/// Wire body sent by [`HttpHealthSubmitter`]
#[derive(Serialize)]
struct SubmissionPayload<'a> {
    #[serde(flatten)]
    report: &'a HealthReport,
    priority: ReportPriority,
}

/// Submitter that posts JSON reports to an HTTP ingestion endpoint
#[derive(Debug, Clone)]
pub struct HttpHealthSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpHealthSubmitter {
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

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl HealthSubmitter for HttpHealthSubmitter {
    async fn submit(&self, report: &HealthReport) -> ObserverResult<()> {
        let payload = SubmissionPayload {
            report,
            priority: report.priority(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(
                endpoint = %self.endpoint,
                target = %report.target.key(),
                state = %report.state,
                "Health report accepted"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ObserverError::platform(
            classify_status(status),
            format!("health endpoint returned {}: {}", status, body),
        ))
    }
}

/// Map an HTTP status to the platform error classification
pub fn classify_status(status: StatusCode) -> PlatformErrorKind {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformErrorKind::Timeout,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            PlatformErrorKind::Unavailable
        }
        StatusCode::TOO_MANY_REQUESTS => PlatformErrorKind::Busy,
        StatusCode::CONFLICT => PlatformErrorKind::StaleReport,
        StatusCode::NOT_FOUND => PlatformErrorKind::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformErrorKind::InvalidArgument
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformErrorKind::Unauthorized,
        _ => PlatformErrorKind::Other,
    }
}

pub(crate) fn classify_transport_error(err: reqwest::Error) -> ObserverError {
    let kind = if err.is_timeout() {
        PlatformErrorKind::Timeout
    } else if err.is_connect() {
        PlatformErrorKind::Unavailable
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else {
        PlatformErrorKind::Other
    };
    ObserverError::platform(kind, err.to_string())
}

/// Submitter that keeps reports in memory
#[derive(Debug, Default)]
pub struct InMemorySubmitter {
    latest: DashMap<(String, String, String), HealthReport>,
    history: Mutex<Vec<HealthReport>>,
}

impl InMemorySubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every report submitted so far, oldest first
    pub fn history(&self) -> Vec<HealthReport> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Current report for each (source, property, target) key
    pub fn latest(&self) -> Vec<HealthReport> {
        self.latest.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn latest_for(&self, source_id: &str, property: &str, target_key: &str) -> Option<HealthReport> {
        self.latest
            .get(&(
                source_id.to_string(),
                property.to_string(),
                target_key.to_string(),
            ))
            .map(|entry| entry.value().clone())
    }

    pub fn submitted_count(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HealthSubmitter for InMemorySubmitter {
    async fn submit(&self, report: &HealthReport) -> ObserverResult<()> {
        self.latest.insert(report.key(), report.clone());
        if let Ok(mut history) = self.history.lock() {
            history.push(report.clone());
        }
        Ok(())
    }
}
