//! Health state aggregation with hysteresis
//!
//! [`HealthAggregator`] remembers the last state it acted on for one
//! monitored subject and turns each cycle's evaluation into at most one
//! health report:
//! - Ok after Error (or after Warning when warning details are enabled)
//!   produces a single recovery report
//! - Repeated Ok produces nothing
//! - Warning is dropped entirely when warning details are disabled
//! - Otherwise the unhealthy evaluation details are reported

use super::{HealthReport, HealthState, ReportTarget, DEFAULT_TIME_TO_LIVE};
use crate::error::{ObserverError, ObserverResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Entity-name prefix of platform-internal applications
pub const DEFAULT_SYSTEM_ENTITY_PREFIX: &str = "fabric:/System";

/// Behaviour switches for a [`HealthAggregator`]
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Emit an Ok report when recovering from an unhealthy state
    pub emit_ok_recovery: bool,
    /// Report Warning states and Warning details
    pub emit_warning_details: bool,
    /// Skip Warning details for platform-internal entities
    pub ignore_system_entity_warnings: bool,
    pub system_entity_prefix: String,
    /// Property of emitted reports; derived from the source when unset
    pub property: Option<String>,
    pub time_to_live: Duration,
    pub emit_log_event: bool,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            emit_ok_recovery: true,
            emit_warning_details: true,
            ignore_system_entity_warnings: false,
            system_entity_prefix: DEFAULT_SYSTEM_ENTITY_PREFIX.to_string(),
            property: None,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            emit_log_event: false,
        }
    }
}

/// One entity's contribution to an aggregated health state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDetail {
    pub entity: String,
    pub state: HealthState,
    pub description: String,
}

impl EvaluationDetail {
    pub fn new(entity: impl Into<String>, state: HealthState, description: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            state,
            description: description.into(),
        }
    }
}

/// Why a cycle produced no report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Healthy and nothing to recover from
    AlreadyOk,
    WarningDetailsDisabled,
    NoUnhealthyEvaluations,
    /// Every detail was filtered out
    NothingToReport,
}

/// Outcome of one aggregation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Recovered { previous: HealthState },
    Report { state: HealthState, description: String },
    Suppressed(SuppressReason),
}

/// Per-subject health state machine
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    source_id: String,
    options: AggregatorOptions,
    last_state: HealthState,
}

impl HealthAggregator {
    pub fn new(source_id: impl Into<String>, options: AggregatorOptions) -> Self {
        Self {
            source_id: source_id.into(),
            options,
            last_state: HealthState::Unknown,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// The state recorded by the last cycle that acted
    pub fn last_state(&self) -> HealthState {
        self.last_state
    }

    fn is_recovery_from(&self, previous: HealthState) -> bool {
        match previous {
            HealthState::Error => true,
            HealthState::Warning => self.options.emit_warning_details,
            _ => false,
        }
    }

    fn is_system_entity(&self, entity: &str) -> bool {
        !self.options.system_entity_prefix.is_empty()
            && entity.starts_with(&self.options.system_entity_prefix)
    }

    /// Run one cycle of the state machine.
    ///
    /// Cancellation is checked before and while walking the details; a
    /// cancelled cycle leaves the recorded state untouched.
    pub fn evaluate(
        &mut self,
        current: HealthState,
        details: &[EvaluationDetail],
        cancel: &CancellationToken,
    ) -> ObserverResult<Decision> {
        if cancel.is_cancelled() {
            return Err(ObserverError::Cancelled);
        }

        if current == HealthState::Ok {
            let previous = self.last_state;
            self.last_state = HealthState::Ok;

            if self.options.emit_ok_recovery && self.is_recovery_from(previous) {
                return Ok(Decision::Recovered { previous });
            }
            return Ok(Decision::Suppressed(SuppressReason::AlreadyOk));
        }

        if current == HealthState::Warning && !self.options.emit_warning_details {
            return Ok(Decision::Suppressed(SuppressReason::WarningDetailsDisabled));
        }

        if details.is_empty() {
            return Ok(Decision::Suppressed(SuppressReason::NoUnhealthyEvaluations));
        }

        let mut lines = Vec::new();
        for detail in details {
            if cancel.is_cancelled() {
                return Err(ObserverError::Cancelled);
            }

            match detail.state {
                HealthState::Ok => continue,
                HealthState::Warning if !self.options.emit_warning_details => continue,
                HealthState::Warning
                    if self.options.ignore_system_entity_warnings
                        && self.is_system_entity(&detail.entity) =>
                {
                    continue
                }
                _ => {}
            }

            lines.push(format!(
                "{}: {} - {}",
                detail.entity, detail.state, detail.description
            ));
        }

        self.last_state = current;

        if lines.is_empty() {
            return Ok(Decision::Suppressed(SuppressReason::NothingToReport));
        }

        Ok(Decision::Report {
            state: current,
            description: lines.join("\n"),
        })
    }

    /// Run one cycle and package its outcome as a report for `target`
    pub fn cycle(
        &mut self,
        current: HealthState,
        details: &[EvaluationDetail],
        target: ReportTarget,
        cancel: &CancellationToken,
    ) -> ObserverResult<(Decision, Option<HealthReport>)> {
        let decision = self.evaluate(current, details, cancel)?;
        let report = self.build_report(&decision, target);
        Ok((decision, report))
    }

    /// Report for a decision, if it calls for one
    pub fn build_report(&self, decision: &Decision, target: ReportTarget) -> Option<HealthReport> {
        let (state, description) = match decision {
            Decision::Recovered { previous } => (
                HealthState::Ok,
                format!(
                    "{} has recovered from its previous {} state",
                    target.key(),
                    previous
                ),
            ),
            Decision::Report { state, description } => (*state, description.clone()),
            Decision::Suppressed(_) => return None,
        };

        let mut builder = HealthReport::builder(self.source_id.clone(), target)
            .state(state)
            .description(description)
            .time_to_live(self.options.time_to_live)
            .emit_log_event(self.options.emit_log_event);
        if let Some(property) = &self.options.property {
            builder = builder.property(property.clone());
        }
        Some(builder.build())
    }
}
