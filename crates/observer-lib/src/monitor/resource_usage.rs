//! Resource usage monitor
//!
//! Samples each configured (metric, entity) pair into a data series for
//! the monitor duration, then compares the series average against the
//! configured Warning and Error limits.

use super::{Monitor, MonitorContext};
use crate::config::{self, ConfigProvider, MonitorSettings};
use crate::data::ResourceUsageDataSeries;
use crate::error::{ObserverError, ObserverResult};
use crate::health::{EvaluationDetail, HealthAggregator, HealthState, ReportTarget};
use crate::provider::{Metric, SampleProvider, NODE_ENTITY};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One metric of one entity, with its limits
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTarget {
    pub metric: Metric,
    pub entity_id: String,
    /// Entity the reports are filed against
    pub target: ReportTarget,
    pub warning_limit: Option<f64>,
    pub error_limit: Option<f64>,
}

impl MetricTarget {
    pub fn new(metric: Metric, entity_id: impl Into<String>, target: ReportTarget) -> Self {
        Self {
            metric,
            entity_id: entity_id.into(),
            target,
            warning_limit: None,
            error_limit: None,
        }
    }

    pub fn warning_limit(mut self, limit: f64) -> Self {
        self.warning_limit = Some(limit);
        self
    }

    pub fn error_limit(mut self, limit: f64) -> Self {
        self.error_limit = Some(limit);
        self
    }

    /// Read the limits of `metric` from `section`; `None` when neither is set
    pub fn from_config(
        provider: &dyn ConfigProvider,
        section: &str,
        metric: Metric,
        entity_id: &str,
        target: ReportTarget,
    ) -> ObserverResult<Option<Self>> {
        let warning_limit = config::threshold(provider, section, metric.warning_limit_key())?;
        let error_limit = config::threshold(provider, section, metric.error_limit_key())?;

        if warning_limit.is_none() && error_limit.is_none() {
            return Ok(None);
        }

        Ok(Some(Self {
            metric,
            entity_id: entity_id.to_string(),
            target,
            warning_limit,
            error_limit,
        }))
    }

    /// Report property; process entities get their id appended so their
    /// reports do not replace the node's
    fn property(&self) -> String {
        if self.entity_id == NODE_ENTITY {
            self.metric.property().to_string()
        } else {
            format!("{} ({})", self.metric.property(), self.entity_id)
        }
    }

    /// State of `series` against the limits; Error wins over Warning
    fn evaluate(&self, series: &ResourceUsageDataSeries<f64>) -> HealthState {
        if self.error_limit.is_some_and(|limit| series.is_unhealthy(limit)) {
            HealthState::Error
        } else if self.warning_limit.is_some_and(|limit| series.is_unhealthy(limit)) {
            HealthState::Warning
        } else {
            HealthState::Ok
        }
    }
}

struct TrackedSeries {
    target: MetricTarget,
    series: ResourceUsageDataSeries<f64>,
    aggregator: HealthAggregator,
}

pub struct ResourceUsageMonitor {
    name: String,
    settings: MonitorSettings,
    ctx: MonitorContext,
    provider: Arc<dyn SampleProvider>,
    tracked: Vec<TrackedSeries>,
    sample_interval: Duration,
}

impl ResourceUsageMonitor {
    pub fn new(
        name: impl Into<String>,
        settings: MonitorSettings,
        ctx: MonitorContext,
        provider: Arc<dyn SampleProvider>,
        targets: Vec<MetricTarget>,
    ) -> ObserverResult<Self> {
        let name = name.into();
        let ctx = ctx.with_telemetry(settings.enable_telemetry);
        let mut tracked = Vec::with_capacity(targets.len());

        for target in targets {
            let property = target.property();
            let series = ResourceUsageDataSeries::new(
                property.clone(),
                target.entity_id.clone(),
                settings.data_capacity,
                settings.use_circular_buffer,
            )?;
            let aggregator =
                HealthAggregator::new(name.clone(), settings.aggregator_options(Some(property)));

            tracked.push(TrackedSeries {
                target,
                series,
                aggregator,
            });
        }

        Ok(Self {
            name,
            settings,
            ctx,
            provider,
            tracked,
            sample_interval: Duration::from_secs(1),
        })
    }

    /// Build a monitor for `entities` from the limits configured in `section`
    pub fn from_config(
        name: &str,
        provider: &dyn ConfigProvider,
        ctx: MonitorContext,
        sample_provider: Arc<dyn SampleProvider>,
        entities: &[(String, ReportTarget)],
    ) -> ObserverResult<Self> {
        let settings = MonitorSettings::load(provider, name)?;

        let mut targets = Vec::new();
        for (entity_id, target) in entities {
            for metric in Metric::ALL {
                if let Some(t) =
                    MetricTarget::from_config(provider, name, metric, entity_id, target.clone())?
                {
                    targets.push(t);
                }
            }
        }

        Self::new(name, settings, ctx, sample_provider, targets)
    }

    /// Pause between sampling rounds within the monitor duration
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn targets(&self) -> impl Iterator<Item = &MetricTarget> {
        self.tracked.iter().map(|t| &t.target)
    }

    /// Series for a (property, entity) pair
    pub fn series(&self, property: &str, entity_id: &str) -> Option<&ResourceUsageDataSeries<f64>> {
        self.tracked
            .iter()
            .map(|t| &t.series)
            .find(|s| s.property() == property && s.id() == entity_id)
    }

    async fn sample_round(&mut self, cancel: &CancellationToken) -> ObserverResult<()> {
        for tracked in &mut self.tracked {
            if cancel.is_cancelled() {
                return Err(ObserverError::Cancelled);
            }

            let metric = tracked.target.metric;
            match self
                .provider
                .current_value(metric, &tracked.target.entity_id)
                .await
            {
                Ok(value) => {
                    tracked.series.add_data(value);
                    self.ctx.record_sample(metric.property());
                }
                Err(e) => {
                    warn!(
                        monitor = %self.name,
                        metric = %metric,
                        entity = %tracked.target.entity_id,
                        error = %e,
                        "Failed to sample resource usage"
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Monitor for ResourceUsageMonitor {
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
        for tracked in &mut self.tracked {
            tracked.series.clear_data();
        }

        let deadline = Instant::now() + self.settings.monitor_duration;
        loop {
            self.sample_round(cancel).await?;

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let pause = self.sample_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ObserverError::Cancelled.into()),
                _ = tokio::time::sleep(pause) => {}
            }
        }

        debug!(
            monitor = %self.name,
            series = self.tracked.len(),
            "Observation complete"
        );
        Ok(())
    }

    async fn report(&mut self, cancel: &CancellationToken) -> Result<()> {
        for tracked in &mut self.tracked {
            if cancel.is_cancelled() {
                return Err(ObserverError::Cancelled.into());
            }
            if tracked.series.data().is_empty() {
                continue;
            }

            let average = tracked.series.average_data_value();
            self.ctx
                .record_average(tracked.series.property(), tracked.series.id(), average);

            let state = tracked.target.evaluate(&tracked.series);
            let details = match state {
                HealthState::Error | HealthState::Warning => {
                    let limit = if state == HealthState::Error {
                        tracked.target.error_limit
                    } else {
                        tracked.target.warning_limit
                    };
                    let units = tracked.series.units();
                    vec![EvaluationDetail::new(
                        tracked.series.id(),
                        state,
                        format!(
                            "{} average {}{} reached the {} limit {}{} (max {}{}, std dev {:.1})",
                            tracked.series.property(),
                            average,
                            units,
                            state,
                            limit.unwrap_or_default(),
                            units,
                            tracked.series.max_data_value(),
                            units,
                            tracked.series.standard_deviation()
                        ),
                    )]
                }
                _ => Vec::new(),
            };

            let (_, report) =
                tracked
                    .aggregator
                    .cycle(state, &details, tracked.target.target.clone(), cancel)?;

            if state.is_unhealthy() {
                tracked.series.set_active_error_or_warning(true);
                tracked
                    .series
                    .set_active_error_or_warning_code(state.to_string());
            } else {
                tracked.series.set_active_error_or_warning(false);
                tracked.series.set_active_error_or_warning_code("");
            }

            let Some(report) = report else {
                continue;
            };

            match self.ctx.submit(&self.name, &report, cancel).await {
                Ok(()) => {}
                Err(ObserverError::Cancelled) => return Err(ObserverError::Cancelled.into()),
                Err(e) => {
                    warn!(
                        monitor = %self.name,
                        property = %report.property,
                        target = %report.target.key(),
                        error = %e,
                        "Failed to submit health report"
                    );
                }
            }
        }
        Ok(())
    }
}
