//! Monitor run-loop
//!
//! Runs a fixed, ordered list of monitors one at a time. Each run is
//! bounded by an execution timeout; a monitor that exceeds it is marked
//! hung and never runs again for the life of the process.

use crate::error::ObserverError;
use crate::monitor::Monitor;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::status::StatusRegistry;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the run-loop
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Sleep between loop iterations (default: 30 seconds)
    pub loop_interval: Duration,
    /// Longest a single monitor run may take (default: 10 minutes)
    pub execution_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(600),
        }
    }
}

/// How a single monitor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Failed,
    Hung,
    Cancelled,
    /// Disabled, hung earlier, or its run interval has not elapsed
    Skipped,
}

struct ManagedMonitor {
    monitor: Box<dyn Monitor>,
    last_run: Option<Instant>,
    hung: bool,
}

impl ManagedMonitor {
    fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.duration_since(last) >= self.monitor.run_interval(),
        }
    }
}

/// Sequential monitor run-loop
pub struct ObserverManager {
    monitors: Vec<ManagedMonitor>,
    config: ManagerConfig,
    status: StatusRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl ObserverManager {
    pub fn new(
        monitors: Vec<Box<dyn Monitor>>,
        config: ManagerConfig,
        status: StatusRegistry,
        logger: StructuredLogger,
    ) -> Self {
        let monitors = monitors
            .into_iter()
            .map(|monitor| ManagedMonitor {
                monitor,
                last_run: None,
                hung: false,
            })
            .collect();

        Self {
            monitors,
            config,
            status,
            metrics: AgentMetrics::new(),
            logger,
        }
    }

    pub fn monitor_names(&self) -> Vec<String> {
        self.monitors
            .iter()
            .map(|m| m.monitor.name().to_string())
            .collect()
    }

    /// Names of monitors disabled after hanging
    pub fn hung_monitors(&self) -> Vec<String> {
        self.monitors
            .iter()
            .filter(|m| m.hung)
            .map(|m| m.monitor.name().to_string())
            .collect()
    }

    /// Register every enabled monitor with the status registry
    pub async fn register(&self) {
        for managed in &self.monitors {
            if managed.monitor.is_enabled() {
                self.status.register_monitor(managed.monitor.name()).await;
            }
        }
    }

    /// Run monitors until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        self.register().await;
        self.status.set_running(true).await;

        info!(
            monitors = self.monitors.len(),
            loop_interval_secs = self.config.loop_interval.as_secs(),
            execution_timeout_secs = self.config.execution_timeout.as_secs(),
            "Starting monitor run-loop"
        );

        loop {
            self.run_iteration(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutting down monitor run-loop");
                    break;
                }
                _ = tokio::time::sleep(self.config.loop_interval) => {}
            }
        }

        self.status.set_running(false).await;
    }

    /// One pass over the monitor list; returns each monitor's outcome in order
    pub async fn run_iteration(&mut self, cancel: &CancellationToken) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(self.monitors.len());

        for index in 0..self.monitors.len() {
            if cancel.is_cancelled() {
                outcomes.push(RunOutcome::Cancelled);
                continue;
            }
            let outcome = self.run_monitor(index, cancel).await;
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_monitor(&mut self, index: usize, cancel: &CancellationToken) -> RunOutcome {
        let timeout = self.config.execution_timeout;
        let managed = &mut self.monitors[index];

        if managed.hung || !managed.monitor.is_enabled() || !managed.is_due(Instant::now()) {
            return RunOutcome::Skipped;
        }

        let name = managed.monitor.name().to_string();
        let start = Instant::now();
        managed.last_run = Some(start);

        let monitor = &mut managed.monitor;
        let result = tokio::time::timeout(timeout, async {
            monitor.observe(cancel).await?;
            monitor.report(cancel).await
        })
        .await;

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_latency(&name, elapsed);

        let (outcome, message) = match result {
            Err(_) => {
                managed.hung = true;
                self.metrics.inc_hung_monitors();
                self.logger.log_monitor_hung(&name, timeout);
                (
                    RunOutcome::Hung,
                    Some(format!(
                        "Exceeded execution timeout of {}s",
                        timeout.as_secs()
                    )),
                )
            }
            Ok(Err(e)) if ObserverError::is_cancellation(&e) => {
                debug!(monitor = %name, "Monitor run cancelled");
                (RunOutcome::Cancelled, None)
            }
            Ok(Err(e)) => {
                self.metrics.inc_monitor_failures(&name);
                self.logger.log_monitor_failed(&name, &e);
                (RunOutcome::Failed, Some(format!("{:#}", e)))
            }
            Ok(Ok(())) => {
                debug!(
                    monitor = %name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Monitor run complete"
                );
                (RunOutcome::Completed, None)
            }
        };

        self.status.record_run(&name, outcome, elapsed, message).await;
        outcome
    }
}
