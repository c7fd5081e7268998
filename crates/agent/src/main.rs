//! Node observer agent
//!
//! Runs on every node, sampling local resource usage and cluster health
//! on a fixed loop and submitting health reports for what it sees.

use anyhow::{Context, Result};
use observer_lib::{
    health::{HealthSubmitter, HttpHealthSubmitter, LogSubmitter, ReportTarget},
    monitor::{ClusterHealthMonitor, HttpClusterHealthSource, ResourceUsageMonitor},
    provider::{ProcfsSampleProvider, NODE_ENTITY},
    AgentMetrics, ManagerConfig, Monitor, MonitorContext, MonitorSettings, ObserverManager,
    StatusRegistry, StructuredLogger,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

use config::{AgentConfig, LayeredConfig};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const NODE_MONITOR: &str = "NodeObserver";
const CLUSTER_MONITOR: &str = "ClusterObserver";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting node-observer");

    // Load configuration
    let layered = LayeredConfig::load()?;
    let config = AgentConfig::from_layered(&layered)?;
    info!(node_name = %config.node_name, "Agent configured");

    let submitter: Arc<dyn HealthSubmitter> = match &config.health_endpoint {
        Some(endpoint) => Arc::new(
            HttpHealthSubmitter::new(endpoint.clone(), config.request_timeout())
                .context("Failed to create health submitter")?,
        ),
        None => {
            info!("No health endpoint configured, reports will only be logged");
            Arc::new(LogSubmitter::new(config.node_name.clone()))
        }
    };

    // Monitors record submission outcomes into the same registry the API serves
    let status = StatusRegistry::new();
    let metrics = AgentMetrics::new();
    let ctx = MonitorContext::new(config.node_name.clone(), submitter).with_status(status.clone());

    let monitors = build_monitors(&config, &layered, &ctx)?;

    let logger = StructuredLogger::new(&config.node_name);
    let manager_config = ManagerConfig {
        loop_interval: config.loop_interval(),
        execution_timeout: config.execution_timeout(),
    };
    let manager = ObserverManager::new(monitors, manager_config, status.clone(), logger.clone());
    logger.log_startup(AGENT_VERSION, &manager.monitor_names());

    // Start status and metrics server
    let app_state = Arc::new(api::AppState::new(status.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let cancel = CancellationToken::new();
    let mut loop_handle = tokio::spawn(manager.run(cancel.clone()));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");

            // Let an in-flight submission finish before cancelling
            tokio::time::sleep(config.shutdown_grace_period()).await;
            cancel.cancel();

            if let Err(e) = loop_handle.await {
                error!(error = %e, "Run-loop task failed");
            }
        }
        result = &mut loop_handle => {
            status.set_running(false).await;
            if let Err(e) = result {
                error!(error = %e, "Run-loop task failed");
            }
        }
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

/// The node resource monitor always runs; the cluster monitor needs an endpoint
fn build_monitors(
    config: &AgentConfig,
    layered: &LayeredConfig,
    ctx: &MonitorContext,
) -> Result<Vec<Box<dyn Monitor>>> {
    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();

    let node_target = ReportTarget::node(config.node_name.clone());
    let mut entities = vec![(NODE_ENTITY.to_string(), node_target.clone())];
    entities.extend(
        config
            .monitored_processes
            .iter()
            .map(|pid| (pid.clone(), node_target.clone())),
    );

    let node_monitor = ResourceUsageMonitor::from_config(
        NODE_MONITOR,
        layered,
        ctx.clone(),
        Arc::new(ProcfsSampleProvider::new()),
        &entities,
    )
    .with_context(|| format!("Invalid [{}] configuration", NODE_MONITOR))?;
    monitors.push(Box::new(node_monitor));

    if let Some(endpoint) = &config.cluster_health_endpoint {
        let settings = MonitorSettings::load(layered, CLUSTER_MONITOR)
            .with_context(|| format!("Invalid [{}] configuration", CLUSTER_MONITOR))?;
        let source = HttpClusterHealthSource::new(endpoint.clone(), config.request_timeout())
            .context("Failed to create cluster health source")?;
        monitors.push(Box::new(ClusterHealthMonitor::new(
            CLUSTER_MONITOR,
            settings,
            ctx.clone(),
            Arc::new(source),
        )));
    }

    Ok(monitors)
}
