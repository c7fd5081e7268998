//! Agent configuration
//!
//! Settings come from an optional TOML file (path in `OBSERVER_CONFIG`,
//! default `observer.toml`) overlaid with `OBSERVER__*` environment
//! variables, `__` separating section and key. The `[Agent]` section
//! configures the process itself; every other section belongs to a
//! monitor and is read through [`ConfigProvider`].

use anyhow::{Context, Result};
use observer_lib::ConfigProvider;
use serde::Deserialize;
use std::time::Duration;

const CONFIG_PATH_VAR: &str = "OBSERVER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "observer.toml";
const ENV_PREFIX: &str = "OBSERVER";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name, from the downward API when running in a cluster
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Sleep between run-loop iterations in seconds
    #[serde(default = "default_loop_interval")]
    pub loop_interval_secs: u64,

    /// Longest a monitor run may take before it is marked hung
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Wait between the shutdown signal and cancelling monitors
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period_secs: u64,

    /// Timeout of each outbound HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Health report ingestion endpoint; reports are only logged when unset
    #[serde(default)]
    pub health_endpoint: Option<String>,

    /// Cluster health endpoint; the cluster monitor runs only when set
    #[serde(default)]
    pub cluster_health_endpoint: Option<String>,

    /// Process ids (or `self`) to sample alongside the node
    #[serde(default)]
    pub monitored_processes: Vec<String>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_loop_interval() -> u64 {
    30
}

fn default_execution_timeout() -> u64 {
    600
}

fn default_shutdown_grace_period() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            loop_interval_secs: default_loop_interval(),
            execution_timeout_secs: default_execution_timeout(),
            shutdown_grace_period_secs: default_shutdown_grace_period(),
            request_timeout_secs: default_request_timeout(),
            health_endpoint: None,
            cluster_health_endpoint: None,
            monitored_processes: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Read the `[Agent]` section; a missing section yields the defaults
    pub fn from_layered(layered: &LayeredConfig) -> Result<Self> {
        for key in ["Agent", "agent"] {
            match layered.inner.get::<AgentConfig>(key) {
                Ok(agent) => return Ok(agent),
                Err(config::ConfigError::NotFound(_)) => continue,
                Err(e) => return Err(e).context("Invalid [Agent] configuration"),
            }
        }
        Ok(AgentConfig::default())
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// File and environment configuration exposed as a [`ConfigProvider`]
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    inner: config::Config,
}

impl LayeredConfig {
    /// Load from the file named by `OBSERVER_CONFIG` and the environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let inner = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        Ok(Self { inner })
    }
}

impl ConfigProvider for LayeredConfig {
    fn get_value(&self, section: &str, key: &str, default: &str) -> String {
        // Environment keys arrive lowercased
        let exact = format!("{}.{}", section, key);
        self.inner
            .get_string(&exact)
            .or_else(|_| self.inner.get_string(&exact.to_lowercase()))
            .unwrap_or_else(|_| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let layered = LayeredConfig::from_file("/nonexistent/observer.toml").unwrap();
        let agent = AgentConfig::from_layered(&layered).unwrap();

        assert_eq!(agent.api_port, 8080);
        assert_eq!(agent.loop_interval(), Duration::from_secs(30));
        assert!(agent.health_endpoint.is_none());
        assert_eq!(layered.get_value("NodeObserver", "Enabled", "true"), "true");
    }

    #[test]
    fn test_file_sections() {
        let file = write_config(
            r#"
[Agent]
api_port = 9100
execution_timeout_secs = 120
cluster_health_endpoint = "http://localhost:19080/health"
monitored_processes = ["self"]

[NodeObserver]
CpuErrorLimitPercent = 90
UseCircularBuffer = true
RunInterval = "00:05:00"
"#,
        );

        let layered = LayeredConfig::from_file(file.path().to_str().unwrap()).unwrap();
        let agent = AgentConfig::from_layered(&layered).unwrap();

        assert_eq!(agent.api_port, 9100);
        assert_eq!(agent.execution_timeout(), Duration::from_secs(120));
        assert_eq!(
            agent.cluster_health_endpoint.as_deref(),
            Some("http://localhost:19080/health")
        );
        assert_eq!(agent.monitored_processes, vec!["self".to_string()]);
        assert_eq!(agent.shutdown_grace_period(), Duration::from_secs(5));

        assert_eq!(
            layered.get_value("NodeObserver", "CpuErrorLimitPercent", ""),
            "90"
        );
        assert_eq!(
            layered.get_value("NodeObserver", "UseCircularBuffer", "false"),
            "true"
        );
        assert_eq!(
            layered.get_value("NodeObserver", "RunInterval", ""),
            "00:05:00"
        );
        assert_eq!(layered.get_value("NodeObserver", "Missing", "x"), "x");
    }

    #[test]
    fn test_invalid_agent_section_fails() {
        let file = write_config("[Agent]\napi_port = \"not a port\"\n");
        let layered = LayeredConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert!(AgentConfig::from_layered(&layered).is_err());
    }
}
