//! Monitor configuration
//!
//! Monitors read their settings through [`ConfigProvider`], a flat
//! `(section, key) -> string` lookup. [`MonitorSettings`] parses the
//! recognised keys into typed values with defaults.

use crate::error::{ObserverError, ObserverResult};
use crate::health::{AggregatorOptions, DEFAULT_SYSTEM_ENTITY_PREFIX, DEFAULT_TIME_TO_LIVE};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// String-valued configuration lookup
pub trait ConfigProvider: Send + Sync {
    /// Value of `key` in `section`, or `default` when absent
    fn get_value(&self, section: &str, key: &str, default: &str) -> String;
}

/// Recognised monitor setting keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigOption {
    Enabled,
    EnableTelemetry,
    EnableEtw,
    ResourceUsageDataCapacity,
    UseCircularBuffer,
    RunInterval,
    MonitorDuration,
    EmitHealthWarningEvaluation,
    EmitOkHealthState,
    IgnoreSystemAppWarnings,
    MaxTimeNodeStatusNotOk,
    HealthReportTimeToLive,
    EmitUnknownOnFailure,
    SystemEntityPrefix,
}

impl ConfigOption {
    pub fn key(&self) -> &'static str {
        match self {
            ConfigOption::Enabled => "Enabled",
            ConfigOption::EnableTelemetry => "EnableTelemetry",
            ConfigOption::EnableEtw => "EnableEtw",
            ConfigOption::ResourceUsageDataCapacity => "ResourceUsageDataCapacity",
            ConfigOption::UseCircularBuffer => "UseCircularBuffer",
            ConfigOption::RunInterval => "RunInterval",
            ConfigOption::MonitorDuration => "MonitorDuration",
            ConfigOption::EmitHealthWarningEvaluation => "EmitHealthWarningEvaluation",
            ConfigOption::EmitOkHealthState => "EmitOkHealthState",
            ConfigOption::IgnoreSystemAppWarnings => "IgnoreSystemAppWarnings",
            ConfigOption::MaxTimeNodeStatusNotOk => "MaxTimeNodeStatusNotOk",
            ConfigOption::HealthReportTimeToLive => "HealthReportTimeToLive",
            ConfigOption::EmitUnknownOnFailure => "EmitUnknownOnFailure",
            ConfigOption::SystemEntityPrefix => "SystemEntityPrefix",
        }
    }
}

impl std::fmt::Display for ConfigOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// In-memory provider keyed by `(section, key)`
#[derive(Debug, Clone, Default)]
pub struct MapConfigProvider {
    values: HashMap<(String, String), String>,
}

impl MapConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.set(section, key, value);
        self
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.values
            .insert((section.to_string(), key.to_string()), value.into());
    }
}

impl ConfigProvider for MapConfigProvider {
    fn get_value(&self, section: &str, key: &str, default: &str) -> String {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Parse a duration written as `HH:MM:SS` or as whole seconds
pub fn parse_duration(value: &str) -> ObserverResult<Duration> {
    let value = value.trim();
    let invalid = || ObserverError::Config(format!("invalid duration '{}'", value));

    if !value.contains(':') {
        return value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| invalid());
    }

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let mut fields = [0u64; 3];
    for (field, part) in fields.iter_mut().zip(&parts) {
        *field = part.trim().parse().map_err(|_| invalid())?;
    }
    let [hours, minutes, seconds] = fields;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

fn raw(provider: &dyn ConfigProvider, section: &str, key: &str) -> Option<String> {
    let value = provider.get_value(section, key, "");
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_value<T: FromStr>(
    provider: &dyn ConfigProvider,
    section: &str,
    key: &str,
) -> ObserverResult<Option<T>> {
    match raw(provider, section, key) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            ObserverError::Config(format!("[{}] {} has invalid value '{}'", section, key, value))
        }),
    }
}

fn parse_bool(provider: &dyn ConfigProvider, section: &str, key: &str) -> ObserverResult<Option<bool>> {
    match raw(provider, section, key) {
        None => Ok(None),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(ObserverError::Config(format!(
                "[{}] {} has invalid boolean '{}'",
                section, key, value
            ))),
        },
    }
}

fn parse_duration_key(
    provider: &dyn ConfigProvider,
    section: &str,
    key: &str,
) -> ObserverResult<Option<Duration>> {
    raw(provider, section, key)
        .map(|value| {
            parse_duration(&value)
                .map_err(|e| ObserverError::Config(format!("[{}] {}: {}", section, key, e)))
        })
        .transpose()
}

/// Numeric threshold under `key`; absent means the check is disabled
pub fn threshold(provider: &dyn ConfigProvider, section: &str, key: &str) -> ObserverResult<Option<f64>> {
    parse_value(provider, section, key)
}

/// Typed settings shared by every monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub enabled: bool,
    /// Update this monitor's Prometheus series
    pub enable_telemetry: bool,
    pub enable_etw: bool,
    pub data_capacity: usize,
    pub use_circular_buffer: bool,
    /// Minimum time between runs; zero runs every loop iteration
    pub run_interval: Duration,
    /// How long `observe` keeps sampling
    pub monitor_duration: Duration,
    pub emit_warning_details: bool,
    pub emit_ok_state: bool,
    pub ignore_system_app_warnings: bool,
    pub max_time_node_status_not_ok: Duration,
    pub report_time_to_live: Duration,
    pub emit_unknown_on_failure: bool,
    pub system_entity_prefix: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_telemetry: true,
            enable_etw: false,
            data_capacity: 30,
            use_circular_buffer: false,
            run_interval: Duration::ZERO,
            monitor_duration: Duration::from_secs(10),
            emit_warning_details: true,
            emit_ok_state: true,
            ignore_system_app_warnings: false,
            max_time_node_status_not_ok: Duration::from_secs(2 * 3600),
            report_time_to_live: DEFAULT_TIME_TO_LIVE,
            emit_unknown_on_failure: false,
            system_entity_prefix: DEFAULT_SYSTEM_ENTITY_PREFIX.to_string(),
        }
    }
}

impl MonitorSettings {
    /// Read the settings of `section`, keeping defaults for absent keys
    pub fn load(provider: &dyn ConfigProvider, section: &str) -> ObserverResult<Self> {
        let mut settings = Self::default();

        if let Some(v) = parse_bool(provider, section, ConfigOption::Enabled.key())? {
            settings.enabled = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::EnableTelemetry.key())? {
            settings.enable_telemetry = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::EnableEtw.key())? {
            settings.enable_etw = v;
        }
        if let Some(v) = parse_value(provider, section, ConfigOption::ResourceUsageDataCapacity.key())? {
            settings.data_capacity = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::UseCircularBuffer.key())? {
            settings.use_circular_buffer = v;
        }
        if let Some(v) = parse_duration_key(provider, section, ConfigOption::RunInterval.key())? {
            settings.run_interval = v;
        }
        if let Some(v) = parse_duration_key(provider, section, ConfigOption::MonitorDuration.key())? {
            settings.monitor_duration = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::EmitHealthWarningEvaluation.key())? {
            settings.emit_warning_details = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::EmitOkHealthState.key())? {
            settings.emit_ok_state = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::IgnoreSystemAppWarnings.key())? {
            settings.ignore_system_app_warnings = v;
        }
        if let Some(v) = parse_duration_key(provider, section, ConfigOption::MaxTimeNodeStatusNotOk.key())? {
            settings.max_time_node_status_not_ok = v;
        }
        if let Some(v) = parse_duration_key(provider, section, ConfigOption::HealthReportTimeToLive.key())? {
            settings.report_time_to_live = v;
        }
        if let Some(v) = parse_bool(provider, section, ConfigOption::EmitUnknownOnFailure.key())? {
            settings.emit_unknown_on_failure = v;
        }
        if let Some(v) = raw(provider, section, ConfigOption::SystemEntityPrefix.key()) {
            settings.system_entity_prefix = v;
        }

        if settings.use_circular_buffer && settings.data_capacity == 0 {
            return Err(ObserverError::Config(format!(
                "[{}] {} must be positive when {} is set",
                section,
                ConfigOption::ResourceUsageDataCapacity,
                ConfigOption::UseCircularBuffer
            )));
        }

        Ok(settings)
    }

    /// Aggregator behaviour derived from these settings
    pub fn aggregator_options(&self, property: Option<String>) -> AggregatorOptions {
        AggregatorOptions {
            emit_ok_recovery: self.emit_ok_state,
            emit_warning_details: self.emit_warning_details,
            ignore_system_entity_warnings: self.ignore_system_app_warnings,
            system_entity_prefix: self.system_entity_prefix.clone(),
            property,
            time_to_live: self.report_time_to_live,
            emit_log_event: self.enable_etw,
        }
    }
}
