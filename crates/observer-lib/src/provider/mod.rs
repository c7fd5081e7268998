//! Resource sample providers
//!
//! A [`SampleProvider`] returns the current value of one [`Metric`] for
//! one entity. The entity [`NODE_ENTITY`] means the whole machine; any
//! other id names a process.

mod procfs;

#[cfg(test)]
mod tests;

pub use procfs::{
    parse_cpu_times, parse_file_nr, parse_meminfo, parse_process_cpu_ticks, parse_tcp_table,
    parse_vm_rss_kb, socket_inode, CpuTimes, ProcfsSampleProvider, TcpEntry,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Entity id that selects system-wide samples
pub const NODE_ENTITY: &str = "node";

/// Metrics a provider can sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    CpuPercent,
    MemoryMb,
    MemoryPercent,
    FileHandles,
    ActivePorts,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::CpuPercent,
        Metric::MemoryMb,
        Metric::MemoryPercent,
        Metric::FileHandles,
        Metric::ActivePorts,
    ];

    /// Series property name; also determines the series units
    pub fn property(&self) -> &'static str {
        match self {
            Metric::CpuPercent => "CPU %",
            Metric::MemoryMb => "Memory MB",
            Metric::MemoryPercent => "Memory %",
            Metric::FileHandles => "Open File Handles",
            Metric::ActivePorts => "Active TCP Ports",
        }
    }

    /// Configuration key of the Error threshold
    pub fn error_limit_key(&self) -> &'static str {
        match self {
            Metric::CpuPercent => "CpuErrorLimitPercent",
            Metric::MemoryMb => "MemoryErrorLimitMb",
            Metric::MemoryPercent => "MemoryErrorLimitPercent",
            Metric::FileHandles => "FileHandlesErrorLimit",
            Metric::ActivePorts => "ActivePortsErrorLimit",
        }
    }

    /// Configuration key of the Warning threshold
    pub fn warning_limit_key(&self) -> &'static str {
        match self {
            Metric::CpuPercent => "CpuWarningLimitPercent",
            Metric::MemoryMb => "MemoryWarningLimitMb",
            Metric::MemoryPercent => "MemoryWarningLimitPercent",
            Metric::FileHandles => "FileHandlesWarningLimit",
            Metric::ActivePorts => "ActivePortsWarningLimit",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.property())
    }
}

/// Source of current resource usage values
#[async_trait]
pub trait SampleProvider: Send + Sync {
    /// Current value of `metric` for `entity_id`
    async fn current_value(&self, metric: Metric, entity_id: &str) -> Result<f64>;
}
