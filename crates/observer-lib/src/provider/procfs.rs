//! Linux procfs sample provider
//!
//! Reads:
//! - /proc/stat and /proc/<pid>/stat for CPU usage
//! - /proc/meminfo and /proc/<pid>/status for memory
//! - /proc/sys/fs/file-nr and /proc/<pid>/fd for open handles
//! - /proc/net/tcp{,6} for established TCP connections

use super::{Metric, SampleProvider, NODE_ENTITY};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// TCP state code of a listening socket in /proc/net/tcp
const TCP_LISTEN: u8 = 0x0A;

/// Aggregate CPU times from the first line of /proc/stat, in clock ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

/// One row of /proc/net/tcp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpEntry {
    pub state: u8,
    pub inode: u64,
}

impl TcpEntry {
    pub fn is_listening(&self) -> bool {
        self.state == TCP_LISTEN
    }
}

/// Parse the aggregate `cpu` line of /proc/stat
pub fn parse_cpu_times(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return None;
    }

    let total: u64 = values.iter().sum();
    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// utime + stime from /proc/<pid>/stat, in clock ticks
pub fn parse_process_cpu_ticks(content: &str) -> Option<u64> {
    // The command name may contain spaces; fields resume after the last ')'
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Parse /proc/meminfo into kB values keyed by field name
pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
    let mut fields = HashMap::new();

    for line in content.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        if let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) {
            fields.insert(name.trim().to_string(), value);
        }
    }

    fields
}

/// VmRSS from /proc/<pid>/status, in kB
pub fn parse_vm_rss_kb(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// Allocated minus free handles from /proc/sys/fs/file-nr
pub fn parse_file_nr(content: &str) -> Option<u64> {
    let mut fields = content.split_whitespace();
    let allocated: u64 = fields.next()?.parse().ok()?;
    let free: u64 = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    Some(allocated.saturating_sub(free))
}

/// Parse /proc/net/tcp or /proc/net/tcp6, skipping the header
pub fn parse_tcp_table(content: &str) -> Vec<TcpEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let state = u8::from_str_radix(fields.get(3)?, 16).ok()?;
            let inode = fields.get(9)?.parse().ok()?;
            Some(TcpEntry { state, inode })
        })
        .collect()
}

/// Inode of a `socket:[N]` fd link target
pub fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Sample provider backed by the proc filesystem
#[derive(Debug, Clone)]
pub struct ProcfsSampleProvider {
    proc_root: PathBuf,
    cpu_sample_interval: Duration,
}

impl Default for ProcfsSampleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsSampleProvider {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            cpu_sample_interval: Duration::from_millis(250),
        }
    }

    /// Create a provider with a custom proc root (for testing)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            ..Self::new()
        }
    }

    /// Time between the two readings a CPU sample is computed from
    pub fn with_cpu_sample_interval(mut self, interval: Duration) -> Self {
        self.cpu_sample_interval = interval;
        self
    }

    async fn read(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.proc_root.join(relative);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Directory of a process entity; only `self` and numeric pids are accepted
    fn process_dir(entity_id: &str) -> Result<PathBuf> {
        let is_pid = !entity_id.is_empty() && entity_id.bytes().all(|b| b.is_ascii_digit());
        if entity_id == "self" || is_pid {
            Ok(PathBuf::from(entity_id))
        } else {
            bail!("Invalid process entity '{}'", entity_id)
        }
    }

    async fn cpu_times(&self) -> Result<CpuTimes> {
        let content = self.read("stat").await?;
        parse_cpu_times(&content).ok_or_else(|| anyhow!("Malformed /proc/stat"))
    }

    async fn process_cpu_ticks(&self, dir: &Path) -> Result<u64> {
        let content = self.read(dir.join("stat")).await?;
        parse_process_cpu_ticks(&content)
            .ok_or_else(|| anyhow!("Malformed stat for process {}", dir.display()))
    }

    async fn cpu_percent(&self, entity_id: &str) -> Result<f64> {
        if entity_id == NODE_ENTITY {
            let first = self.cpu_times().await?;
            tokio::time::sleep(self.cpu_sample_interval).await;
            let second = self.cpu_times().await?;

            let total = second.total.saturating_sub(first.total);
            let busy = second.busy.saturating_sub(first.busy);
            return Ok(ratio_percent(busy, total));
        }

        let dir = Self::process_dir(entity_id)?;
        let first_total = self.cpu_times().await?.total;
        let first_ticks = self.process_cpu_ticks(&dir).await?;
        tokio::time::sleep(self.cpu_sample_interval).await;
        let second_total = self.cpu_times().await?.total;
        let second_ticks = self.process_cpu_ticks(&dir).await?;

        Ok(ratio_percent(
            second_ticks.saturating_sub(first_ticks),
            second_total.saturating_sub(first_total),
        ))
    }

    async fn meminfo(&self) -> Result<HashMap<String, u64>> {
        Ok(parse_meminfo(&self.read("meminfo").await?))
    }

    /// Used memory in kB and total memory in kB
    async fn memory_kb(&self, entity_id: &str) -> Result<(u64, u64)> {
        let meminfo = self.meminfo().await?;
        let total = *meminfo
            .get("MemTotal")
            .ok_or_else(|| anyhow!("MemTotal missing from meminfo"))?;

        if entity_id == NODE_ENTITY {
            let available = meminfo
                .get("MemAvailable")
                .or_else(|| meminfo.get("MemFree"))
                .copied()
                .unwrap_or(0);
            return Ok((total.saturating_sub(available), total));
        }

        let dir = Self::process_dir(entity_id)?;
        let status = self.read(dir.join("status")).await?;
        let rss = parse_vm_rss_kb(&status)
            .ok_or_else(|| anyhow!("VmRSS missing for process {}", entity_id))?;
        Ok((rss, total))
    }

    async fn process_fd_links(&self, dir: &Path) -> Result<Vec<String>> {
        let fd_dir = self.proc_root.join(dir).join("fd");
        let mut entries = fs::read_dir(&fd_dir)
            .await
            .with_context(|| format!("Failed to list {}", fd_dir.display()))?;

        let mut links = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // fds can close between listing and reading the link
            let target = fs::read_link(entry.path())
                .await
                .map(|t| t.to_string_lossy().into_owned())
                .unwrap_or_default();
            links.push(target);
        }
        Ok(links)
    }

    async fn file_handles(&self, entity_id: &str) -> Result<f64> {
        if entity_id == NODE_ENTITY {
            let content = self.read("sys/fs/file-nr").await?;
            return parse_file_nr(&content)
                .map(|n| n as f64)
                .ok_or_else(|| anyhow!("Malformed file-nr"));
        }

        let dir = Self::process_dir(entity_id)?;
        Ok(self.process_fd_links(&dir).await?.len() as f64)
    }

    async fn tcp_entries(&self) -> Result<Vec<TcpEntry>> {
        let mut entries = Vec::new();
        let mut any_read = false;

        for table in ["net/tcp", "net/tcp6"] {
            if let Ok(content) = self.read(table).await {
                any_read = true;
                entries.extend(parse_tcp_table(&content));
            }
        }

        if !any_read {
            bail!("No TCP tables under {}", self.proc_root.display());
        }
        Ok(entries)
    }

    async fn active_ports(&self, entity_id: &str) -> Result<f64> {
        let entries = self.tcp_entries().await?;
        let active = entries.iter().filter(|e| !e.is_listening());

        if entity_id == NODE_ENTITY {
            return Ok(active.count() as f64);
        }

        let dir = Self::process_dir(entity_id)?;
        let inodes: HashSet<u64> = self
            .process_fd_links(&dir)
            .await?
            .iter()
            .filter_map(|link| socket_inode(link))
            .collect();

        Ok(active.filter(|e| inodes.contains(&e.inode)).count() as f64)
    }
}

fn ratio_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}

#[async_trait]
impl SampleProvider for ProcfsSampleProvider {
    async fn current_value(&self, metric: Metric, entity_id: &str) -> Result<f64> {
        match metric {
            Metric::CpuPercent => self.cpu_percent(entity_id).await,
            Metric::MemoryMb => {
                let (used_kb, _) = self.memory_kb(entity_id).await?;
                Ok(used_kb as f64 / 1024.0)
            }
            Metric::MemoryPercent => {
                let (used_kb, total_kb) = self.memory_kb(entity_id).await?;
                Ok(ratio_percent(used_kb, total_kb))
            }
            Metric::FileHandles => self.file_handles(entity_id).await,
            Metric::ActivePorts => self.active_ports(entity_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_times() {
        let content = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        let times = parse_cpu_times(content).unwrap();
        assert_eq!(times.total, 1000);
        assert_eq!(times.busy, 150);

        assert!(parse_cpu_times("intr 1 2 3").is_none());
    }

    #[test]
    fn test_parse_process_cpu_ticks_with_spaces_in_name() {
        let content = "1234 (my (odd) proc) S 1 1234 1234 0 -1 4194560 100 0 0 0 70 30 0 0 20 0 1 0 100 0 0";
        assert_eq!(parse_process_cpu_ticks(content), Some(100));
        assert_eq!(parse_process_cpu_ticks("garbage"), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       16384000 kB\nMemFree:         1024000 kB\nMemAvailable:    8192000 kB\nHugePages_Total:       0\n";
        let fields = parse_meminfo(content);
        assert_eq!(fields["MemTotal"], 16384000);
        assert_eq!(fields["MemAvailable"], 8192000);
        assert_eq!(fields["HugePages_Total"], 0);
    }

    #[test]
    fn test_parse_vm_rss() {
        let content = "Name:\tagent\nVmPeak:\t  300000 kB\nVmRSS:\t   51200 kB\n";
        assert_eq!(parse_vm_rss_kb(content), Some(51200));
        assert_eq!(parse_vm_rss_kb("Name:\tkthreadd\n"), None);
    }

    #[test]
    fn test_parse_file_nr() {
        assert_eq!(parse_file_nr("4128\t0\t9223372036854775807\n"), Some(4128));
        assert_eq!(parse_file_nr("4128 128 100000"), Some(4000));
        assert_eq!(parse_file_nr(""), None);
    }

    #[test]
    fn test_parse_tcp_table() {
        let content = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 11111 1 0000000000000000 100 0 0 10 0\n   1: 0100007F:1F90 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 22222 1 0000000000000000 20 4 30 10 -1\n";
        let entries = parse_tcp_table(content);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_listening());
        assert_eq!(entries[1], TcpEntry { state: 1, inode: 22222 });
    }

    #[test]
    fn test_socket_inode() {
        assert_eq!(socket_inode("socket:[22222]"), Some(22222));
        assert_eq!(socket_inode("pipe:[5]"), None);
        assert_eq!(socket_inode("/dev/null"), None);
    }

    #[test]
    fn test_process_dir_rejects_paths() {
        assert!(ProcfsSampleProvider::process_dir("self").is_ok());
        assert!(ProcfsSampleProvider::process_dir("4242").is_ok());
        assert!(ProcfsSampleProvider::process_dir("../etc").is_err());
        assert!(ProcfsSampleProvider::process_dir("").is_err());
    }

    #[test]
    fn test_ratio_percent() {
        assert_eq!(ratio_percent(1, 4), 25.0);
        assert_eq!(ratio_percent(5, 0), 0.0);
    }
}
