//! Sample provider tests against a mock proc filesystem

use super::*;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 100 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 200 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:C350 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000        0 300 1 0000000000000000 20 4 30 10 -1
";

/// Helper to create a mock /proc with one process (pid 42)
async fn create_mock_proc(temp_dir: &TempDir) -> &Path {
    let root = temp_dir.path();

    fs::write(root.join("stat"), "cpu  400 0 100 1500 0 0 0 0 0 0\n")
        .await
        .unwrap();
    fs::write(
        root.join("meminfo"),
        "MemTotal:        4194304 kB\nMemFree:          524288 kB\nMemAvailable:    1048576 kB\n",
    )
    .await
    .unwrap();

    fs::create_dir_all(root.join("sys/fs")).await.unwrap();
    fs::write(root.join("sys/fs/file-nr"), "2048\t0\t100000\n")
        .await
        .unwrap();

    fs::create_dir_all(root.join("net")).await.unwrap();
    fs::write(root.join("net/tcp"), TCP_TABLE).await.unwrap();

    let proc_dir = root.join("42");
    fs::create_dir_all(proc_dir.join("fd")).await.unwrap();
    fs::write(
        proc_dir.join("stat"),
        "42 (observer) S 1 42 42 0 -1 0 0 0 0 0 10 5 0 0 20 0 1 0 1 0 0\n",
    )
    .await
    .unwrap();
    fs::write(proc_dir.join("status"), "Name:\tobserver\nVmRSS:\t  102400 kB\n")
        .await
        .unwrap();

    std::os::unix::fs::symlink("/dev/null", proc_dir.join("fd/0")).unwrap();
    std::os::unix::fs::symlink("socket:[200]", proc_dir.join("fd/3")).unwrap();
    std::os::unix::fs::symlink("socket:[100]", proc_dir.join("fd/4")).unwrap();

    root
}

fn provider(root: &Path) -> ProcfsSampleProvider {
    ProcfsSampleProvider::with_proc_root(root).with_cpu_sample_interval(Duration::from_millis(1))
}

#[tokio::test]
async fn test_node_memory() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_mock_proc(&temp_dir).await;
    let provider = provider(root);

    let mb = provider
        .current_value(Metric::MemoryMb, NODE_ENTITY)
        .await
        .unwrap();
    assert_eq!(mb, 3072.0);

    let percent = provider
        .current_value(Metric::MemoryPercent, NODE_ENTITY)
        .await
        .unwrap();
    assert_eq!(percent, 75.0);
}

#[tokio::test]
async fn test_process_memory() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_mock_proc(&temp_dir).await;
    let provider = provider(root);

    assert_eq!(
        provider.current_value(Metric::MemoryMb, "42").await.unwrap(),
        100.0
    );
    let percent = provider
        .current_value(Metric::MemoryPercent, "42")
        .await
        .unwrap();
    assert!((percent - 2.44140625).abs() < 1e-9);
}

#[tokio::test]
async fn test_file_handles() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_mock_proc(&temp_dir).await;
    let provider = provider(root);

    assert_eq!(
        provider
            .current_value(Metric::FileHandles, NODE_ENTITY)
            .await
            .unwrap(),
        2048.0
    );
    assert_eq!(
        provider.current_value(Metric::FileHandles, "42").await.unwrap(),
        3.0
    );
}

#[tokio::test]
async fn test_active_ports_exclude_listeners() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_mock_proc(&temp_dir).await;
    let provider = provider(root);

    assert_eq!(
        provider
            .current_value(Metric::ActivePorts, NODE_ENTITY)
            .await
            .unwrap(),
        2.0
    );
    // Inode 100 is the listener, only 200 counts
    assert_eq!(
        provider.current_value(Metric::ActivePorts, "42").await.unwrap(),
        1.0
    );
}

#[tokio::test]
async fn test_static_cpu_counters_read_as_idle() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_mock_proc(&temp_dir).await;
    let provider = provider(root);

    assert_eq!(
        provider
            .current_value(Metric::CpuPercent, NODE_ENTITY)
            .await
            .unwrap(),
        0.0
    );
    assert_eq!(
        provider.current_value(Metric::CpuPercent, "42").await.unwrap(),
        0.0
    );
}

#[tokio::test]
async fn test_missing_process_fails() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_mock_proc(&temp_dir).await;
    let provider = provider(root);

    assert!(provider.current_value(Metric::MemoryMb, "7").await.is_err());
    assert!(provider
        .current_value(Metric::FileHandles, "../42")
        .await
        .is_err());
}

#[test]
fn test_metric_properties_and_keys() {
    assert_eq!(Metric::CpuPercent.property(), "CPU %");
    assert_eq!(Metric::MemoryMb.error_limit_key(), "MemoryErrorLimitMb");
    assert_eq!(Metric::ActivePorts.warning_limit_key(), "ActivePortsWarningLimit");
    assert_eq!(Metric::ALL.len(), 5);
}
