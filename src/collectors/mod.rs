pub mod network;
pub mod system;

use crate::snapshot::{
    CpuInfo, DiskUsage, HostInfo, LoadAverage, MemoryStat, NetworkInterface, Partition,
    Platform, Snapshot, SCHEMA_VERSION,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Memory,
    Host,
    DiskPartitions,
    DiskUsage,
    CpuPercent,
    CpuInfo,
    LoadAverage,
    Network,
    Uptime,
    Processes,
}

impl Subsystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Memory => "memory",
            Subsystem::Host => "host",
            Subsystem::DiskPartitions => "disk_partitions",
            Subsystem::DiskUsage => "disk_usage",
            Subsystem::CpuPercent => "cpu_percent",
            Subsystem::CpuInfo => "cpu_info",
            Subsystem::LoadAverage => "load_average",
            Subsystem::Network => "network",
            Subsystem::Uptime => "uptime",
            Subsystem::Processes => "processes",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not supported on this platform")]
    Unsupported,
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
#[error("{subsystem} query failed: {source}")]
pub struct CollectError {
    pub subsystem: Subsystem,
    #[source]
    pub source: ProviderError,
}

/// Source of live OS state. One method per subsystem; the collector calls
/// each of them at most once per snapshot.
pub trait SystemProvider {
    fn memory(&mut self) -> Result<MemoryStat, ProviderError>;
    fn host_info(&mut self) -> Result<HostInfo, ProviderError>;
    fn partitions(&mut self) -> Result<Vec<Partition>, ProviderError>;
    fn mountpoint_accessible(&self, mountpoint: &Path) -> bool;
    fn disk_usage(&mut self, partition: &Partition) -> Result<DiskUsage, ProviderError>;
    /// Blocks for `window` between the two CPU samples.
    fn cpu_percent(&mut self, window: Duration) -> Result<f64, ProviderError>;
    fn cpu_info(&mut self) -> Result<Vec<CpuInfo>, ProviderError>;
    /// `None` where the OS has no notion of load average.
    fn load_average(&mut self) -> Result<Option<LoadAverage>, ProviderError>;
    fn network_interfaces(&mut self) -> Result<Vec<NetworkInterface>, ProviderError>;
    fn uptime(&mut self) -> Result<u64, ProviderError>;
    fn processes(&mut self) -> Result<Vec<u32>, ProviderError>;
}

#[derive(Debug, Clone, Copy)]
pub struct Collector {
    cpu_sample_window: Duration,
}

impl Collector {
    pub fn new(cpu_sample_window: Duration) -> Self {
        Self { cpu_sample_window }
    }

    /// Queries every subsystem once, in a fixed order. The first failure
    /// aborts the whole snapshot.
    pub fn collect<P: SystemProvider>(&self, provider: &mut P) -> Result<Snapshot, CollectError> {
        let memory = query(Subsystem::Memory, || provider.memory())?;
        let host_info = query(Subsystem::Host, || provider.host_info())?;
        let disk_partitions = query(Subsystem::DiskPartitions, || provider.partitions())?;

        let mut disk_usage = BTreeMap::new();
        for partition in &disk_partitions {
            if !provider.mountpoint_accessible(Path::new(&partition.mountpoint)) {
                debug!(
                    mountpoint = %partition.mountpoint,
                    device = %partition.device,
                    "mountpoint not accessible, skipping usage"
                );
                continue;
            }
            let usage = query(Subsystem::DiskUsage, || provider.disk_usage(partition))?;
            disk_usage.insert(partition.mountpoint.clone(), usage);
        }

        debug!(window = ?self.cpu_sample_window, "sampling cpu usage");
        let window = self.cpu_sample_window;
        let cpu_percent = query(Subsystem::CpuPercent, || provider.cpu_percent(window))?;
        let cpu_info = query(Subsystem::CpuInfo, || provider.cpu_info())?;
        let load_average = query(Subsystem::LoadAverage, || provider.load_average())?;
        let network_interfaces = query(Subsystem::Network, || provider.network_interfaces())?;
        let uptime_seconds = query(Subsystem::Uptime, || provider.uptime())?;
        let processes = query(Subsystem::Processes, || provider.processes())?;

        Ok(Snapshot {
            schema_version: SCHEMA_VERSION,
            platform: Platform::current(),
            cpu_percent,
            cpu_info,
            memory,
            disk_partitions,
            disk_usage,
            load_average,
            network_interfaces,
            host_info,
            uptime_seconds,
            processes,
        })
    }
}

fn query<T>(
    subsystem: Subsystem,
    f: impl FnOnce() -> Result<T, ProviderError>,
) -> Result<T, CollectError> {
    debug!(subsystem = %subsystem, "querying");
    f().map_err(|source| CollectError { subsystem, source })
}
