use crate::collectors::{network, ProviderError, SystemProvider};
use crate::snapshot::{
    percent_of, CpuInfo, DiskUsage, HostInfo, LoadAverage, MemoryStat, NetworkInterface,
    Partition,
};
#[cfg(target_os = "linux")]
use std::fs;
use std::path::Path;
#[cfg(any(target_os = "macos", target_os = "windows"))]
use std::process::Command;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, NetworksExt, PidExt, System, SystemExt};
use tracing::debug;

/// Live OS state read through `sysinfo`, topped up with per-platform readers
/// for what `sysinfo` does not expose.
pub struct SysinfoProvider {
    system: System,
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn ensure_supported() -> Result<(), ProviderError> {
        if System::IS_SUPPORTED {
            Ok(())
        } else {
            Err(ProviderError::Unsupported)
        }
    }
}

impl SystemProvider for SysinfoProvider {
    fn memory(&mut self) -> Result<MemoryStat, ProviderError> {
        Self::ensure_supported()?;
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let total_swap = self.system.total_swap();
        let used_swap = self.system.used_swap();
        Ok(MemoryStat {
            total,
            available: self.system.available_memory(),
            used,
            free: self.system.free_memory(),
            used_percent: percent_of(used, total),
            swap_total: total_swap,
            swap_used: used_swap,
            swap_free: self.system.free_swap(),
        })
    }

    fn host_info(&mut self) -> Result<HostInfo, ProviderError> {
        Self::ensure_supported()?;
        self.system.refresh_processes();
        Ok(HostInfo {
            hostname: self.system.host_name(),
            os: std::env::consts::OS.to_string(),
            platform: self.system.name(),
            platform_version: self.system.os_version(),
            kernel_version: self.system.kernel_version(),
            kernel_arch: std::env::consts::ARCH.to_string(),
            boot_time: self.system.boot_time(),
            uptime: self.system.uptime(),
            procs: self.system.processes().len() as u64,
            host_id: read_host_id(),
        })
    }

    fn partitions(&mut self) -> Result<Vec<Partition>, ProviderError> {
        Self::ensure_supported()?;
        self.system.refresh_disks_list();
        Ok(self
            .system
            .disks()
            .iter()
            .map(|d| Partition {
                device: d.name().to_string_lossy().to_string(),
                mountpoint: d.mount_point().to_string_lossy().to_string(),
                fstype: String::from_utf8_lossy(d.file_system()).to_string(),
                removable: d.is_removable(),
            })
            .collect())
    }

    fn mountpoint_accessible(&self, mountpoint: &Path) -> bool {
        std::fs::metadata(mountpoint).is_ok()
    }

    fn disk_usage(&mut self, partition: &Partition) -> Result<DiskUsage, ProviderError> {
        self.system.refresh_disks();
        let disk = self
            .system
            .disks()
            .iter()
            .find(|d| d.mount_point() == Path::new(&partition.mountpoint))
            .ok_or_else(|| {
                ProviderError::Unavailable(format!(
                    "no disk mounted at {}",
                    partition.mountpoint
                ))
            })?;

        Ok(usage_from_space(
            partition,
            disk.total_space(),
            disk.available_space(),
        ))
    }

    fn cpu_percent(&mut self, window: Duration) -> Result<f64, ProviderError> {
        Self::ensure_supported()?;
        self.system.refresh_cpu();
        std::thread::sleep(window);
        self.system.refresh_cpu();
        if self.system.cpus().is_empty() {
            return Err(ProviderError::Unavailable("no cpus reported".to_string()));
        }
        let usage = self.system.global_cpu_info().cpu_usage() as f64;
        if !usage.is_finite() {
            return Err(ProviderError::Unavailable(format!(
                "cpu usage not measurable over {window:?}"
            )));
        }
        Ok(usage)
    }

    fn cpu_info(&mut self) -> Result<Vec<CpuInfo>, ProviderError> {
        if self.system.cpus().is_empty() {
            self.system.refresh_cpu();
        }
        let details = read_cpu_details();
        let cpus: Vec<CpuInfo> = self
            .system
            .cpus()
            .iter()
            .enumerate()
            .map(|(i, cpu)| {
                let detail = details.get(i);
                CpuInfo {
                    cpu: i as u32,
                    vendor_id: cpu.vendor_id().to_string(),
                    family: detail.and_then(|d| d.family.clone()),
                    model: detail.and_then(|d| d.model.clone()),
                    model_name: cpu.brand().trim().to_string(),
                    mhz: cpu.frequency() as f64,
                    cache_size: detail.and_then(|d| d.cache_size_kb),
                }
            })
            .collect();
        if cpus.is_empty() {
            return Err(ProviderError::Unavailable("no cpus reported".to_string()));
        }
        Ok(cpus)
    }

    #[cfg(not(target_os = "windows"))]
    fn load_average(&mut self) -> Result<Option<LoadAverage>, ProviderError> {
        Self::ensure_supported()?;
        let load = self.system.load_average();
        Ok(Some(LoadAverage {
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
        }))
    }

    #[cfg(target_os = "windows")]
    fn load_average(&mut self) -> Result<Option<LoadAverage>, ProviderError> {
        Ok(None)
    }

    fn network_interfaces(&mut self) -> Result<Vec<NetworkInterface>, ProviderError> {
        self.system.refresh_networks_list();
        let names: Vec<String> = self
            .system
            .networks()
            .iter()
            .map(|(name, _)| name.to_string())
            .collect();
        network::interfaces(&names).map_err(|source| ProviderError::Io {
            context: "enumerating interfaces".to_string(),
            source,
        })
    }

    fn uptime(&mut self) -> Result<u64, ProviderError> {
        Self::ensure_supported()?;
        Ok(self.system.uptime())
    }

    fn processes(&mut self) -> Result<Vec<u32>, ProviderError> {
        Self::ensure_supported()?;
        self.system.refresh_processes();
        let mut pids: Vec<u32> = self.system.processes().keys().map(|p| p.as_u32()).collect();
        pids.sort_unstable();
        Ok(pids)
    }
}

/// `available` is the space an unprivileged user can still allocate
/// (statvfs `f_bavail`), so blocks reserved for root count as used.
/// `used_percent` therefore reads higher than a figure based on `f_bfree`.
fn usage_from_space(partition: &Partition, total: u64, available: u64) -> DiskUsage {
    let used = total.saturating_sub(available);
    DiskUsage {
        path: partition.mountpoint.clone(),
        device: partition.device.clone(),
        fstype: partition.fstype.clone(),
        total,
        free: available,
        used,
        used_percent: percent_of(used, total),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct CpuDetail {
    family: Option<String>,
    model: Option<String>,
    cache_size_kb: Option<u32>,
}

#[cfg(target_os = "linux")]
fn read_cpu_details() -> Vec<CpuDetail> {
    match fs::read_to_string("/proc/cpuinfo") {
        Ok(text) => parse_cpuinfo(&text),
        Err(err) => {
            debug!(error = %err, "/proc/cpuinfo unreadable");
            Vec::new()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_details() -> Vec<CpuDetail> {
    Vec::new()
}

/// One entry per `processor` block, in file order.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_cpuinfo(text: &str) -> Vec<CpuDetail> {
    let mut out = Vec::new();
    for block in text.split("\n\n") {
        if !block.lines().any(|l| l.starts_with("processor")) {
            continue;
        }
        let mut detail = CpuDetail::default();
        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "cpu family" => detail.family = Some(value.to_string()),
                "model" => detail.model = Some(value.to_string()),
                "cache size" => {
                    detail.cache_size_kb = value
                        .trim_end_matches("KB")
                        .trim()
                        .parse()
                        .ok();
                }
                _ => {}
            }
        }
        out.push(detail);
    }
    out
}

#[cfg(target_os = "linux")]
fn read_host_id() -> Option<String> {
    for path in [
        "/sys/class/dmi/id/product_uuid",
        "/etc/machine-id",
        "/var/lib/dbus/machine-id",
    ] {
        if let Ok(raw) = fs::read_to_string(path) {
            if let Some(id) = normalize_host_id(&raw) {
                return Some(id);
            }
        }
    }
    debug!("no host id source readable");
    None
}

#[cfg(target_os = "macos")]
fn read_host_id() -> Option<String> {
    let output = Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    if !output.status.success() {
        debug!(status = %output.status, "ioreg failed");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|l| l.contains("IOPlatformUUID"))
        .and_then(|l| l.split('"').nth(3))
        .and_then(normalize_host_id)
}

#[cfg(target_os = "windows")]
fn read_host_id() -> Option<String> {
    let output = Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
        ])
        .output()
        .ok()?;
    if !output.status.success() {
        debug!(status = %output.status, "reg query failed");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|l| l.contains("MachineGuid"))
        .and_then(|l| l.split_whitespace().last())
        .and_then(normalize_host_id)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn read_host_id() -> Option<String> {
    None
}

/// machine-id files carry 32 bare hex digits; reformat them as a UUID.
fn normalize_host_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_lowercase();
    if id.is_empty() {
        return None;
    }
    if id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(format!(
            "{}-{}-{}-{}-{}",
            &id[0..8],
            &id[8..12],
            &id[12..16],
            &id[16..20],
            &id[20..32]
        ));
    }
    Some(id)
}
