//! Native resource monitoring implementation using sysinfo
//!
//! Works on Linux, macOS, and Windows platforms.

use super::ResourceMonitor;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use tokio::sync::Mutex;

// Spacing between the two CPU refreshes sysinfo needs for a usage figure
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(200);

/// Native resource monitor using sysinfo crate
pub struct NativeResourceMonitor {
    system: Arc<Mutex<System>>,
    // Mount point whose usage is reported as the disk percentage
    disk_mount: PathBuf,
}

impl NativeResourceMonitor {
    pub fn new(disk_mount: impl Into<PathBuf>) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            system: Arc::new(Mutex::new(system)),
            disk_mount: disk_mount.into(),
        }
    }

    pub fn disk_mount(&self) -> &Path {
        &self.disk_mount
    }
}

impl Default for NativeResourceMonitor {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Used/total percentage over `(total, available)` pairs.
fn usage_percent(spaces: impl Iterator<Item = (u64, u64)>) -> Option<f64> {
    let (total, available) = spaces.fold((0u128, 0u128), |(t, a), (total, available)| {
        (t + total as u128, a + available as u128)
    });
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available);
    Some(used as f64 / total as f64 * 100.0)
}

#[async_trait]
impl ResourceMonitor for NativeResourceMonitor {
    async fn get_cpu_usage(&self) -> Result<f64> {
        let mut system = self.system.lock().await;

        // Usage is a delta between two refreshes
        system.refresh_cpu_all();
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
        system.refresh_cpu_all();

        let per_core: Vec<f64> = system.cpus().iter().map(|c| c.cpu_usage() as f64).collect();
        if per_core.is_empty() {
            bail!("no CPUs reported by the operating system");
        }
        let mean = per_core.iter().sum::<f64>() / per_core.len() as f64;
        Ok(mean.clamp(0.0, 100.0))
    }

    async fn get_memory_usage(&self) -> Result<f64> {
        let (used, total) = {
            let mut system = self.system.lock().await;
            system.refresh_memory();
            (system.used_memory(), system.total_memory())
        };
        match usage_percent(std::iter::once((total, total.saturating_sub(used)))) {
            Some(pct) => Ok(pct),
            None => bail!("total memory reported as zero"),
        }
    }

    async fn get_disk_usage(&self) -> Result<f64> {
        let disks = Disks::new_with_refreshed_list();

        let mounted = usage_percent(
            disks
                .list()
                .iter()
                .filter(|d| d.mount_point() == self.disk_mount.as_path())
                .map(|d| (d.total_space(), d.available_space())),
        );
        if let Some(pct) = mounted {
            return Ok(pct);
        }

        // Configured mount not found: aggregate every disk
        match usage_percent(
            disks
                .list()
                .iter()
                .map(|d| (d.total_space(), d.available_space())),
        ) {
            Some(pct) => Ok(pct),
            None => bail!(
                "no disk space information for {}",
                self.disk_mount.display()
            ),
        }
    }

    async fn get_network_sent(&self) -> Result<u64> {
        let networks = Networks::new_with_refreshed_list();
        Ok(networks
            .list()
            .values()
            .map(|network| network.total_transmitted())
            .sum())
    }
}
