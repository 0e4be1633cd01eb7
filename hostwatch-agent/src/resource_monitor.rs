//! System Resource Monitoring
//!
//! Cross-platform readers for the live host counters that go into a sample: CPU,
//! memory and disk usage percentages plus the cumulative network bytes sent.
//! Used by the collector on every tick and by the ingestors for their live fallback.

mod native;

pub use native::NativeResourceMonitor;

use anyhow::Result;
use async_trait::async_trait;

/// Cross-platform system resource monitoring trait
#[async_trait]
pub trait ResourceMonitor: Send + Sync {
    /// Get CPU usage as percentage (0.0-100.0)
    async fn get_cpu_usage(&self) -> Result<f64>;

    /// Get memory usage as percentage (0.0-100.0)
    async fn get_memory_usage(&self) -> Result<f64>;

    /// Get disk space usage as percentage (0.0-100.0)
    async fn get_disk_usage(&self) -> Result<f64>;

    /// Get bytes transmitted on all interfaces since boot
    async fn get_network_sent(&self) -> Result<u64>;
}

/// Memory and disk readings substituted into samples whose source format
/// cannot supply them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveFallback {
    pub memory: f64,
    pub disk: f64,
}

impl LiveFallback {
    pub async fn read(monitor: &dyn ResourceMonitor) -> Result<Self> {
        let memory = monitor.get_memory_usage().await?;
        let disk = monitor.get_disk_usage().await?;
        Ok(Self { memory, disk })
    }
}
