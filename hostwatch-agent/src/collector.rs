//! Periodic producer of live-system samples.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hostwatch_core::{Sample, SampleSource};
use hostwatch_persistent_storage::Store;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::CollectError;
use crate::resource_monitor::ResourceMonitor;

/// Reads the live counters and stores one `live_metrics` sample per tick.
pub struct Collector {
    store: Store,
    monitor: Arc<dyn ResourceMonitor>,
}

impl Collector {
    pub fn new(store: Store, monitor: Arc<dyn ResourceMonitor>) -> Self {
        Self { store, monitor }
    }

    /// Build a sample from the live counters without storing it.
    ///
    /// CPU, memory and disk are required. The network counter is optional and an
    /// unreadable one leaves `network` empty.
    pub async fn read_sample(&self) -> Result<Sample, CollectError> {
        let unavailable = |what: &str, e: anyhow::Error| {
            CollectError::SourceUnavailable(format!("{}: {}", what, e))
        };
        let cpu = self
            .monitor
            .get_cpu_usage()
            .await
            .map_err(|e| unavailable("cpu", e))?;
        let memory = self
            .monitor
            .get_memory_usage()
            .await
            .map_err(|e| unavailable("memory", e))?;
        let disk = self
            .monitor
            .get_disk_usage()
            .await
            .map_err(|e| unavailable("disk", e))?;
        let network = match self.monitor.get_network_sent().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(target = "collector", error = %e, "network counter unavailable");
                None
            }
        };

        Ok(Sample::new(
            Utc::now(),
            cpu,
            memory,
            disk,
            network,
            SampleSource::LiveMetrics,
        ))
    }

    /// Read and store one sample.
    pub async fn collect_once(&self) -> Result<Sample, CollectError> {
        let sample = self.read_sample().await?;
        self.store.insert(sample.clone()).await?;
        Ok(sample)
    }

    /// Collect every `period` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A failed tick is logged and skipped; the loop keeps going.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(target = "collector", period_ms = period.as_millis() as u64, "collector started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    match self.collect_once().await {
                        Ok(sample) => debug!(
                            target = "collector",
                            cpu = sample.cpu,
                            memory = sample.memory,
                            disk = sample.disk,
                            "collected sample"
                        ),
                        Err(e) => warn!(target = "collector", error = %e, "collection tick skipped"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(target = "collector", "collector stopped");
    }
}
