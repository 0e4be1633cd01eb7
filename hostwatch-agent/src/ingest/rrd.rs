use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hostwatch_core::{Sample, SampleSource};
use hostwatch_persistent_storage::Store;
use tracing::{debug, info};

use super::rrd_file::RrdFile;
use super::{read_fallback, read_file, IngestReport, Ingestor};
use crate::errors::IngestError;
use crate::resource_monitor::ResourceMonitor;

/// Default trailing window, in seconds, averaged from an uploaded file.
pub const DEFAULT_RRD_WINDOW_SECS: u64 = 300;

/// Ingests round-robin-database files.
///
/// The sample is stamped with the file's own last-update instant, so an old file
/// lands at its historical position in the store.
pub struct RrdIngestor {
    store: Store,
    monitor: Arc<dyn ResourceMonitor>,
    data_source: Option<String>,
    window_secs: u64,
}

impl RrdIngestor {
    pub fn new(
        store: Store,
        monitor: Arc<dyn ResourceMonitor>,
        data_source: Option<String>,
        window_secs: u64,
    ) -> Self {
        Self {
            store,
            monitor,
            data_source,
            window_secs,
        }
    }

    /// Mean of the designated data source over the trailing window, 0 when no known
    /// values fall inside it.
    fn window_average(&self, file: &RrdFile) -> Result<f64, IngestError> {
        let ds = file.data_source_index(self.data_source.as_deref())?;
        let end = file.last_update;
        let start = end.saturating_sub(self.window_secs.min(i64::MAX as u64) as i64);
        let series = file.fetch_average(ds, start, end)?;
        debug!(
            target = "ingest",
            data_source = %file.data_sources[ds].name,
            start,
            end,
            points = series.len(),
            "fetched RRD window"
        );
        if series.is_empty() {
            return Ok(0.0);
        }
        Ok(series.iter().sum::<f64>() / series.len() as f64)
    }
}

#[async_trait]
impl Ingestor for RrdIngestor {
    fn format(&self) -> &'static str {
        "RRD"
    }

    async fn ingest(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let bytes = read_file(path).await?;
        let file = RrdFile::parse(&bytes)?;
        let timestamp = file.last_update_time()?;
        let cpu = self.window_average(&file)?;

        let fallback = read_fallback(self.monitor.as_ref()).await?;
        let sample = Sample::new(
            timestamp,
            cpu,
            fallback.memory,
            fallback.disk,
            None,
            SampleSource::UploadedRrd,
        );
        self.store.insert(sample.clone()).await?;

        info!(
            target = "ingest",
            path = %path.display(),
            %timestamp,
            cpu,
            "ingested RRD file"
        );
        Ok(IngestReport {
            sample,
            summary: format!("Processed RRD file. Average CPU: {:.1}%", cpu),
        })
    }
}
