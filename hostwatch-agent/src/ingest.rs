//! File ingestion: turns uploaded monitoring files into samples.
//!
//! Each ingestor handles exactly one file per call and fails closed: on any error the
//! caller gets a descriptive message and nothing is stored. Fields a format cannot
//! supply (memory, disk) are filled from a live read of the host at ingestion time.

mod rrd;
mod rrd_file;
mod upload;
mod xml;

pub use rrd::{RrdIngestor, DEFAULT_RRD_WINDOW_SECS};
pub use rrd_file::{Archive, ConsolidationFn, DataSourceDef, RrdFile};
pub use upload::{UploadKind, UploadRouter};
pub use xml::{parse_datasources, XmlIngestor, CPU_DATASOURCE};

use std::fmt::{self, Display, Formatter};
use std::path::Path;

use async_trait::async_trait;
use hostwatch_core::Sample;
use tracing::warn;

use crate::errors::IngestError;
use crate::resource_monitor::{LiveFallback, ResourceMonitor};

/// Outcome of a successful ingestion: the stored sample and a human-readable summary.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub sample: Sample,
    pub summary: String,
}

impl Display for IngestReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Short format label used in failure messages ("XML", "RRD").
    fn format(&self) -> &'static str;

    /// Parse `path`, build a sample and store it.
    async fn ingest(&self, path: &Path) -> Result<IngestReport, IngestError>;

    /// Like [`Ingestor::ingest`], rendered as a plain-text result for the upload handler.
    async fn process(&self, path: &Path) -> String {
        match self.ingest(path).await {
            Ok(report) => report.to_string(),
            Err(e) => {
                warn!(target = "ingest", format = self.format(), path = %path.display(), error = %e, "ingestion failed");
                format!("Error processing {}: {}", self.format(), e)
            }
        }
    }
}

/// Read the live memory/disk fallback, mapping failures to `SourceUnavailable`.
pub(crate) async fn read_fallback(
    monitor: &dyn ResourceMonitor,
) -> Result<LiveFallback, IngestError> {
    LiveFallback::read(monitor)
        .await
        .map_err(|e| IngestError::SourceUnavailable(e.to_string()))
}

pub(crate) async fn read_file(path: &Path) -> Result<Vec<u8>, IngestError> {
    tokio::fs::read(path).await.map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
