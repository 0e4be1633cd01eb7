use std::path::Path;

use tracing::warn;

use super::{IngestReport, Ingestor, RrdIngestor, XmlIngestor};
use crate::errors::IngestError;

/// Upload formats the agent accepts, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Xml,
    Rrd,
}

impl UploadKind {
    /// Classify an upload by its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xml") => Ok(UploadKind::Xml),
            Some("rrd") => Ok(UploadKind::Rrd),
            _ => Err(IngestError::UnsupportedUpload(path.display().to_string())),
        }
    }
}

/// Single entry point for uploaded files: rejects unknown extensions and hands the
/// rest to the matching ingestor.
pub struct UploadRouter {
    xml: XmlIngestor,
    rrd: RrdIngestor,
}

impl UploadRouter {
    pub fn new(xml: XmlIngestor, rrd: RrdIngestor) -> Self {
        Self { xml, rrd }
    }

    fn ingestor(&self, kind: UploadKind) -> &dyn Ingestor {
        match kind {
            UploadKind::Xml => &self.xml,
            UploadKind::Rrd => &self.rrd,
        }
    }

    pub async fn ingest(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let kind = UploadKind::from_path(path)?;
        self.ingestor(kind).ingest(path).await
    }

    /// Result text for the uploader: the ingestor's report or failure message.
    pub async fn process(&self, path: &Path) -> String {
        match UploadKind::from_path(path) {
            Ok(kind) => self.ingestor(kind).process(path).await,
            Err(e) => {
                warn!(target = "ingest", path = %path.display(), "rejected upload");
                format!("Error: {}", e)
            }
        }
    }
}
