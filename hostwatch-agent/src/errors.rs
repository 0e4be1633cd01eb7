use hostwatch_persistent_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed document structure, missing required field or non-numeric value.
    #[error("invalid {format} document: {reason}")]
    Parse { format: &'static str, reason: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Live counters needed for the memory/disk fallback could not be read.
    #[error("live system counters unavailable: {0}")]
    SourceUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("unsupported upload {0}: only .xml and .rrd files are accepted")]
    UnsupportedUpload(String),
}

impl IngestError {
    pub(crate) fn xml(reason: impl Into<String>) -> Self {
        IngestError::Parse {
            format: "XML",
            reason: reason.into(),
        }
    }

    pub(crate) fn rrd(reason: impl Into<String>) -> Self {
        IngestError::Parse {
            format: "RRD",
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("live system counters unavailable: {0}")]
    SourceUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
