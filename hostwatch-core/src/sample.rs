use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Provenance of a sample. Kept for audit and filtering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    LiveMetrics,
    UploadedXml,
    UploadedRrd,
}

impl SampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleSource::LiveMetrics => "live_metrics",
            SampleSource::UploadedXml => "uploaded_xml",
            SampleSource::UploadedRrd => "uploaded_rrd",
        }
    }
}

impl Display for SampleSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable observation of host resource usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    // Instant the observation refers to; ingested files may report past instants
    pub timestamp: DateTime<Utc>,
    // CPU utilization percentage (0-100)
    pub cpu: f64,
    // Memory usage percentage (0-100)
    pub memory: f64,
    // Disk usage percentage (0-100)
    pub disk: f64,
    // Cumulative bytes sent since boot, when the producer can supply it
    pub network: Option<u64>,
    pub source: SampleSource,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        cpu: f64,
        memory: f64,
        disk: f64,
        network: Option<u64>,
        source: SampleSource,
    ) -> Self {
        Sample {
            timestamp,
            cpu,
            memory,
            disk,
            network,
            source,
        }
    }

    /// Zero-valued sample stamped with the current instant.
    ///
    /// Returned by the store when it holds nothing yet, so readers never have to
    /// treat "no data" as an error.
    pub fn empty_now() -> Self {
        Sample {
            timestamp: Utc::now(),
            cpu: 0.0,
            memory: 0.0,
            disk: 0.0,
            network: Some(0),
            source: SampleSource::LiveMetrics,
        }
    }

    /// Network byte counter, reading an absent counter as zero.
    pub fn network_bytes(&self) -> u64 {
        self.network.unwrap_or(0)
    }
}

/// Payload pushed to live viewers for every newly stored sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    // Wall-clock time of the sample, `HH:MM:SS`
    pub timestamp: String,
}

impl From<&Sample> for LiveUpdate {
    fn from(sample: &Sample) -> Self {
        LiveUpdate {
            cpu: sample.cpu,
            memory: sample.memory,
            disk: sample.disk,
            timestamp: sample.timestamp.format("%H:%M:%S").to_string(),
        }
    }
}

impl LiveUpdate {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
