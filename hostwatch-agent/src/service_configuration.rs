use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hostwatch_persistent_storage::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::ingest::DEFAULT_RRD_WINDOW_SECS;
use crate::query::DEFAULT_HISTORY_WINDOW;

const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_DISK_MOUNT: &str = "/";
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// configuration settings loaded from the config file; every section is optional
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfiguration {
    /// Live collection cadence and disk selection
    pub collector: CollectorNode,
    /// Sample log location and flush tuning; memory-only when `dir` is unset
    pub storage: StorageNode,
    /// Live update channel
    pub broadcast: BroadcastNode,
    /// Query responder tuning
    pub query: QueryNode,
    /// RRD upload handling
    pub rrd: RrdNode,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorNode {
    pub interval_secs: Option<u64>,
    pub disk_mount: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageNode {
    pub dir: Option<String>,
    pub file_name: Option<String>,
    pub fsync_interval_ms: Option<u64>,
    pub max_batch_bytes: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastNode {
    pub capacity: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryNode {
    pub history_window: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RrdNode {
    /// Data source averaged for CPU; the file's first one when unset
    pub data_source: Option<String>,
    pub window_secs: Option<u64>,
}

/// Validated agent settings with defaults applied.
#[derive(Debug, Clone)]
pub struct ServiceConfiguration {
    pub collect_interval: Duration,
    pub disk_mount: PathBuf,
    pub storage: StoreConfig,
    pub broadcast_capacity: usize,
    pub history_window: usize,
    pub rrd_data_source: Option<String>,
    pub rrd_window_secs: u64,
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        Self {
            collect_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            disk_mount: PathBuf::from(DEFAULT_DISK_MOUNT),
            storage: StoreConfig::default(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            history_window: DEFAULT_HISTORY_WINDOW,
            rrd_data_source: None,
            rrd_window_secs: DEFAULT_RRD_WINDOW_SECS,
        }
    }
}

fn positive<T: PartialEq + Default + Copy>(value: Option<T>, default: T, field: &str) -> Result<T> {
    match value {
        Some(v) if v == T::default() => bail!("{} must be greater than zero", field),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let interval_secs = positive(
            config.collector.interval_secs,
            DEFAULT_INTERVAL_SECS,
            "collector.interval_secs",
        )?;
        let disk_mount = config
            .collector
            .disk_mount
            .unwrap_or_else(|| DEFAULT_DISK_MOUNT.to_string());

        let storage = StoreConfig {
            dir: config.storage.dir.map(PathBuf::from),
            file_name: config.storage.file_name,
            fsync_interval_ms: config.storage.fsync_interval_ms,
            max_batch_bytes: config.storage.max_batch_bytes,
        };

        Ok(ServiceConfiguration {
            collect_interval: Duration::from_secs(interval_secs),
            disk_mount: PathBuf::from(disk_mount),
            storage,
            broadcast_capacity: positive(
                config.broadcast.capacity,
                DEFAULT_BROADCAST_CAPACITY,
                "broadcast.capacity",
            )?,
            history_window: positive(
                config.query.history_window,
                DEFAULT_HISTORY_WINDOW,
                "query.history_window",
            )?,
            rrd_data_source: config.rrd.data_source,
            rrd_window_secs: positive(
                config.rrd.window_secs,
                DEFAULT_RRD_WINDOW_SECS,
                "rrd.window_secs",
            )?,
        })
    }
}

impl ServiceConfiguration {
    /// Load and validate a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let load_config: LoadConfiguration =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        load_config.try_into()
    }
}
