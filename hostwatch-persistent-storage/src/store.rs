use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use hostwatch_core::{BroadcastSink, Sample};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::errors::StorageError;

// Submodules for the write path, file replay and the time index
mod index;
mod reader;
mod writer;
use index::TimeIndex;
use writer::{LogCommand, WriterInit};

/// Append-only sample store with an in-memory time index, CRC32-protected frames,
/// batched flushes and file replay on open.
///
/// Every insert is visible to `latest`/`range` as soon as `insert` returns; durability
/// follows the writer's flush cadence (and `shutdown`).
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    next_seq: AtomicU64,
    index: RwLock<TimeIndex>,
    sink: Arc<dyn BroadcastSink>,
    log_path: Option<PathBuf>,
    // Background writer command channel; None when running memory-only
    cmd_tx: Option<mpsc::Sender<LogCommand>>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub dir: Option<PathBuf>,
    pub file_name: Option<String>, // default: samples.log
    pub fsync_interval_ms: Option<u64>, // default: 5
    pub max_batch_bytes: Option<usize>, // default: 8 KiB
}

impl StoreConfig {
    fn log_file_path(&self) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let name = self
            .file_name
            .clone()
            .unwrap_or_else(|| "samples.log".to_string());
        Some(dir.join(name))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("log_path", &self.inner.log_path)
            .field("next_seq", &self.inner.next_seq.load(Ordering::Acquire))
            .finish()
    }
}

impl Store {
    /// Memory-only store: nothing survives the process.
    pub fn in_memory(sink: Arc<dyn BroadcastSink>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                next_seq: AtomicU64::new(0),
                index: RwLock::new(TimeIndex::new()),
                sink,
                log_path: None,
                cmd_tx: None,
            }),
        }
    }

    /// Open a store, replaying any existing log in `cfg.dir` into the index.
    ///
    /// Without a directory the store runs memory-only.
    pub async fn open(
        cfg: StoreConfig,
        sink: Arc<dyn BroadcastSink>,
    ) -> Result<Self, StorageError> {
        let path = match cfg.log_file_path() {
            Some(p) => p,
            None => {
                warn!(
                    target = "store",
                    "store configured without a directory: operating in memory-only mode (no durability)"
                );
                return Ok(Self::in_memory(sink));
            }
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(format!("create store dir failed: {}", e)))?;
        }

        let replay = reader::replay_file(&path).await?;
        if replay.valid_len < replay.file_len {
            // Drop the torn tail so new frames are appended right after the last good one
            let f = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .await
                .map_err(|e| StorageError::Io(format!("open sample log for repair failed: {}", e)))?;
            f.set_len(replay.valid_len)
                .await
                .map_err(|e| StorageError::Io(format!("truncate torn tail failed: {}", e)))?;
        }

        let mut index = TimeIndex::new();
        let mut next_seq = 0u64;
        for (seq, sample) in replay.frames {
            next_seq = next_seq.max(seq.saturating_add(1));
            index.insert(seq, sample);
        }

        let fsync_interval_ms = cfg.fsync_interval_ms.unwrap_or(5);
        let max_batch_bytes = cfg.max_batch_bytes.unwrap_or(8 * 1024);
        info!(
            target = "store",
            log_file = %path.display(),
            replayed = index.len(),
            next_seq,
            fsync_interval_ms,
            max_batch_bytes,
            "store configuration applied"
        );

        let file = writer::open_log(&path).await?;
        let (cmd_tx, cmd_rx) = mpsc::channel(8192);
        let init = WriterInit {
            log_path: path.clone(),
            fsync_interval_ms,
            max_batch_bytes,
        };
        tokio::spawn(async move {
            writer::run(init, file, cmd_rx).await;
        });

        Ok(Self {
            inner: Arc::new(StoreInner {
                next_seq: AtomicU64::new(next_seq),
                index: RwLock::new(index),
                sink,
                log_path: Some(path),
                cmd_tx: Some(cmd_tx),
            }),
        })
    }

    /// Append a sample and notify the broadcast sink.
    ///
    /// The sample is queryable once this returns. A failing sink is logged and ignored.
    pub async fn insert(&self, sample: Sample) -> Result<(), StorageError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::AcqRel);

        if let Some(cmd_tx) = &self.inner.cmd_tx {
            let bytes = bincode::serialize(&sample)
                .map_err(|e| StorageError::Codec(format!("bincode serialize failed: {}", e)))?;
            cmd_tx
                .send(LogCommand::Write { seq, bytes })
                .await
                .map_err(|_| StorageError::Other("store writer channel closed".to_string()))?;
        }

        {
            let mut index = self.inner.index.write().await;
            index.insert(seq, sample.clone());
        }
        debug!(target = "store", seq, source = %sample.source, ts = %sample.timestamp, "sample stored");

        if let Err(e) = self.inner.sink.deliver(&sample) {
            warn!(
                target = "store",
                seq,
                error = %e,
                "failed to broadcast sample to live viewers"
            );
        }
        Ok(())
    }

    /// Sample with the greatest timestamp, or a zero-valued sample stamped now when empty.
    pub async fn latest(&self) -> Sample {
        let index = self.inner.index.read().await;
        index.latest().cloned().unwrap_or_else(Sample::empty_now)
    }

    /// Samples from the last `hours` hours, ascending by timestamp.
    pub async fn range(&self, hours: f64) -> Vec<Sample> {
        let millis = (hours * 3_600_000.0) as i64;
        let window = TimeDelta::try_milliseconds(millis).unwrap_or_else(TimeDelta::zero);
        let since = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.range_since(since).await
    }

    /// Samples with `timestamp >= since`, ascending by timestamp.
    pub async fn range_since(&self, since: DateTime<Utc>) -> Vec<Sample> {
        let index = self.inner.index.read().await;
        index.range_since(since).cloned().collect()
    }

    /// Up to `limit` most recent samples, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<Sample> {
        let index = self.inner.index.read().await;
        index.recent(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Path of the backing log file, if any.
    pub fn log_path(&self) -> Option<&PathBuf> {
        self.inner.log_path.as_ref()
    }

    /// Push buffered frames to disk and wait for the writer to confirm.
    ///
    /// Returns the writer's I/O error when the data did not reach the file.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let Some(cmd_tx) = &self.inner.cmd_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(LogCommand::Flush(tx))
            .await
            .map_err(|_| StorageError::Other("store writer channel closed".to_string()))?;
        rx.await
            .map_err(|_| StorageError::Other("store writer dropped flush ack".to_string()))?
    }

    /// Graceful shutdown: flush pending buffered data and stop the writer task.
    pub async fn shutdown(&self) {
        if let Some(cmd_tx) = &self.inner.cmd_tx {
            let (tx, rx) = oneshot::channel();
            // Ignore send error if writer already stopped
            let _ = cmd_tx.send(LogCommand::Shutdown(tx)).await;
            let _ = rx.await;
        }
    }
}
