use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::frames::encode_frame;

/// Commands sent from `Store::insert()` (and friends) to the background writer task.
///
/// The hot path only enqueues; the writer task owns all file I/O and applies batching and flushes.
#[derive(Debug)]
pub(crate) enum LogCommand {
    Write { seq: u64, bytes: Vec<u8> },
    // Acked with the outcome of writing and syncing everything buffered so far
    Flush(oneshot::Sender<Result<(), StorageError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Init parameters for the writer task captured at store startup.
pub(crate) struct WriterInit {
    pub log_path: PathBuf,
    pub fsync_interval_ms: u64,
    pub max_batch_bytes: usize,
}

/// Writer-owned state (no locking). Lives entirely inside the writer task.
///
/// Buffers frames and flushes them to disk once `max_batch_bytes` is exceeded or
/// `fsync_interval_ms` has passed since the last flush.
struct WriterState {
    writer: BufWriter<tokio::fs::File>,
    write_buf: Vec<u8>,
    last_flush: Instant,
    fsync_interval: Duration,
    max_batch_bytes: usize,
}

impl WriterState {
    /// Frame a sample into the in-memory buffer; flush if batch/time thresholds are exceeded.
    async fn process_write(&mut self, seq: u64, bytes: &[u8]) -> Result<(), StorageError> {
        encode_frame(&mut self.write_buf, seq, bytes);
        let should_flush_by_bytes = self.write_buf.len() >= self.max_batch_bytes;
        let should_flush_by_time = self.last_flush.elapsed() >= self.fsync_interval;
        if should_flush_by_bytes || should_flush_by_time {
            self.process_flush().await?;
        }
        Ok(())
    }

    /// Force buffered frames to disk and sync file data.
    ///
    /// Bytes are dropped from `write_buf` as soon as the file accepts them, so a retry
    /// after a failed write resumes where the previous attempt stopped.
    async fn process_flush(&mut self) -> Result<(), StorageError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        while !self.write_buf.is_empty() {
            let n = self
                .writer
                .write(&self.write_buf)
                .await
                .map_err(|e| StorageError::Io(format!("sample log write failed: {}", e)))?;
            if n == 0 {
                return Err(StorageError::Io(
                    "sample log write failed: file accepted no bytes".to_string(),
                ));
            }
            self.write_buf.drain(..n);
        }
        self.writer
            .flush()
            .await
            .map_err(|e| StorageError::Io(format!("sample log flush failed: {}", e)))?;
        self.writer
            .get_ref()
            .sync_data()
            .await
            .map_err(|e| StorageError::Io(format!("sample log sync failed: {}", e)))?;
        self.last_flush = Instant::now();
        Ok(())
    }
}

/// Open the log file for appending; used before spawning the writer so open errors
/// surface from `Store::open`.
pub(crate) async fn open_log(path: &PathBuf) -> Result<tokio::fs::File, StorageError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| StorageError::Io(format!("open sample log {} failed: {}", path.display(), e)))
}

/// Background writer task entrypoint.
///
/// Processes commands until `Shutdown` or until every sender is dropped, and flushes an
/// idle buffer on each interval tick so a quiet store still reaches disk.
pub(crate) async fn run(init: WriterInit, file: tokio::fs::File, mut rx: mpsc::Receiver<LogCommand>) {
    let fsync_interval = Duration::from_millis(init.fsync_interval_ms.max(1));
    let mut state = WriterState {
        writer: BufWriter::new(file),
        write_buf: Vec::with_capacity(init.max_batch_bytes),
        last_flush: Instant::now(),
        fsync_interval,
        max_batch_bytes: init.max_batch_bytes,
    };

    let mut ticker = tokio::time::interval(fsync_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately; idle flushes start one interval from now
    ticker.tick().await;

    debug!(target = "store", file = %init.log_path.display(), fsync_ms = init.fsync_interval_ms, max_batch = init.max_batch_bytes, "writer task started");
    loop {
        let cmd = tokio::select! {
            cmd = rx.recv() => cmd,
            _ = ticker.tick() => {
                if let Err(e) = state.process_flush().await {
                    warn!(target = "store", error = %e, "periodic flush failed");
                }
                continue;
            }
        };

        let res = match cmd {
            Some(LogCommand::Write { seq, bytes }) => state.process_write(seq, &bytes).await,
            Some(LogCommand::Flush(ack_tx)) => {
                let res = state.process_flush().await;
                if let Err(e) = &res {
                    warn!(target = "store", error = %e, "requested flush failed");
                }
                let _ = ack_tx.send(res);
                Ok(())
            }
            Some(LogCommand::Shutdown(ack_tx)) => {
                if let Err(e) = state.process_flush().await {
                    warn!(target = "store", error = %e, "flush on shutdown failed");
                }
                let _ = ack_tx.send(());
                debug!(target = "store", "writer task shutting down");
                break;
            }
            None => {
                if let Err(e) = state.process_flush().await {
                    warn!(target = "store", error = %e, "flush on channel close failed");
                }
                break;
            }
        };
        if let Err(e) = res {
            warn!(target = "store", error = %e, "background writer command failed");
        }
    }
}
