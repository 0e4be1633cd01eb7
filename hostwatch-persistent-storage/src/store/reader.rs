use std::path::Path;

use hostwatch_core::Sample;
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::frames::FrameIter;

/// Result of replaying an existing sample log.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    /// Decoded `(seq, sample)` pairs in file order.
    pub(crate) frames: Vec<(u64, Sample)>,
    /// Length of the prefix that ends on the last good frame.
    pub(crate) valid_len: u64,
    /// Total file length on disk.
    pub(crate) file_len: u64,
}

/// Read and decode every frame of the log at `path`.
///
/// Frame format
/// - `[u64 seq][u32 len][u32 crc][bytes]` with CRC32 over `bytes`, `bytes` being a bincode `Sample`.
/// - Stops on EOF, a partial frame or a CRC mismatch; everything before that is returned.
///
/// A missing file is an empty replay.
pub(crate) async fn replay_file(path: &Path) -> Result<Replay, StorageError> {
    let buf = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Replay::default()),
        Err(e) => {
            return Err(StorageError::Io(format!(
                "read sample log {} failed: {}",
                path.display(),
                e
            )))
        }
    };

    let mut iter = FrameIter::new(&buf);
    let mut frames = Vec::new();
    for frame in iter.by_ref() {
        let sample: Sample = bincode::deserialize(frame.payload).map_err(|e| {
            StorageError::Codec(format!("decode sample at seq {} failed: {}", frame.seq, e))
        })?;
        frames.push((frame.seq, sample));
    }
    let valid_len = iter.safe_len() as u64;
    let file_len = buf.len() as u64;

    if valid_len < file_len {
        warn!(
            target = "store",
            path = %path.display(),
            valid_len,
            file_len,
            "sample log has a torn or corrupt tail; stopping replay at last good frame"
        );
    }
    debug!(target = "store", path = %path.display(), count = frames.len(), "replayed frames from file");

    Ok(Replay {
        frames,
        valid_len,
        file_len,
    })
}
