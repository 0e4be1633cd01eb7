//! Live delivery of newly stored samples.
//!
//! The store calls a [`BroadcastSink`] after every insert. Delivery is best-effort:
//! the store logs a returned error and carries on, the insert itself never fails
//! because of it.

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;

use crate::sample::Sample;

/// Receiver of every sample the store accepts.
pub trait BroadcastSink: Send + Sync {
    fn deliver(&self, sample: &Sample) -> Result<()>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl BroadcastSink for NoopSink {
    fn deliver(&self, _sample: &Sample) -> Result<()> {
        Ok(())
    }
}

/// Fans samples out to any number of in-process subscribers over a tokio
/// broadcast channel. Lagging subscribers lose the oldest items.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<Sample>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BroadcastSink for ChannelSink {
    /// Nobody watching is not a failure; samples are simply not retained.
    fn deliver(&self, sample: &Sample) -> Result<()> {
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(sample.clone())
            .map(|_| ())
            .map_err(|_| anyhow!("no live subscribers"))
    }
}
