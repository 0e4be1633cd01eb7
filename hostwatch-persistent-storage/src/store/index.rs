use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hostwatch_core::Sample;

/// Time-ordered in-memory index over every stored sample.
///
/// Notes
/// - Keyed by `(timestamp, seq)` so iteration is naturally sorted by time and samples that
///   share a timestamp keep their insertion order.
/// - `latest` and time-bounded ranges are B-tree lookups, never full scans.
#[derive(Debug, Default)]
pub(crate) struct TimeIndex {
    map: BTreeMap<(DateTime<Utc>, u64), Sample>,
}

impl TimeIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Insert a sample under its assigned log sequence number.
    pub(crate) fn insert(&mut self, seq: u64, sample: Sample) {
        self.map.insert((sample.timestamp, seq), sample);
    }

    /// Sample with the greatest timestamp; the last inserted one wins a tie.
    pub(crate) fn latest(&self) -> Option<&Sample> {
        self.map.last_key_value().map(|(_, s)| s)
    }

    /// Samples with `timestamp >= since`, ascending.
    pub(crate) fn range_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Sample> + '_ {
        self.map.range((since, 0)..).map(|(_, s)| s)
    }

    /// Up to `limit` samples, newest first.
    pub(crate) fn recent(&self, limit: usize) -> impl Iterator<Item = &Sample> + '_ {
        self.map.values().rev().take(limit)
    }
}
