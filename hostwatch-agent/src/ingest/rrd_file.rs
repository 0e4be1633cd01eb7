//! Native reader for binary round-robin-database files.
//!
//! Layout (64-bit little-endian, 8-byte aligned; sizes in bytes):
//!
//! ```text
//! stat_head   128   cookie "RRD\0" | version "000N\0" | pad | f64 float cookie
//!                   | u64 ds_cnt | u64 rra_cnt | u64 pdp_step | 10 x u64 params
//! ds_def      120   per data source: name[20] | type[20] | 10 x u64 params
//! rra_def     120   per archive: cf[20] | pad | u64 row_cnt | u64 pdp_cnt | 10 x u64 params
//! live_head   8/16  i64 last_up (+ i64 last_up_usec from version 0003)
//! pdp_prep    112   per data source
//! cdp_prep    80    per archive per data source
//! rra_ptr     8     per archive: u64 cur_row
//! data              per archive: row_cnt x ds_cnt f64, row-major ring buffer
//! ```

use chrono::{DateTime, Utc};

use crate::errors::IngestError;

const COOKIE: &[u8; 4] = b"RRD\0";
const FLOAT_COOKIE: f64 = 8.642135E130;

const STAT_HEAD_SIZE: usize = 128;
const DS_DEF_SIZE: usize = 120;
const RRA_DEF_SIZE: usize = 120;
const PDP_PREP_SIZE: usize = 112;
const CDP_PREP_SIZE: usize = 80;
const NAME_LEN: usize = 20;

/// Consolidation function of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationFn {
    Average,
    Min,
    Max,
    Last,
    Other(String),
}

impl ConsolidationFn {
    fn parse(name: &str) -> Self {
        match name {
            "AVERAGE" => ConsolidationFn::Average,
            "MIN" => ConsolidationFn::Min,
            "MAX" => ConsolidationFn::Max,
            "LAST" => ConsolidationFn::Last,
            other => ConsolidationFn::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceDef {
    pub name: String,
    pub kind: String,
}

/// One round-robin archive with its ring buffer of consolidated rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    pub cf: ConsolidationFn,
    pub row_cnt: u64,
    pub pdp_cnt: u64,
    // Ring index of the most recently written row
    pub cur_row: u64,
    // row_cnt * ds_cnt values, row-major
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RrdFile {
    pub version: u32,
    pub pdp_step: u64,
    pub last_update: i64,
    pub last_update_usec: i64,
    pub data_sources: Vec<DataSourceDef>,
    pub archives: Vec<Archive>,
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IngestError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| IngestError::rrd(format!("file truncated at byte {}", self.pos)))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), IngestError> {
        self.take(n).map(|_| ())
    }

    fn u64(&mut self) -> Result<u64, IngestError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().map_err(|_| IngestError::rrd("short read"))?))
    }

    fn i64(&mut self) -> Result<i64, IngestError> {
        self.u64().map(|v| v as i64)
    }

    fn f64(&mut self) -> Result<f64, IngestError> {
        self.u64().map(f64::from_bits)
    }

    /// NUL-terminated string stored in a fixed-size field.
    fn fixed_str(&mut self, len: usize) -> Result<String, IngestError> {
        let raw = self.take(len)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

impl RrdFile {
    /// Parse an RRD file image.
    pub fn parse(buf: &[u8]) -> Result<Self, IngestError> {
        let mut r = ByteReader::new(buf);

        // stat_head
        if r.take(4)? != COOKIE {
            return Err(IngestError::rrd("not an RRD file (bad cookie)"));
        }
        let version_str = r.fixed_str(5)?;
        let version = match version_str.as_str() {
            "0001" => 1,
            "0002" => 2,
            "0003" => 3,
            "0004" => 4,
            other => {
                return Err(IngestError::rrd(format!(
                    "unsupported RRD version '{}'",
                    other
                )))
            }
        };
        r.skip(7)?;
        let float_cookie = r.f64()?;
        if float_cookie != FLOAT_COOKIE {
            return Err(IngestError::rrd(
                "float cookie mismatch: file was created on an incompatible architecture",
            ));
        }
        let ds_cnt = r.u64()?;
        let rra_cnt = r.u64()?;
        let pdp_step = r.u64()?;
        r.skip(STAT_HEAD_SIZE - r.pos)?;

        if ds_cnt == 0 {
            return Err(IngestError::rrd("file defines no data sources"));
        }
        if rra_cnt == 0 {
            return Err(IngestError::rrd("file defines no archives"));
        }
        if pdp_step == 0 {
            return Err(IngestError::rrd("pdp_step is zero"));
        }
        // Bound the counts by the file size before allocating anything
        let min_defs =
            (ds_cnt as u128) * DS_DEF_SIZE as u128 + (rra_cnt as u128) * RRA_DEF_SIZE as u128;
        if min_defs > buf.len() as u128 {
            return Err(IngestError::rrd("file truncated: header counts exceed file size"));
        }
        let ds_cnt = ds_cnt as usize;
        let rra_cnt = rra_cnt as usize;

        // ds_def
        let mut data_sources = Vec::with_capacity(ds_cnt);
        for _ in 0..ds_cnt {
            let name = r.fixed_str(NAME_LEN)?;
            let kind = r.fixed_str(NAME_LEN)?;
            r.skip(DS_DEF_SIZE - 2 * NAME_LEN)?;
            data_sources.push(DataSourceDef { name, kind });
        }

        // rra_def
        let mut defs = Vec::with_capacity(rra_cnt);
        for _ in 0..rra_cnt {
            let cf = ConsolidationFn::parse(&r.fixed_str(NAME_LEN)?);
            r.skip(4)?;
            let row_cnt = r.u64()?;
            let pdp_cnt = r.u64()?;
            r.skip(RRA_DEF_SIZE - 40)?;
            if row_cnt == 0 || pdp_cnt == 0 {
                return Err(IngestError::rrd("archive with zero rows or zero pdp_cnt"));
            }
            defs.push((cf, row_cnt, pdp_cnt));
        }

        // live_head
        let last_update = r.i64()?;
        let last_update_usec = if version >= 3 { r.i64()? } else { 0 };
        if DateTime::from_timestamp(last_update, 0).is_none() {
            return Err(IngestError::rrd(format!(
                "last update {} out of range",
                last_update
            )));
        }

        // pdp_prep + cdp_prep are consolidation scratch space; not needed for fetch
        r.skip(PDP_PREP_SIZE * ds_cnt)?;
        r.skip(
            CDP_PREP_SIZE
                .checked_mul(rra_cnt)
                .and_then(|n| n.checked_mul(ds_cnt))
                .ok_or_else(|| IngestError::rrd("header counts overflow"))?,
        )?;

        // rra_ptr
        let mut cur_rows = Vec::with_capacity(rra_cnt);
        for (cf, row_cnt, _) in &defs {
            let cur_row = r.u64()?;
            if cur_row >= *row_cnt {
                return Err(IngestError::rrd(format!(
                    "{:?} archive row pointer {} out of range ({} rows)",
                    cf, cur_row, row_cnt
                )));
            }
            cur_rows.push(cur_row);
        }

        // data
        let mut archives = Vec::with_capacity(rra_cnt);
        for ((cf, row_cnt, pdp_cnt), cur_row) in defs.into_iter().zip(cur_rows) {
            let count = (row_cnt as u128) * ds_cnt as u128;
            if count * 8 > (buf.len() - r.pos) as u128 {
                return Err(IngestError::rrd(format!(
                    "file truncated: archive data needs {} values",
                    count
                )));
            }
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(r.f64()?);
            }
            archives.push(Archive {
                cf,
                row_cnt,
                pdp_cnt,
                cur_row,
                values,
            });
        }

        Ok(RrdFile {
            version,
            pdp_step,
            last_update,
            last_update_usec,
            data_sources,
            archives,
        })
    }

    /// Instant of the last update recorded in the file.
    pub fn last_update_time(&self) -> Result<DateTime<Utc>, IngestError> {
        let nanos = (self.last_update_usec.clamp(0, 999_999) * 1_000) as u32;
        DateTime::from_timestamp(self.last_update, nanos).ok_or_else(|| {
            IngestError::rrd(format!("last update {} out of range", self.last_update))
        })
    }

    /// Index of the named data source, or of the first one when `name` is `None`.
    pub fn data_source_index(&self, name: Option<&str>) -> Result<usize, IngestError> {
        match name {
            None => Ok(0),
            Some(name) => self
                .data_sources
                .iter()
                .position(|ds| ds.name == name)
                .ok_or_else(|| {
                    let available: Vec<&str> =
                        self.data_sources.iter().map(|ds| ds.name.as_str()).collect();
                    IngestError::rrd(format!(
                        "data source '{}' not found (available: {})",
                        name,
                        available.join(", ")
                    ))
                }),
        }
    }

    fn step_of(&self, archive: &Archive) -> i64 {
        (self.pdp_step.saturating_mul(archive.pdp_cnt)).clamp(1, i64::MAX as u64) as i64
    }

    /// Timestamp of the newest row of `archive`.
    fn newest_row_time(&self, archive: &Archive) -> i64 {
        let step = self.step_of(archive);
        self.last_update
            .saturating_sub(self.last_update.rem_euclid(step))
    }

    /// Oldest instant whose consolidated value the archive still holds.
    fn coverage_start(&self, archive: &Archive) -> i64 {
        let span = self
            .step_of(archive)
            .saturating_mul(archive.row_cnt.min(i64::MAX as u64) as i64);
        self.newest_row_time(archive).saturating_sub(span)
    }

    /// Pick the archive serving `cf` over a window starting at `start`: the finest step
    /// that reaches back far enough, else the one reaching back furthest.
    pub fn select_archive(&self, cf: &ConsolidationFn, start: i64) -> Option<&Archive> {
        let candidates = self.archives.iter().filter(|a| &a.cf == cf);
        let covering = candidates
            .clone()
            .filter(|a| self.coverage_start(a) <= start)
            .min_by_key(|a| self.step_of(a));
        covering.or_else(|| candidates.min_by_key(|a| self.coverage_start(a)))
    }

    /// Values of data source `ds` from the `AVERAGE` archive for `[start, end]`, oldest
    /// first. Unknown (NaN) rows are left out, so the series may be empty.
    pub fn fetch_average(&self, ds: usize, start: i64, end: i64) -> Result<Vec<f64>, IngestError> {
        if ds >= self.data_sources.len() {
            return Err(IngestError::rrd(format!("data source index {} out of range", ds)));
        }
        let archive = self
            .select_archive(&ConsolidationFn::Average, start)
            .ok_or_else(|| IngestError::rrd("file has no AVERAGE archive"))?;

        let step = self.step_of(archive);
        let start_aligned = start.saturating_sub(start.rem_euclid(step));
        let newest = self.newest_row_time(archive);
        let ds_cnt = self.data_sources.len();
        let row_cnt = archive.row_cnt;

        let mut series = Vec::new();
        for k in 0..row_cnt {
            let t = newest.saturating_sub(step.saturating_mul(k.min(i64::MAX as u64) as i64));
            if t <= start_aligned {
                break;
            }
            if t > end {
                continue;
            }
            let row = ((archive.cur_row + row_cnt - k) % row_cnt) as usize;
            let value = *archive
                .values
                .get(row * ds_cnt + ds)
                .ok_or_else(|| IngestError::rrd(format!("archive row {} missing", row)))?;
            if !value.is_nan() {
                series.push(value);
            }
        }
        series.reverse();
        Ok(series)
    }
}
