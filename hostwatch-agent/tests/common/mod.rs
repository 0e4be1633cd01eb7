use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hostwatch_agent::ResourceMonitor;
use hostwatch_core::NoopSink;
use hostwatch_persistent_storage::Store;

/// Resource monitor returning fixed readings; can be switched into a failing state.
#[allow(dead_code)]
pub struct FixedMonitor {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: Option<u64>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl FixedMonitor {
    pub fn new(cpu: f64, memory: f64, disk: f64) -> Self {
        Self {
            cpu,
            memory,
            disk,
            network: Some(4096),
            failing: AtomicBool::new(false),
        }
    }

    pub fn without_network(mut self) -> Self {
        self.network = None;
        self
    }

    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("counters unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResourceMonitor for FixedMonitor {
    async fn get_cpu_usage(&self) -> Result<f64> {
        self.check().map(|_| self.cpu)
    }

    async fn get_memory_usage(&self) -> Result<f64> {
        self.check().map(|_| self.memory)
    }

    async fn get_disk_usage(&self) -> Result<f64> {
        self.check().map(|_| self.disk)
    }

    async fn get_network_sent(&self) -> Result<u64> {
        self.check()?;
        self.network.ok_or_else(|| anyhow!("no network interfaces"))
    }
}

#[allow(dead_code)]
pub fn memory_store() -> Store {
    Store::in_memory(Arc::new(NoopSink))
}

#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

/// One archive of an RRD fixture. `rows[i]` holds one value per data source.
#[allow(dead_code)]
pub struct FixtureArchive {
    pub cf: &'static str,
    pub pdp_cnt: u64,
    pub cur_row: u64,
    pub rows: Vec<Vec<f64>>,
}

/// Builds binary RRD files in the 64-bit little-endian layout.
#[allow(dead_code)]
pub struct RrdFixture {
    pub pdp_step: u64,
    pub last_update: i64,
    pub data_sources: Vec<&'static str>,
    pub archives: Vec<FixtureArchive>,
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; 20];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
}

#[allow(dead_code)]
impl RrdFixture {
    /// Single GAUGE data source with one AVERAGE archive of one-step rows.
    pub fn single(last_update: i64, cur_row: u64, values: &[f64]) -> Self {
        Self {
            pdp_step: 60,
            last_update,
            data_sources: vec!["cpu"],
            archives: vec![FixtureArchive {
                cf: "AVERAGE",
                pdp_cnt: 1,
                cur_row,
                rows: values.iter().map(|v| vec![*v]).collect(),
            }],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let ds_cnt = self.data_sources.len();
        let rra_cnt = self.archives.len();
        let mut out = Vec::new();

        // stat_head
        out.extend_from_slice(b"RRD\0");
        out.extend_from_slice(b"0003\0");
        out.extend_from_slice(&[0u8; 7]);
        out.extend_from_slice(&8.642135E130f64.to_le_bytes());
        out.extend_from_slice(&(ds_cnt as u64).to_le_bytes());
        out.extend_from_slice(&(rra_cnt as u64).to_le_bytes());
        out.extend_from_slice(&self.pdp_step.to_le_bytes());
        out.extend_from_slice(&[0u8; 80]);
        assert_eq!(out.len(), 128);

        for name in &self.data_sources {
            put_name(&mut out, name);
            put_name(&mut out, "GAUGE");
            out.extend_from_slice(&[0u8; 80]);
        }
        for rra in &self.archives {
            put_name(&mut out, rra.cf);
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&(rra.rows.len() as u64).to_le_bytes());
            out.extend_from_slice(&rra.pdp_cnt.to_le_bytes());
            out.extend_from_slice(&[0u8; 80]);
        }

        // live_head
        out.extend_from_slice(&self.last_update.to_le_bytes());
        out.extend_from_slice(&0i64.to_le_bytes());

        out.extend(std::iter::repeat(0u8).take(112 * ds_cnt));
        out.extend(std::iter::repeat(0u8).take(80 * ds_cnt * rra_cnt));
        for rra in &self.archives {
            out.extend_from_slice(&rra.cur_row.to_le_bytes());
        }
        for rra in &self.archives {
            for row in &rra.rows {
                assert_eq!(row.len(), ds_cnt);
                for v in row {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        out
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        write_file(dir, name, &self.to_bytes())
    }
}
