mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{memory_store, write_file, FixedMonitor, FixtureArchive, RrdFixture};
use hostwatch_agent::{IngestError, Ingestor, RrdIngestor, UploadRouter, XmlIngestor};
use hostwatch_core::SampleSource;
use hostwatch_persistent_storage::Store;

// This test module validates file ingestion end to end: parse, live fallback, store.
// Why: uploads are the only path for external data into the store, and a bad file must
// never leave a partial sample behind.
// Expected: well-formed files produce exactly one sample with the documented field
// sources; malformed files produce a descriptive message and no store entry.

// 2020-01-01T00:00:00Z, a multiple of every step used below
const BACKDATED: i64 = 1_577_836_800;

fn monitor() -> Arc<FixedMonitor> {
    Arc::new(FixedMonitor::new(3.0, 61.5, 33.0))
}

fn router(store: &Store, monitor: Arc<FixedMonitor>, data_source: Option<&str>) -> UploadRouter {
    UploadRouter::new(
        XmlIngestor::new(store.clone(), monitor.clone()),
        RrdIngestor::new(
            store.clone(),
            monitor,
            data_source.map(str::to_string),
            300,
        ),
    )
}

/// Test: XML export with a `util` datasource
///
/// Purpose
/// - The CPU figure comes from the `util` datasource while memory and disk come from
///   the live monitor at ingestion time.
///
/// Flow
/// - Ingest a document with datasources `util = 42.5` and `load = 1.5`.
///
/// Expected
/// - One stored sample: cpu 42.5, memory/disk equal to the monitor's readings,
///   source `uploaded_xml`, timestamp inside the call window, no network counter.
/// - Summary lists the datasources in name order.
#[tokio::test]
async fn test_xml_util_datasource() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let xml = XmlIngestor::new(store.clone(), monitor());
    let path = write_file(
        tmp.path(),
        "export.xml",
        br#"<?xml version="1.0"?>
<NAGIOS>
  <DATASOURCE><TEMPLATE>t</TEMPLATE><NAME>util</NAME><ACT>42.5</ACT></DATASOURCE>
  <DATASOURCE><NAME>load</NAME><ACT>1.5</ACT></DATASOURCE>
</NAGIOS>"#,
    );

    let before = Utc::now();
    let report = xml.ingest(&path).await.expect("ingest xml");
    let after = Utc::now();

    assert_eq!(report.summary, "Processed XML with CPU metrics: {load: 1.5, util: 42.5}");
    let sample = report.sample;
    assert_eq!(sample.cpu, 42.5);
    assert_eq!(sample.memory, 61.5);
    assert_eq!(sample.disk, 33.0);
    assert_eq!(sample.network, None);
    assert_eq!(sample.source, SampleSource::UploadedXml);
    assert!(sample.timestamp >= before && sample.timestamp <= after);

    assert_eq!(store.len().await, 1);
    assert_eq!(store.latest().await, sample);
}

#[tokio::test]
async fn test_xml_without_util_reports_zero_cpu() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let xml = XmlIngestor::new(store.clone(), monitor());
    let path = write_file(
        tmp.path(),
        "export.xml",
        b"<NAGIOS><DATASOURCE><NAME>load</NAME><ACT>1.5</ACT></DATASOURCE></NAGIOS>",
    );

    let report = xml.ingest(&path).await.expect("ingest xml");
    assert_eq!(report.sample.cpu, 0.0);
    assert_eq!(store.len().await, 1);
}

/// Test: malformed XML fails closed
///
/// Flow
/// - Store one sample, then process a document with a non-numeric ACT and one with
///   mismatched tags.
///
/// Expected
/// - Both return an `Error processing XML: ...` message naming the cause.
/// - The store still holds exactly the one earlier sample.
#[tokio::test]
async fn test_malformed_xml_stores_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let xml = XmlIngestor::new(store.clone(), monitor());

    let good = write_file(
        tmp.path(),
        "good.xml",
        b"<R><DATASOURCE><NAME>util</NAME><ACT>5</ACT></DATASOURCE></R>",
    );
    xml.ingest(&good).await.expect("ingest good xml");
    assert_eq!(store.len().await, 1);

    let non_numeric = write_file(
        tmp.path(),
        "bad.xml",
        b"<R><DATASOURCE><NAME>util</NAME><ACT>busy</ACT></DATASOURCE></R>",
    );
    let msg = xml.process(&non_numeric).await;
    assert!(msg.starts_with("Error processing XML: "), "{msg}");
    assert!(msg.contains("non-numeric ACT value 'busy'"), "{msg}");

    let broken = write_file(tmp.path(), "broken.xml", b"<R><DATASOURCE></R>");
    let msg = xml.process(&broken).await;
    assert!(msg.starts_with("Error processing XML: invalid XML document"), "{msg}");

    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_missing_file_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let xml = XmlIngestor::new(store.clone(), monitor());

    let err = xml.ingest(&tmp.path().join("absent.xml")).await.unwrap_err();
    assert!(matches!(err, IngestError::Io { .. }), "{err}");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_live_fallback_failure_stores_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let failing = Arc::new(FixedMonitor::new(0.0, 0.0, 0.0).failing());
    let xml = XmlIngestor::new(store.clone(), failing);
    let path = write_file(
        tmp.path(),
        "export.xml",
        b"<R><DATASOURCE><NAME>util</NAME><ACT>5</ACT></DATASOURCE></R>",
    );

    let err = xml.ingest(&path).await.unwrap_err();
    assert!(matches!(err, IngestError::SourceUnavailable(_)), "{err}");
    assert!(store.is_empty().await);
}

/// Test: RRD ingestion of a backdated file
///
/// Purpose
/// - The sample must carry the file's last-update instant, not the ingestion time,
///   and CPU is the mean of the trailing five-minute window.
///
/// Flow
/// - 60s steps, newest row at 2020-01-01T00:00:00Z. The last five rows hold
///   20, 30, 40, 50, 60; older rows hold 1 and must be ignored.
///
/// Expected
/// - cpu 40, timestamp 2020-01-01T00:00:00Z, source `uploaded_rrd`, memory/disk
///   from the monitor, summary `Processed RRD file. Average CPU: 40.0%`.
#[tokio::test]
async fn test_rrd_backdated_window_average() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let rrd = RrdIngestor::new(store.clone(), monitor(), None, 300);
    let path = RrdFixture::single(
        BACKDATED,
        7,
        &[1.0, 1.0, 1.0, 20.0, 30.0, 40.0, 50.0, 60.0],
    )
    .write(tmp.path(), "cpu.rrd");

    let report = rrd.ingest(&path).await.expect("ingest rrd");

    assert_eq!(report.summary, "Processed RRD file. Average CPU: 40.0%");
    let sample = report.sample;
    assert_eq!(sample.cpu, 40.0);
    assert_eq!(sample.timestamp, DateTime::<Utc>::from_timestamp(BACKDATED, 0).unwrap());
    assert_eq!(sample.memory, 61.5);
    assert_eq!(sample.disk, 33.0);
    assert_eq!(sample.source, SampleSource::UploadedRrd);

    // Backdated samples land at their historical position
    assert_eq!(store.len().await, 1);
    assert!(store.range(24.0).await.is_empty());
}

#[tokio::test]
async fn test_rrd_unknown_window_yields_zero() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let rrd = RrdIngestor::new(store.clone(), monitor(), None, 300);
    let path = RrdFixture::single(BACKDATED, 3, &[f64::NAN; 6]).write(tmp.path(), "idle.rrd");

    let msg = rrd.process(&path).await;
    assert_eq!(msg, "Processed RRD file. Average CPU: 0.0%");
    assert_eq!(store.latest().await.cpu, 0.0);
}

/// Test: designated data source and archive choice
///
/// Flow
/// - Two data sources (`load`, `busy`) and two AVERAGE archives: a one-step archive
///   covering only three minutes and a five-step archive covering fifty minutes.
/// - Ingest with `busy` designated and a 300s window.
///
/// Expected
/// - The five-step archive serves the window (the fine one cannot reach back far
///   enough); its newest row for `busy` is 12, the one before it is outside the window.
#[tokio::test]
async fn test_rrd_designated_source_and_coarse_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let fixture = RrdFixture {
        pdp_step: 60,
        last_update: BACKDATED,
        data_sources: vec!["load", "busy"],
        archives: vec![
            FixtureArchive {
                cf: "AVERAGE",
                pdp_cnt: 1,
                cur_row: 2,
                rows: vec![vec![0.5, 99.0]; 3],
            },
            FixtureArchive {
                cf: "AVERAGE",
                pdp_cnt: 5,
                cur_row: 9,
                rows: (0..10).map(|i| vec![0.5, 3.0 + i as f64]).collect(),
            },
            FixtureArchive {
                cf: "MAX",
                pdp_cnt: 1,
                cur_row: 0,
                rows: vec![vec![7.0, 7.0]; 100],
            },
        ],
    };
    let path = fixture.write(tmp.path(), "multi.rrd");

    let rrd = RrdIngestor::new(store.clone(), monitor(), Some("busy".to_string()), 300);
    let report = rrd.ingest(&path).await.expect("ingest rrd");
    assert_eq!(report.sample.cpu, 12.0);

    let missing = RrdIngestor::new(store.clone(), monitor(), Some("temp".to_string()), 300);
    let msg = missing.process(&path).await;
    assert!(msg.starts_with("Error processing RRD: "), "{msg}");
    assert!(msg.contains("data source 'temp' not found"), "{msg}");
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_rrd_structural_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let rrd = RrdIngestor::new(store.clone(), monitor(), None, 300);

    let full = RrdFixture::single(BACKDATED, 0, &[1.0, 2.0, 3.0, 4.0]).to_bytes();
    let truncated = write_file(tmp.path(), "short.rrd", &full[..full.len() - 8]);
    let msg = rrd.process(&truncated).await;
    assert!(msg.contains("truncated"), "{msg}");

    let mut foreign = full.clone();
    foreign[16..24].copy_from_slice(&1.0f64.to_le_bytes());
    let foreign = write_file(tmp.path(), "foreign.rrd", &foreign);
    let msg = rrd.process(&foreign).await;
    assert!(msg.contains("float cookie"), "{msg}");

    let mut bad_ptr = full.clone();
    let ptr_at = full.len() - 4 * 8 - 8;
    bad_ptr[ptr_at..ptr_at + 8].copy_from_slice(&4u64.to_le_bytes());
    let bad_ptr = write_file(tmp.path(), "ptr.rrd", &bad_ptr);
    let msg = rrd.process(&bad_ptr).await;
    assert!(msg.contains("row pointer 4 out of range"), "{msg}");

    let no_average = RrdFixture {
        pdp_step: 60,
        last_update: BACKDATED,
        data_sources: vec!["cpu"],
        archives: vec![FixtureArchive {
            cf: "MAX",
            pdp_cnt: 1,
            cur_row: 0,
            rows: vec![vec![1.0]; 4],
        }],
    }
    .write(tmp.path(), "max.rrd");
    let msg = rrd.process(&no_average).await;
    assert!(msg.contains("no AVERAGE archive"), "{msg}");

    assert!(store.is_empty().await);
}

/// Test: last-update instants outside the representable range
///
/// Purpose
/// - The last-update field comes straight from the uploaded bytes; a hostile value
///   must fail the upload with a message rather than overflow the window arithmetic.
///
/// Flow
/// - Process files whose last update is `i64::MIN + 5` and `i64::MAX`.
///
/// Expected
/// - Both return `Error processing RRD: ... out of range` and nothing is stored.
#[tokio::test]
async fn test_rrd_extreme_last_update_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let rrd = RrdIngestor::new(store.clone(), monitor(), None, 300);

    for (name, last_update) in [("min.rrd", i64::MIN + 5), ("max.rrd", i64::MAX)] {
        let path = RrdFixture::single(last_update, 0, &[1.0, 2.0]).write(tmp.path(), name);
        let msg = rrd.process(&path).await;
        assert!(msg.starts_with("Error processing RRD: "), "{msg}");
        assert!(msg.contains("out of range"), "{msg}");
    }
    assert!(store.is_empty().await);
}

/// Test: upload routing by extension
///
/// Expected
/// - `.xml`/`.RRD` reach their ingestors; `.txt` is rejected before any parsing and
///   leaves the store untouched.
#[tokio::test]
async fn test_router_dispatch_and_rejection() {
    let tmp = tempfile::tempdir().unwrap();
    let store = memory_store();
    let router = router(&store, monitor(), None);

    let xml = write_file(
        tmp.path(),
        "export.xml",
        b"<R><DATASOURCE><NAME>util</NAME><ACT>7</ACT></DATASOURCE></R>",
    );
    let rrd = RrdFixture::single(BACKDATED, 0, &[9.0]).write(tmp.path(), "CPU.RRD");
    let txt = write_file(tmp.path(), "notes.txt", b"util 50");

    assert_eq!(router.process(&xml).await, "Processed XML with CPU metrics: {util: 7}");
    assert_eq!(router.process(&rrd).await, "Processed RRD file. Average CPU: 9.0%");
    assert_eq!(store.len().await, 2);

    let err = router.ingest(&txt).await.unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedUpload(_)), "{err}");
    let msg = router.process(&txt).await;
    assert!(msg.contains("only .xml and .rrd files are accepted"), "{msg}");
    assert_eq!(store.len().await, 2);
}
