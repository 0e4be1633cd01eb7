use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hostwatch_core::{Sample, SampleSource};
use hostwatch_persistent_storage::Store;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::info;

use super::{read_fallback, read_file, IngestReport, Ingestor};
use crate::errors::IngestError;
use crate::resource_monitor::ResourceMonitor;

const DATASOURCE_TAG: &[u8] = b"DATASOURCE";
const NAME_TAG: &[u8] = b"NAME";
const ACT_TAG: &[u8] = b"ACT";

/// Datasource name whose current value is reported as CPU utilization.
pub const CPU_DATASOURCE: &str = "util";

/// A `DATASOURCE` element whose closing tag has not been seen yet.
struct PendingDatasource {
    // Index of the DATASOURCE element in the open-element path
    depth: usize,
    name: Option<String>,
    act: Option<String>,
}

impl PendingDatasource {
    fn finish(self) -> Result<(String, f64), IngestError> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IngestError::xml("DATASOURCE element without NAME"))?;
        let raw = self
            .act
            .ok_or_else(|| IngestError::xml(format!("datasource '{}' has no ACT value", name)))?;
        let value = raw.trim().parse::<f64>().map_err(|_| {
            IngestError::xml(format!(
                "datasource '{}' has non-numeric ACT value '{}'",
                name,
                raw.trim()
            ))
        })?;
        Ok((name, value))
    }
}

/// Text slot for a NAME/ACT element that is a direct child of the innermost open datasource.
fn child_field<'a>(
    open: &'a mut [PendingDatasource],
    child_depth: usize,
    tag: &[u8],
) -> Option<&'a mut Option<String>> {
    let ds = open.last_mut()?;
    if ds.depth + 1 != child_depth {
        return None;
    }
    if tag == NAME_TAG {
        Some(&mut ds.name)
    } else if tag == ACT_TAG {
        Some(&mut ds.act)
    } else {
        None
    }
}

/// Extract every `DATASOURCE` element's `NAME` -> `ACT` mapping from an export document.
///
/// Datasources may sit at any depth. A later datasource with a repeated name replaces
/// the earlier value.
pub fn parse_datasources(text: &str) -> Result<BTreeMap<String, f64>, IngestError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut open: Vec<PendingDatasource> = Vec::new();
    let mut datasources = BTreeMap::new();
    let mut saw_root = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            IngestError::xml(format!("{} (at byte {})", e, reader.error_position()))
        })?;
        match event {
            Event::Start(e) => {
                saw_root = true;
                let tag = e.local_name().as_ref().to_vec();
                if tag == DATASOURCE_TAG {
                    open.push(PendingDatasource {
                        depth: path.len(),
                        name: None,
                        act: None,
                    });
                }
                path.push(tag);
            }
            Event::Empty(e) => {
                saw_root = true;
                let tag = e.local_name();
                if tag.as_ref() == DATASOURCE_TAG {
                    return Err(IngestError::xml("DATASOURCE element without NAME"));
                }
                if let Some(slot) = child_field(&mut open, path.len(), tag.as_ref()) {
                    slot.get_or_insert_with(String::new);
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| IngestError::xml(format!("bad text content: {}", e)))?;
                if let Some(tag) = path.last() {
                    if let Some(slot) = child_field(&mut open, path.len() - 1, tag) {
                        slot.get_or_insert_with(String::new).push_str(&text);
                    }
                }
            }
            Event::CData(c) => {
                let text = std::str::from_utf8(&c)
                    .map_err(|e| IngestError::xml(format!("bad CDATA content: {}", e)))?;
                if let Some(tag) = path.last() {
                    if let Some(slot) = child_field(&mut open, path.len() - 1, tag) {
                        slot.get_or_insert_with(String::new).push_str(text);
                    }
                }
            }
            Event::End(_) => {
                if let Some(tag) = path.pop() {
                    if tag == DATASOURCE_TAG {
                        if let Some(ds) = open.pop() {
                            let (name, value) = ds.finish()?;
                            datasources.insert(name, value);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(tag) = path.last() {
        return Err(IngestError::xml(format!(
            "unexpected end of document inside <{}>",
            String::from_utf8_lossy(tag)
        )));
    }
    if !saw_root {
        return Err(IngestError::xml("document has no root element"));
    }
    Ok(datasources)
}

fn summarize(datasources: &BTreeMap<String, f64>) -> String {
    let pairs: Vec<String> = datasources
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect();
    format!("Processed XML with CPU metrics: {{{}}}", pairs.join(", "))
}

/// Ingests data-source export documents.
///
/// `cpu` comes from the `util` datasource (0 when absent). The format carries no
/// memory or disk figures and no trusted timestamp, so those come from a live read
/// and the ingestion instant.
pub struct XmlIngestor {
    store: Store,
    monitor: Arc<dyn ResourceMonitor>,
}

impl XmlIngestor {
    pub fn new(store: Store, monitor: Arc<dyn ResourceMonitor>) -> Self {
        Self { store, monitor }
    }
}

#[async_trait]
impl Ingestor for XmlIngestor {
    fn format(&self) -> &'static str {
        "XML"
    }

    async fn ingest(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let bytes = read_file(path).await?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| IngestError::xml(format!("document is not valid UTF-8: {}", e)))?;
        let datasources = parse_datasources(text)?;
        let cpu = datasources.get(CPU_DATASOURCE).copied().unwrap_or(0.0);

        let fallback = read_fallback(self.monitor.as_ref()).await?;
        let sample = Sample::new(
            Utc::now(),
            cpu,
            fallback.memory,
            fallback.disk,
            None,
            SampleSource::UploadedXml,
        );
        self.store.insert(sample.clone()).await?;

        info!(
            target = "ingest",
            path = %path.display(),
            datasources = datasources.len(),
            cpu,
            "ingested XML export"
        );
        Ok(IngestReport {
            sample,
            summary: summarize(&datasources),
        })
    }
}
