//! Wires the store, live sink, monitor and the sample producers/consumers together.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hostwatch_core::{ChannelSink, LiveUpdate};
use hostwatch_persistent_storage::Store;
use tokio::sync::watch;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::collector::Collector;
use crate::errors::IngestError;
use crate::ingest::{IngestReport, RrdIngestor, UploadRouter, XmlIngestor};
use crate::query::QueryResponder;
use crate::resource_monitor::{NativeResourceMonitor, ResourceMonitor};
use crate::service_configuration::ServiceConfiguration;

/// One running agent: a single store handle shared by every component.
pub struct HostwatchAgent {
    config: ServiceConfiguration,
    store: Store,
    sink: ChannelSink,
    collector: Arc<Collector>,
    router: UploadRouter,
    responder: QueryResponder,
}

impl HostwatchAgent {
    /// Open the store from `config` and read the live host through sysinfo.
    pub async fn start(config: ServiceConfiguration) -> Result<Self> {
        let monitor = Arc::new(NativeResourceMonitor::new(config.disk_mount.clone()));
        Self::with_monitor(config, monitor).await
    }

    pub async fn with_monitor(
        config: ServiceConfiguration,
        monitor: Arc<dyn ResourceMonitor>,
    ) -> Result<Self> {
        let sink = ChannelSink::new(config.broadcast_capacity);
        let store = Store::open(config.storage.clone(), Arc::new(sink.clone()))
            .await
            .context("Failed to open sample store")?;

        let collector = Arc::new(Collector::new(store.clone(), monitor.clone()));
        let router = UploadRouter::new(
            XmlIngestor::new(store.clone(), monitor.clone()),
            RrdIngestor::new(
                store.clone(),
                monitor,
                config.rrd_data_source.clone(),
                config.rrd_window_secs,
            ),
        );
        let responder = QueryResponder::new(store.clone(), config.history_window);

        Ok(Self {
            config,
            store,
            sink,
            collector,
            router,
            responder,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn responder(&self) -> &QueryResponder {
        &self.responder
    }

    /// Live updates for every stored sample, as viewer payloads.
    pub fn live_updates(&self) -> impl tokio_stream::Stream<Item = LiveUpdate> {
        BroadcastStream::new(self.sink.subscribe()).filter_map(|item| match item {
            Ok(sample) => Some(LiveUpdate::from(&sample)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(target = "store", skipped, "live viewer lagged, updates dropped");
                None
            }
        })
    }

    pub async fn ingest(&self, path: &Path) -> Result<IngestReport, IngestError> {
        self.router.ingest(path).await
    }

    pub async fn process_upload(&self, path: &Path) -> String {
        self.router.process(path).await
    }

    pub async fn answer(&self, question: &str) -> String {
        self.responder.answer(question).await
    }

    /// Run the collector until `shutdown` fires, logging each live update, then
    /// flush the store.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let collector = self.collector.clone();
        let period = self.config.collect_interval;
        let collector_task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { collector.run(period, shutdown).await }
        });

        let mut updates = Box::pin(self.live_updates());
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                update = updates.next() => match update {
                    Some(update) => match update.to_json() {
                        Ok(json) => info!(target = "collector", update = %json, "live update"),
                        Err(e) => warn!(target = "collector", error = %e, "failed to encode live update"),
                    },
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        collector_task.await.context("collector task panicked")?;
        self.close().await
    }

    /// Flush the store, reporting a failed write, then stop its writer.
    pub async fn close(&self) -> Result<()> {
        let flushed = self
            .store
            .flush()
            .await
            .context("Failed to flush sample store");
        self.store.shutdown().await;
        flushed
    }
}
