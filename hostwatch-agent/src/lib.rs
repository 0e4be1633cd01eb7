//! Host metrics agent: live collection, monitoring-file ingestion and question
//! answering over a shared sample store.

pub mod agent;
pub mod collector;
mod errors;
pub mod ingest;
pub mod query;
pub mod resource_monitor;
pub mod service_configuration;

pub use agent::HostwatchAgent;
pub use collector::Collector;
pub use errors::{CollectError, IngestError};
pub use ingest::{IngestReport, Ingestor, RrdIngestor, UploadKind, UploadRouter, XmlIngestor};
pub use query::{classify, QueryCategory, QueryResponder};
pub use resource_monitor::{LiveFallback, NativeResourceMonitor, ResourceMonitor};
pub use service_configuration::{LoadConfiguration, ServiceConfiguration};
