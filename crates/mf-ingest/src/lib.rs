//! # mf-ingest
//!
//! Ingestion pipeline for monitoring samples sent by workflow agents.
//!
//! Samples are routed to a per-workflow, per-task partition of a search
//! backend, with the experiment identifier as the document sub-type.
//!
//! ## Pipeline
//!
//! - **Timestamps**: [`timestamp::normalize`] rewrites epoch and sloppy
//!   timestamps into `YYYY-MM-DDTHH:mm:ss.sss` and stamps the arrival time
//! - **Partitions**: [`partition::resolve`] maps identifiers to a partition
//!   name, [`Provisioner`] creates missing partitions and tolerates races
//! - **Writes**: [`WriteExecutor`] issues single and bulk writes
//! - **Links**: [`LinkBuilder`] builds the profile URL returned per record
//!
//! [`Ingestor`] ties the steps together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mf_ingest::{IngestConfig, Ingestor, MemoryBackend, MetricSample};
//!
//! # async fn run() -> mf_ingest::Result<()> {
//! let ingestor = Ingestor::new(
//!     Arc::new(MemoryBackend::new()),
//!     IngestConfig::new("http://localhost:3040/v1"),
//! );
//! let sample = MetricSample::new("hpcfapix", "AVNXMXcvGMPeuCn4bMe0")
//!     .with_task("vector_scal01")
//!     .field("GPU0:power", 152.427);
//! let receipt = ingestor.ingest_one(sample).await?;
//! println!("{}", receipt.link);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod elastic;
pub mod error;
pub mod ingest;
pub mod links;
pub mod memory;
pub mod partition;
pub mod provisioner;
pub mod schema;
pub mod timestamp;
pub mod types;
pub mod writer;

pub use backend::{BulkItemOutcome, BulkOperation, SearchBackend};
pub use elastic::{ElasticBackend, ElasticConfig};
pub use error::{BackendError, BulkItemFailure, IngestError, PipelineStep, Result};
pub use ingest::{IngestConfig, Ingestor, Receipt};
pub use links::{LinkBuilder, ReferenceLink};
pub use memory::{MemoryBackend, MemoryBackendConfig, StoredRecord};
pub use partition::PartitionKey;
pub use provisioner::{ProvisionMode, ProvisionOutcome, Provisioner};
pub use schema::PartitionSchema;
pub use types::{FieldValue, MetricSample, Payload, RecordId};
pub use writer::WriteExecutor;
