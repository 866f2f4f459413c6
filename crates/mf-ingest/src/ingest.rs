//! Ingestion coordinator.
//!
//! Single write: resolve key → ensure partition → normalize and strip →
//! write → link. Bulk write: resolve, normalize and strip every sample →
//! one batch → one link per sample, in input order. Each step short-circuits
//! the rest on failure.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{BulkOperation, SearchBackend};
use crate::error::Result;
use crate::links::{LinkBuilder, ReferenceLink};
use crate::partition::PartitionKey;
use crate::provisioner::{ProvisionMode, Provisioner};
use crate::schema::PartitionSchema;
use crate::timestamp;
use crate::types::{MetricSample, Payload, RecordId, EXPERIMENT_KEYS, WORKFLOW_KEYS};
use crate::writer::WriteExecutor;

/// Default public base URL for reference links.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3040/v1";

/// Configuration for the [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Base URL reference links are built under.
    pub base_url: String,
    /// Coordination of concurrent partition creation.
    pub provision_mode: ProvisionMode,
    /// Whether bulk writes ensure their partitions first.
    pub provision_on_bulk: bool,
    /// Template applied to new partitions.
    pub schema: PartitionSchema,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            provision_mode: ProvisionMode::default(),
            provision_on_bulk: false,
            schema: PartitionSchema::metrics(),
        }
    }
}

impl IngestConfig {
    /// Creates a configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Sets the provisioning mode.
    #[must_use]
    pub const fn with_provision_mode(mut self, mode: ProvisionMode) -> Self {
        self.provision_mode = mode;
        self
    }

    /// Enables or disables provisioning on bulk writes.
    #[must_use]
    pub const fn with_provision_on_bulk(mut self, enabled: bool) -> Self {
        self.provision_on_bulk = enabled;
        self
    }
}

/// Acknowledgment of one stored sample.
///
/// Serializes as `{"<record id>": {"href": "<link>"}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Identifier assigned by the backend.
    pub record_id: RecordId,
    /// Link to the profile the record belongs to.
    pub link: ReferenceLink,
}

impl Serialize for Receipt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Href<'a> {
            href: &'a ReferenceLink,
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.record_id.as_str(), &Href { href: &self.link })?;
        map.end()
    }
}

/// Runs samples through the ingestion pipeline.
#[derive(Debug)]
pub struct Ingestor<B> {
    provisioner: Provisioner<B>,
    writer: WriteExecutor<B>,
    links: LinkBuilder,
    provision_on_bulk: bool,
}

impl<B: SearchBackend> Ingestor<B> {
    /// Creates an ingestor writing to `backend`.
    #[must_use]
    pub fn new(backend: Arc<B>, config: IngestConfig) -> Self {
        Self {
            provisioner: Provisioner::new(backend.clone(), config.schema, config.provision_mode),
            writer: WriteExecutor::new(backend),
            links: LinkBuilder::new(config.base_url),
            provision_on_bulk: config.provision_on_bulk,
        }
    }

    /// The link builder in use.
    #[must_use]
    pub const fn links(&self) -> &LinkBuilder {
        &self.links
    }

    /// Stores one sample, provisioning its partition first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IngestError::BackendUnavailable`] or
    /// [`crate::IngestError::WriteFailed`] if the write fails. Provisioning
    /// failures are logged and never returned.
    pub async fn ingest_one(&self, sample: MetricSample) -> Result<Receipt> {
        let key = PartitionKey::for_sample(&sample);

        let outcome = self.provisioner.ensure(key.partition()).await;
        debug!(partition = key.partition(), ?outcome, "partition ensured");

        let document = prepare(&key, sample.fields, Utc::now());
        let record_id = self.writer.put(&key, &document).await?;

        Ok(Receipt {
            record_id,
            link: self.links.single(&key),
        })
    }

    /// Stores a batch of samples in one backend call.
    ///
    /// Receipts are returned in input order. Partitions are only ensured
    /// first when provisioning on bulk is enabled.
    ///
    /// # Errors
    ///
    /// Fails as a whole if the backend call fails or any item is rejected.
    pub async fn ingest_bulk(&self, samples: Vec<MetricSample>) -> Result<Vec<Receipt>> {
        let now = Utc::now();
        let mut keys = Vec::with_capacity(samples.len());
        let mut operations = Vec::with_capacity(samples.len());

        for sample in samples {
            let key = PartitionKey::for_sample(&sample);
            operations.push(BulkOperation {
                partition: key.partition().to_string(),
                sub_type: key.sub_type().to_string(),
                document: prepare(&key, sample.fields, now),
            });
            keys.push(key);
        }

        if self.provision_on_bulk {
            let mut seen = HashSet::new();
            for key in &keys {
                if !seen.insert(key.partition()) {
                    continue;
                }
                let outcome = self.provisioner.ensure(key.partition()).await;
                debug!(partition = key.partition(), ?outcome, "partition ensured");
            }
        }

        let ids = self.writer.bulk_put(&operations).await?;

        Ok(keys
            .iter()
            .zip(ids)
            .map(|(key, record_id)| Receipt {
                record_id,
                link: self.links.bulk(key),
            })
            .collect())
    }

    /// Decodes raw bulk records and stores them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IngestError::InvalidSample`] for the first record
    /// that cannot be decoded; nothing is written in that case.
    pub async fn ingest_records(&self, records: Vec<Value>) -> Result<Vec<Receipt>> {
        let samples = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| MetricSample::from_record(index, record))
            .collect::<Result<Vec<_>>>()?;
        self.ingest_bulk(samples).await
    }
}

/// Strips routing identifiers and normalizes timestamps.
fn prepare(key: &PartitionKey, mut fields: Payload, now: DateTime<Utc>) -> Payload {
    for routing_key in WORKFLOW_KEYS.iter().chain(EXPERIMENT_KEYS.iter()) {
        fields.remove(*routing_key);
    }
    if let Some(issue) = timestamp::normalize(&mut fields, now) {
        warn!(partition = key.partition(), sub_type = key.sub_type(), error = %issue, "timestamp stored as sent");
    }
    fields
}
