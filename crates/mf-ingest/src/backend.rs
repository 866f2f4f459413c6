//! Storage backend abstraction.
//!
//! The pipeline talks to the search store through [`SearchBackend`], a small
//! capability interface: existence check, create-with-schema, single write
//! and bulk write, each keyed by a partition name and a sub-type.
//! [`crate::MemoryBackend`] and [`crate::ElasticBackend`] implement it.

use std::future::Future;

use crate::error::BackendError;
use crate::schema::PartitionSchema;
use crate::types::{Payload, RecordId};

/// One document of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    /// Target partition.
    pub partition: String,
    /// Sub-type within the partition.
    pub sub_type: String,
    /// Document to store.
    pub document: Payload,
}

/// Per-item result of a bulk write: the new record's identifier, or the
/// reason the backend rejected the item.
pub type BulkItemOutcome = std::result::Result<RecordId, String>;

/// Capability interface of the search-indexed store.
///
/// Implementations must be cheap to share between concurrent requests.
pub trait SearchBackend: Send + Sync + 'static {
    /// Reports whether a partition exists.
    fn partition_exists(
        &self,
        partition: &str,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// Creates a partition with the given mapping template.
    ///
    /// Returns [`BackendError::AlreadyExists`] if another writer created it
    /// first.
    fn create_partition(
        &self,
        partition: &str,
        schema: &PartitionSchema,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Stores one document and returns its identifier.
    fn write_one(
        &self,
        partition: &str,
        sub_type: &str,
        document: &Payload,
    ) -> impl Future<Output = Result<RecordId, BackendError>> + Send;

    /// Stores a batch of documents in one round trip.
    ///
    /// On success the result holds exactly one outcome per operation, in
    /// request order.
    fn write_bulk(
        &self,
        operations: &[BulkOperation],
    ) -> impl Future<Output = Result<Vec<BulkItemOutcome>, BackendError>> + Send;
}
