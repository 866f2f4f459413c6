//! Write executor: persists documents and turns backend answers into record
//! identifiers.

use std::sync::Arc;

use tracing::{debug, error};

use crate::backend::{BulkOperation, SearchBackend};
use crate::error::{BulkItemFailure, IngestError, PipelineStep, Result};
use crate::partition::PartitionKey;
use crate::types::{Payload, RecordId};

/// Persists single documents and batches.
#[derive(Debug)]
pub struct WriteExecutor<B> {
    backend: Arc<B>,
}

impl<B: SearchBackend> WriteExecutor<B> {
    /// Creates an executor writing to `backend`.
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Stores one document under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::BackendUnavailable`] if the store cannot be
    /// reached and [`IngestError::WriteFailed`] if it rejects the document.
    pub async fn put(&self, key: &PartitionKey, document: &Payload) -> Result<RecordId> {
        match self
            .backend
            .write_one(key.partition(), key.sub_type(), document)
            .await
        {
            Ok(id) => {
                debug!(partition = key.partition(), sub_type = key.sub_type(), record_id = %id, "record stored");
                Ok(id)
            }
            Err(err) => {
                error!(partition = key.partition(), sub_type = key.sub_type(), error = %err, "write failed");
                Err(IngestError::from_backend(PipelineStep::Write, err))
            }
        }
    }

    /// Stores a batch in one backend call.
    ///
    /// The returned identifiers are in request order. If any item is
    /// rejected the whole call fails with every rejected item listed.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::BackendUnavailable`] or
    /// [`IngestError::WriteFailed`] when the call itself fails,
    /// [`IngestError::BulkItemsFailed`] when items were rejected.
    pub async fn bulk_put(&self, operations: &[BulkOperation]) -> Result<Vec<RecordId>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = self.backend.write_bulk(operations).await.map_err(|err| {
            error!(count = operations.len(), error = %err, "bulk write failed");
            IngestError::from_backend(PipelineStep::BulkWrite, err)
        })?;

        if outcomes.len() != operations.len() {
            error!(
                expected = operations.len(),
                actual = outcomes.len(),
                "bulk response does not match request"
            );
            return Err(IngestError::WriteFailed {
                step: PipelineStep::BulkWrite,
                reason: format!(
                    "backend returned {} results for {} items",
                    outcomes.len(),
                    operations.len()
                ),
            });
        }

        let mut ids = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(id) => ids.push(id),
                Err(reason) => failures.push(BulkItemFailure { index, reason }),
            }
        }

        if !failures.is_empty() {
            error!(
                count = operations.len(),
                failed = failures.len(),
                "bulk items rejected"
            );
            return Err(IngestError::BulkItemsFailed { failures });
        }

        debug!(count = ids.len(), "bulk stored");
        Ok(ids)
    }
}
