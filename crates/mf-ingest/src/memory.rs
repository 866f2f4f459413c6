//! In-memory search backend.
//!
//! Keeps partitions, their mapping templates and records in process memory.
//! Used by tests and by the gateway's `memory` backend mode. Call counters
//! and fault switches make provisioning races and backend failures
//! observable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::trace;
use uuid::Uuid;

use crate::backend::{BulkItemOutcome, BulkOperation, SearchBackend};
use crate::error::BackendError;
use crate::schema::PartitionSchema;
use crate::types::{Payload, RecordId};

/// Configuration for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Create missing partitions (without a template) when a write targets
    /// them, like the real store's automatic index creation.
    pub auto_create: bool,
    /// Delay inserted after every existence check, to widen the window
    /// between check and create.
    pub exists_delay: Option<Duration>,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            auto_create: true,
            exists_delay: None,
        }
    }
}

/// A record held by the in-memory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Identifier assigned on write.
    pub id: RecordId,
    /// Sub-type the record was written under.
    pub sub_type: String,
    /// Stored document.
    pub document: Payload,
}

#[derive(Debug, Default)]
struct PartitionState {
    schema: Option<PartitionSchema>,
    records: Vec<StoredRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    fail_creates: bool,
    fail_writes: Option<String>,
    rejected_items: HashSet<usize>,
}

/// Thread-safe in-memory implementation of [`SearchBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    config: MemoryBackendConfig,
    partitions: RwLock<HashMap<String, PartitionState>>,
    faults: Mutex<Faults>,
    exists_calls: AtomicUsize,
    create_calls: AtomicUsize,
    creates_succeeded: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend with the given configuration.
    #[must_use]
    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Makes every call fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Makes partition creation fail.
    pub fn set_fail_creates(&self, fail: bool) {
        self.faults.lock().fail_creates = fail;
    }

    /// Makes single and bulk writes fail with the given reason.
    pub fn set_fail_writes(&self, reason: Option<String>) {
        self.faults.lock().fail_writes = reason;
    }

    /// Rejects the bulk item at `index` in every subsequent bulk write.
    pub fn reject_bulk_item(&self, index: usize) {
        self.faults.lock().rejected_items.insert(index);
    }

    /// Number of existence checks served.
    #[must_use]
    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::Relaxed)
    }

    /// Number of create calls received, successful or not.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::Relaxed)
    }

    /// Number of create calls that created a partition.
    #[must_use]
    pub fn creates_succeeded(&self) -> usize {
        self.creates_succeeded.load(Ordering::Relaxed)
    }

    /// Whether the partition exists.
    #[must_use]
    pub fn has_partition(&self, partition: &str) -> bool {
        self.partitions.read().contains_key(partition)
    }

    /// Mapping template the partition was created with, if it was created
    /// explicitly.
    #[must_use]
    pub fn schema(&self, partition: &str) -> Option<PartitionSchema> {
        self.partitions
            .read()
            .get(partition)
            .and_then(|p| p.schema.clone())
    }

    /// Records stored in the partition, in write order.
    #[must_use]
    pub fn records(&self, partition: &str) -> Vec<StoredRecord> {
        self.partitions
            .read()
            .get(partition)
            .map(|p| p.records.clone())
            .unwrap_or_default()
    }

    /// Number of records across all partitions.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.partitions.read().values().map(|p| p.records.len()).sum()
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.faults.lock().unavailable {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn insert(
        partitions: &mut HashMap<String, PartitionState>,
        auto_create: bool,
        partition: &str,
        sub_type: &str,
        document: &Payload,
    ) -> Result<RecordId, BackendError> {
        let state = if auto_create {
            partitions.entry(partition.to_string()).or_default()
        } else {
            partitions
                .get_mut(partition)
                .ok_or_else(|| BackendError::PartitionMissing(partition.to_string()))?
        };

        let id = RecordId::new(Uuid::new_v4().simple().to_string());
        state.records.push(StoredRecord {
            id: id.clone(),
            sub_type: sub_type.to_string(),
            document: document.clone(),
        });
        Ok(id)
    }
}

impl SearchBackend for MemoryBackend {
    async fn partition_exists(&self, partition: &str) -> Result<bool, BackendError> {
        self.check_available()?;
        self.exists_calls.fetch_add(1, Ordering::Relaxed);
        let exists = self.has_partition(partition);

        if let Some(delay) = self.config.exists_delay {
            tokio::time::sleep(delay).await;
        }

        trace!(partition, exists, "existence check");
        Ok(exists)
    }

    async fn create_partition(
        &self,
        partition: &str,
        schema: &PartitionSchema,
    ) -> Result<(), BackendError> {
        self.check_available()?;
        self.create_calls.fetch_add(1, Ordering::Relaxed);

        if self.faults.lock().fail_creates {
            return Err(BackendError::Rejected {
                status: 500,
                reason: "partition creation disabled".to_string(),
            });
        }

        let mut partitions = self.partitions.write();
        if partitions.contains_key(partition) {
            return Err(BackendError::AlreadyExists(partition.to_string()));
        }
        partitions.insert(
            partition.to_string(),
            PartitionState {
                schema: Some(schema.clone()),
                records: Vec::new(),
            },
        );
        self.creates_succeeded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_one(
        &self,
        partition: &str,
        sub_type: &str,
        document: &Payload,
    ) -> Result<RecordId, BackendError> {
        self.check_available()?;
        if let Some(reason) = self.faults.lock().fail_writes.clone() {
            return Err(BackendError::Rejected { status: 500, reason });
        }

        let mut partitions = self.partitions.write();
        Self::insert(
            &mut partitions,
            self.config.auto_create,
            partition,
            sub_type,
            document,
        )
    }

    async fn write_bulk(
        &self,
        operations: &[BulkOperation],
    ) -> Result<Vec<BulkItemOutcome>, BackendError> {
        self.check_available()?;
        let rejected = {
            let faults = self.faults.lock();
            if let Some(reason) = faults.fail_writes.clone() {
                return Err(BackendError::Rejected { status: 500, reason });
            }
            faults.rejected_items.clone()
        };

        let mut partitions = self.partitions.write();
        let outcomes = operations
            .iter()
            .enumerate()
            .map(|(index, op)| {
                if rejected.contains(&index) {
                    return Err(format!("item {index} rejected"));
                }
                Self::insert(
                    &mut partitions,
                    self.config.auto_create,
                    &op.partition,
                    &op.sub_type,
                    &op.document,
                )
                .map_err(|e| e.to_string())
            })
            .collect();
        Ok(outcomes)
    }
}
