//! Lazy partition provisioning.
//!
//! [`Provisioner::ensure`] checks whether a partition exists and creates it
//! with the metrics template if not. Check and create are separate backend
//! calls, so two first writers can both see the partition missing and both
//! try to create it. The loser's failure is absorbed: provisioning never
//! fails a write, and the write that follows lands in whichever partition
//! won.
//!
//! With [`ProvisionMode::SingleFlight`] concurrent callers for the same
//! partition inside this process are serialized, so only one of them issues
//! the create.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::error::{BackendError, IngestError};
use crate::schema::PartitionSchema;

/// How concurrent first writers to a new partition are coordinated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionMode {
    /// Check then create without coordination; duplicate creates are
    /// tolerated.
    #[default]
    Optimistic,
    /// One check-and-create per partition at a time within this process.
    SingleFlight,
}

impl std::str::FromStr for ProvisionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimistic" => Ok(Self::Optimistic),
            "single-flight" | "single_flight" => Ok(Self::SingleFlight),
            other => Err(format!("unknown provisioning mode: {other}")),
        }
    }
}

/// Result of [`Provisioner::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The partition was already there, or a concurrent writer created it.
    Existed,
    /// This call created the partition.
    Created,
    /// Creation failed; the write proceeds anyway.
    CreationFailed {
        /// Backend error text.
        reason: String,
    },
}

/// Ensures partitions exist before single writes.
#[derive(Debug)]
pub struct Provisioner<B> {
    backend: Arc<B>,
    schema: PartitionSchema,
    mode: ProvisionMode,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<B: SearchBackend> Provisioner<B> {
    /// Creates a provisioner applying `schema` to new partitions.
    #[must_use]
    pub fn new(backend: Arc<B>, schema: PartitionSchema, mode: ProvisionMode) -> Self {
        Self {
            backend,
            schema,
            mode,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The coordination mode.
    #[must_use]
    pub const fn mode(&self) -> ProvisionMode {
        self.mode
    }

    /// Makes sure `partition` exists, creating it if needed.
    ///
    /// Never fails: a failed existence check is treated as "missing" and a
    /// failed create is reported as [`ProvisionOutcome::CreationFailed`].
    pub async fn ensure(&self, partition: &str) -> ProvisionOutcome {
        match self.mode {
            ProvisionMode::Optimistic => self.check_and_create(partition).await,
            ProvisionMode::SingleFlight => {
                let flight = self.flight(partition);
                let outcome = {
                    let _guard = flight.lock().await;
                    self.check_and_create(partition).await
                };
                self.land(partition, &flight);
                outcome
            }
        }
    }

    fn flight(&self, partition: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight
            .lock()
            .entry(partition.to_string())
            .or_default()
            .clone()
    }

    fn land(&self, partition: &str, flight: &Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        // One reference is ours, one is the map's.
        if Arc::strong_count(flight) <= 2 {
            in_flight.remove(partition);
        }
    }

    async fn check_and_create(&self, partition: &str) -> ProvisionOutcome {
        let exists = match self.backend.partition_exists(partition).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!(partition, error = %err, "existence check failed, attempting creation");
                false
            }
        };

        if exists {
            debug!(partition, "partition exists");
            return ProvisionOutcome::Existed;
        }

        match self.backend.create_partition(partition, &self.schema).await {
            Ok(()) => {
                info!(partition, "partition created");
                ProvisionOutcome::Created
            }
            Err(BackendError::AlreadyExists(_)) => {
                debug!(partition, "partition created concurrently");
                ProvisionOutcome::Existed
            }
            Err(err) => {
                let reason = err.to_string();
                let failure = IngestError::PartitionCreateFailed {
                    partition: partition.to_string(),
                    reason: reason.clone(),
                };
                warn!(partition, error = %failure, "continuing without provisioning");
                ProvisionOutcome::CreationFailed { reason }
            }
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}
