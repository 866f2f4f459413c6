//! Error types for the ingestion pipeline.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A step of the ingestion pipeline, attached to errors so callers can tell
/// which stage of a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    /// Parsing the request payload into samples.
    Decode,
    /// Checking for and creating the target partition.
    EnsurePartition,
    /// Persisting a single record.
    Write,
    /// Persisting a batch of records.
    BulkWrite,
}

impl PipelineStep {
    /// Returns the step name used in logs and error bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::EnsurePartition => "ensure_partition",
            Self::Write => "write",
            Self::BulkWrite => "bulk_write",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A partition with this name already exists.
    #[error("partition already exists: {0}")]
    AlreadyExists(String),

    /// The target partition does not exist and the backend will not create it.
    #[error("partition missing: {0}")]
    PartitionMissing(String),

    /// The backend refused the request.
    #[error("backend rejected request with status {status}: {reason}")]
    Rejected {
        /// HTTP-style status code returned by the backend.
        status: u16,
        /// Reason reported by the backend.
        reason: String,
    },

    /// The backend answered with something we could not interpret.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// Encoding a document or decoding a response failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One failed item of a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemFailure {
    /// Position of the item in the request.
    pub index: usize,
    /// Reason reported by the backend.
    pub reason: String,
}

/// Errors that can occur while ingesting metric samples.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A submitted sample is missing identifiers or carries unsupported values.
    #[error("invalid sample{}: {reason}", .index.map(|i| format!(" #{i}")).unwrap_or_default())]
    InvalidSample {
        /// Position of the sample in a bulk request, if any.
        index: Option<usize>,
        /// What is wrong with it.
        reason: String,
    },

    /// The backend could not be reached.
    #[error("backend unavailable during {step}: {reason}")]
    BackendUnavailable {
        /// Step that hit the failure.
        step: PipelineStep,
        /// Transport error text.
        reason: String,
    },

    /// Creating a partition failed. Never fatal to a write.
    #[error("failed to create partition {partition}: {reason}")]
    PartitionCreateFailed {
        /// Partition that could not be created.
        partition: String,
        /// Backend error text.
        reason: String,
    },

    /// Persisting records failed.
    #[error("write failed during {step}: {reason}")]
    WriteFailed {
        /// Step that hit the failure.
        step: PipelineStep,
        /// Backend error text.
        reason: String,
    },

    /// At least one item of a bulk write was rejected.
    #[error("{} of the bulk items failed", .failures.len())]
    BulkItemsFailed {
        /// Every rejected item, in request order.
        failures: Vec<BulkItemFailure>,
    },

    /// A timestamp could not be brought into canonical form. Never fatal.
    #[error("malformed timestamp: {value}")]
    MalformedTimestamp {
        /// The value after best-effort repair.
        value: String,
    },
}

impl IngestError {
    /// Maps a backend error raised during `step` onto the pipeline taxonomy.
    #[must_use]
    pub fn from_backend(step: PipelineStep, err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => Self::BackendUnavailable { step, reason },
            other => Self::WriteFailed {
                step,
                reason: other.to_string(),
            },
        }
    }

    /// Returns the pipeline step this error originated from, if known.
    #[must_use]
    pub const fn step(&self) -> Option<PipelineStep> {
        match self {
            Self::InvalidSample { .. } => Some(PipelineStep::Decode),
            Self::BackendUnavailable { step, .. } | Self::WriteFailed { step, .. } => Some(*step),
            Self::PartitionCreateFailed { .. } => Some(PipelineStep::EnsurePartition),
            Self::BulkItemsFailed { .. } => Some(PipelineStep::BulkWrite),
            Self::MalformedTimestamp { .. } => None,
        }
    }

    pub(crate) fn invalid(index: Option<usize>, reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
