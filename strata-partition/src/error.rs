//! Partition error types.

use strata_core::PartitionId;
use strata_log::LogError;
use thiserror::Error;

/// Result type for partition operations.
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Partition operation errors.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The write path failed in a way the partition cannot recover from.
    ///
    /// The broker stops when it sees this error.
    #[error("partition {partition}: fatal {operation} failure: {source}")]
    Fatal {
        /// Partition that failed.
        partition: PartitionId,
        /// Operation that failed.
        operation: &'static str,
        /// Underlying storage error.
        #[source]
        source: LogError,
    },

    /// A storage error outside the write path (open, read).
    #[error("partition {partition}: {source}")]
    Storage {
        /// Partition that failed.
        partition: PartitionId,
        /// Underlying storage error.
        #[source]
        source: LogError,
    },

    /// The partition ID cannot name a directory under the cluster root.
    #[error("invalid partition id {partition:?}: {reason}")]
    InvalidId {
        /// Rejected ID.
        partition: PartitionId,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Invalid configuration.
    #[error("invalid partition config '{name}': {reason}")]
    InvalidConfig {
        /// Name of the setting.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl PartitionError {
    /// Wraps a write-path storage error.
    #[must_use]
    pub fn fatal(partition: &PartitionId, operation: &'static str, source: LogError) -> Self {
        Self::Fatal {
            partition: partition.clone(),
            operation,
            source,
        }
    }

    /// Wraps a non-fatal storage error.
    #[must_use]
    pub fn storage(partition: &PartitionId, source: LogError) -> Self {
        Self::Storage {
            partition: partition.clone(),
            source,
        }
    }

    /// Returns true if the process must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}
