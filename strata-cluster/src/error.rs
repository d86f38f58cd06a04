//! Cluster coordination error types.

use strata_core::{BrokerName, PartitionId, TopicName};
use strata_partition::PartitionError;
use thiserror::Error;

/// Result type for coordination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors returned by a [`CoordinationStore`](crate::CoordinationStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No key (or no key under the prefix) exists.
    #[error("key not found: {key}")]
    NotFound {
        /// Key or prefix that was looked up.
        key: String,
    },

    /// The lease does not exist or already expired.
    #[error("lease {lease} not found")]
    LeaseNotFound {
        /// Lease ID.
        lease: u64,
    },

    /// The store did not answer in time.
    #[error("coordination store timed out during {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
    },

    /// The store cannot be reached.
    #[error("coordination store unavailable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },
}

impl StoreError {
    /// Returns true if the error means the key or prefix is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from membership, partition management and administration.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Coordination store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored value could not be encoded or decoded.
    #[error("invalid value for {key}: {message}")]
    Codec {
        /// Key of the value.
        key: String,
        /// Serialization error.
        message: String,
    },

    /// The partition is not materialized on this broker.
    #[error("partition {partition} not found")]
    PartitionNotFound {
        /// Requested partition.
        partition: PartitionId,
    },

    /// Partition storage failure.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// Another live broker holds the name.
    #[error("broker {broker} is already registered")]
    BrokerAlreadyRegistered {
        /// Conflicting broker name.
        broker: BrokerName,
    },

    /// Lease renewal failed too many times in a row.
    #[error("broker heartbeat lost after {failures} consecutive renewal failures")]
    HeartbeatLost {
        /// Consecutive failures observed.
        failures: u32,
    },

    /// A cluster setting is out of range.
    #[error("invalid cluster config '{name}': {reason}")]
    InvalidConfig {
        /// Name of the setting.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A scale request was rejected.
    #[error("invalid scale request: {reason}")]
    InvalidScale {
        /// Why the request was rejected.
        reason: String,
    },

    /// Every partition is already bound to a topic.
    #[error("no free partition for topic {topic}")]
    NoFreePartition {
        /// Topic being registered.
        topic: TopicName,
    },

    /// The cluster already has the requested number of partitions.
    #[error("no need to adjust: cluster already has {partitions} partitions")]
    NothingToAdjust {
        /// Existing partition count.
        partitions: usize,
    },
}

impl ClusterError {
    /// Returns true if the broker process must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::HeartbeatLost { .. } => true,
            Self::Partition(err) => err.is_fatal(),
            _ => false,
        }
    }

    /// Creates a codec error for `key`.
    pub fn codec(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Codec {
            key: key.into(),
            message: err.to_string(),
        }
    }
}
