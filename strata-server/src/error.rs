//! Broker error types.

use std::io;

use strata_cluster::ClusterError;

use crate::codec::{CodecError, ErrorCode};

/// Errors from the broker process, server and client.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// A failure the broker cannot continue after.
    #[error("fatal: {0}")]
    Fatal(#[source] ClusterError),

    /// Cluster coordination failure.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Wire protocol violation.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid broker configuration.
    #[error("invalid configuration: {name}: {reason}")]
    InvalidConfig {
        /// Offending field.
        name: &'static str,
        /// Why it is invalid.
        reason: String,
    },

    /// The server answered with an error frame.
    #[error("broker returned {code:?}: {message}")]
    Remote {
        /// Error class.
        code: ErrorCode,
        /// Server message.
        message: String,
    },

    /// A background task panicked or was aborted.
    #[error("{task} task failed: {message}")]
    TaskFailed {
        /// Task name.
        task: &'static str,
        /// Join error description.
        message: String,
    },

    /// The peer sent a frame that does not answer the request.
    #[error("unexpected response: {frame}")]
    UnexpectedResponse {
        /// Description of the received frame.
        frame: String,
    },
}

impl BrokerError {
    /// Returns true if the process must exit.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Wraps `err`, marking it fatal when the cluster layer says so.
    #[must_use]
    pub fn from_cluster(err: ClusterError) -> Self {
        if err.is_fatal() {
            Self::Fatal(err)
        } else {
            Self::Cluster(err)
        }
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cluster_classifies() {
        let err = BrokerError::from_cluster(ClusterError::HeartbeatLost { failures: 3 });
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("fatal:"));

        let err = BrokerError::from_cluster(ClusterError::NothingToAdjust { partitions: 1 });
        assert!(!err.is_fatal());
    }
}
