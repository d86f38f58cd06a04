//! Log storage error types.
//!
//! All errors are explicit and typed. No string errors.

use thiserror::Error;

/// Result type for log storage operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur in the log storage engine.
#[derive(Debug, Error)]
pub enum LogError {
    /// The segment's log file reached capacity; the caller should rotate.
    #[error("segment full: cannot append offset {offset}")]
    SegmentFull {
        /// Offset whose append was rejected.
        offset: u64,
    },

    /// A write used an offset that does not extend the segment.
    #[error("invalid offset {id}: segment [{begin}, {end}] expects the next offset")]
    InvalidOffset {
        /// Offset that was rejected.
        id: u64,
        /// First offset of the segment.
        begin: u64,
        /// Last written offset of the segment.
        end: u64,
    },

    /// CRC checksum mismatch indicates corruption.
    #[error("checksum mismatch at byte {position}: expected {expected:#018x}, got {actual:#018x}")]
    ChecksumMismatch {
        /// Byte offset of the record in the log file.
        position: u64,
        /// Checksum stored in the record header.
        expected: u64,
        /// Checksum recomputed over the record.
        actual: u64,
    },

    /// The buffer ended before a complete record was read.
    #[error("truncated record: needed {needed} bytes, found {available}")]
    Truncated {
        /// Bytes needed to finish decoding.
        needed: u64,
        /// Bytes actually available.
        available: u64,
    },

    /// A configuration value is invalid.
    #[error("invalid config '{name}': {reason}")]
    InvalidConfig {
        /// Name of the setting.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// I/O error from underlying storage.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },
}

impl LogError {
    /// Creates an I/O error.
    pub fn io(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            operation,
            message: err.to_string(),
        }
    }

    /// Returns true if this error indicates data corruption.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::Truncated { .. })
    }

    /// Returns true if the caller should open a new segment and retry.
    #[must_use]
    pub const fn is_segment_full(&self) -> bool {
        matches!(self, Self::SegmentFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LogError::ChecksumMismatch {
            position: 1024,
            expected: 0xDEAD_BEEF,
            actual: 0xCAFE_BABE,
        };
        let msg = format!("{err}");
        assert!(msg.contains("1024"));
        assert!(msg.contains("0x00000000deadbeef"));
        assert!(msg.contains("0x00000000cafebabe"));
    }

    #[test]
    fn test_classification() {
        assert!(LogError::Truncated {
            needed: 24,
            available: 3
        }
        .is_corruption());
        assert!(LogError::SegmentFull { offset: 1 }.is_segment_full());
        assert!(!LogError::SegmentFull { offset: 1 }.is_corruption());
        assert!(!LogError::io("write", "disk full").is_segment_full());
    }
}
