//! Segment and flush configuration.

use strata_core::Limits;

use crate::error::{LogError, LogResult};

/// When a file's buffered writes are forced to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Sync after every append.
    Always,
    /// Sync once this many appends accumulated since the last sync.
    EveryAppends(u32),
    /// Sync once strictly more than this many bytes were written since the last sync.
    AfterBytes(u64),
    /// Never sync from the write path.
    Never,
}

impl FlushPolicy {
    /// Returns true if a file with the given unsynced state must sync now.
    #[must_use]
    pub const fn should_sync(self, pending: PendingWrites) -> bool {
        match self {
            Self::Always => true,
            Self::EveryAppends(n) => pending.appends >= n as u64,
            Self::AfterBytes(n) => pending.bytes > n,
            Self::Never => false,
        }
    }

    fn validate(self, name: &'static str) -> LogResult<()> {
        match self {
            Self::EveryAppends(0) | Self::AfterBytes(0) => Err(LogError::InvalidConfig {
                name,
                reason: "threshold must be positive",
            }),
            _ => Ok(()),
        }
    }
}

/// Writes accumulated since a file's last sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWrites {
    /// Appends since the last sync.
    pub appends: u64,
    /// Bytes written since the last sync.
    pub bytes: u64,
}

impl PendingWrites {
    /// Records one append of `bytes` bytes.
    pub fn record(&mut self, bytes: u64) {
        self.appends += 1;
        self.bytes += bytes;
    }

    /// Clears the counters after a sync.
    pub fn clear(&mut self) {
        self.appends = 0;
        self.bytes = 0;
    }
}

/// Configuration for a segment's index and log files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Log file size at which the segment becomes full.
    pub capacity_bytes: u64,
    /// Durability cadence of the index file.
    pub index_flush: FlushPolicy,
    /// Durability cadence of the log file.
    pub log_flush: FlushPolicy,
}

impl SegmentConfig {
    /// Creates a segment configuration from the system defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self::from_limits(&Limits::new())
    }

    /// Creates a segment configuration from explicit limits.
    #[must_use]
    pub const fn from_limits(limits: &Limits) -> Self {
        Self {
            capacity_bytes: limits.segment_capacity_bytes,
            index_flush: FlushPolicy::EveryAppends(limits.index_sync_every_appends),
            log_flush: FlushPolicy::AfterBytes(limits.log_sync_after_bytes),
        }
    }

    /// Sets the log file capacity in bytes.
    #[must_use]
    pub const fn with_capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    /// Sets the index flush policy.
    #[must_use]
    pub const fn with_index_flush(mut self, policy: FlushPolicy) -> Self {
        self.index_flush = policy;
        self
    }

    /// Sets the log flush policy.
    #[must_use]
    pub const fn with_log_flush(mut self, policy: FlushPolicy) -> Self {
        self.log_flush = policy;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the capacity or a flush threshold is zero.
    pub fn validate(&self) -> LogResult<()> {
        if self.capacity_bytes == 0 {
            return Err(LogError::InvalidConfig {
                name: "capacity_bytes",
                reason: "must be positive",
            });
        }
        self.index_flush.validate("index_flush")?;
        self.log_flush.validate("log_flush")
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SegmentConfig::new();
        assert_eq!(config.capacity_bytes, 4 * 1024 * 1024);
        assert_eq!(config.index_flush, FlushPolicy::EveryAppends(100));
        assert_eq!(config.log_flush, FlushPolicy::AfterBytes(4096));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flush_policy_thresholds() {
        let mut pending = PendingWrites::default();
        for _ in 0..99 {
            pending.record(8);
        }
        assert!(!FlushPolicy::EveryAppends(100).should_sync(pending));
        pending.record(8);
        assert!(FlushPolicy::EveryAppends(100).should_sync(pending));

        let exact = PendingWrites {
            appends: 1,
            bytes: 4096,
        };
        assert!(!FlushPolicy::AfterBytes(4096).should_sync(exact));
        assert!(FlushPolicy::AfterBytes(4095).should_sync(exact));
        assert!(FlushPolicy::Always.should_sync(PendingWrites::default()));
        assert!(!FlushPolicy::Never.should_sync(exact));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(SegmentConfig::new().with_capacity_bytes(0).validate().is_err());
        assert!(SegmentConfig::new()
            .with_index_flush(FlushPolicy::EveryAppends(0))
            .validate()
            .is_err());
        assert!(SegmentConfig::new()
            .with_log_flush(FlushPolicy::AfterBytes(0))
            .validate()
            .is_err());
    }
}
