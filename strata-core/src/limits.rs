//! System limits and configuration bounds.
//!
//! Every size, cadence and timeout the broker relies on has a named default
//! here. Crates that own a concern (segments, membership, the client
//! protocol) build their own config structs from these values.

use std::time::Duration;

/// System-wide limits for Strata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Storage limits.
    /// Capacity of a segment's log file in bytes.
    pub segment_capacity_bytes: u64,
    /// Index appends between two index-file syncs.
    pub index_sync_every_appends: u32,
    /// Log bytes written before a log-file sync is forced.
    pub log_sync_after_bytes: u64,

    // Message limits.
    /// Maximum size of a single message body in bytes.
    pub max_message_bytes: u32,

    // Membership limits.
    /// TTL of the broker liveness lease in seconds.
    pub lease_ttl_secs: u64,
    /// Keepalive renewals per lease TTL.
    pub keepalive_rounds_per_ttl: u32,
    /// Consecutive renewal failures tolerated before heartbeat loss is fatal.
    pub keepalive_max_failures: u32,
    /// Timeout for a single coordination-store round trip.
    pub store_timeout: Duration,

    // Watch limits.
    /// Capacity of a watch subscription's event channel.
    pub watch_channel_capacity: usize,
}

impl Limits {
    /// Creates limits with the reference defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Storage: 4 MiB segments, index synced every 100 appends,
            // log synced after more than 4 KiB.
            segment_capacity_bytes: 4 * 1024 * 1024,
            index_sync_every_appends: 100,
            log_sync_after_bytes: 4 * 1024,

            // Messages: 1 MiB.
            max_message_bytes: 1024 * 1024,

            // Membership: 5s lease renewed every ttl/3, 3 failures, 3s timeout.
            lease_ttl_secs: 5,
            keepalive_rounds_per_ttl: 3,
            keepalive_max_failures: 3,
            store_timeout: Duration::from_secs(3),

            watch_channel_capacity: 100,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero or a message could never fit in
    /// a segment.
    pub fn validate(&self) -> crate::Result<()> {
        if self.segment_capacity_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "segment_capacity_bytes",
                reason: "must be positive",
            });
        }

        if self.max_message_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_message_bytes",
                reason: "must be positive",
            });
        }

        if self.lease_ttl_secs == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "lease_ttl_secs",
                reason: "must be positive",
            });
        }

        if self.keepalive_rounds_per_ttl == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "keepalive_rounds_per_ttl",
                reason: "must be positive",
            });
        }

        if self.keepalive_max_failures == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "keepalive_max_failures",
                reason: "must be positive",
            });
        }

        if self.watch_channel_capacity == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "watch_channel_capacity",
                reason: "must be positive",
            });
        }

        Ok(())
    }

    /// Returns the interval between two keepalive renewals.
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs) / self.keepalive_rounds_per_ttl.max(1)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_valid() {
        let limits = Limits::new();
        assert!(limits.validate().is_ok());
        assert_eq!(limits.segment_capacity_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_zero_segment_capacity_rejected() {
        let mut limits = Limits::new();
        limits.segment_capacity_bytes = 0;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_zero_lease_ttl_rejected() {
        let mut limits = Limits::new();
        limits.lease_ttl_secs = 0;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_keepalive_interval_is_third_of_ttl() {
        let mut limits = Limits::new();
        limits.lease_ttl_secs = 6;
        assert_eq!(limits.keepalive_interval(), Duration::from_secs(2));
    }
}
