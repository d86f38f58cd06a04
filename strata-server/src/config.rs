//! Broker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use strata_cluster::{DataCommon, MembershipConfig};
use strata_core::{random_hex_id, BrokerName, Limits};
use strata_log::SegmentConfig;
use strata_partition::PartitionConfig;

use crate::codec::FRAME_HEADER_SIZE;
use crate::error::{BrokerError, BrokerResult};

/// Frame bytes beyond the message body: tag, ID length and a bounded ID.
const FRAME_OVERHEAD: usize = 1 + 2 + u16::MAX as usize;

/// Settings of one broker process.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Unique broker name within the cluster.
    pub name: BrokerName,
    /// Cluster name.
    pub cluster: String,
    /// Client listen address.
    pub listen_addr: SocketAddr,
    /// Address advertised to the cluster. Defaults to the bound address.
    pub advertised_addr: Option<String>,
    /// Root of partition data.
    pub data_dir: PathBuf,
    /// System limits.
    pub limits: Limits,
    /// Segments kept per partition, unbounded when `None`.
    pub max_segments: Option<usize>,
    /// Sizing to apply once registered, used by standalone brokers.
    pub bootstrap_scale: Option<DataCommon>,
}

impl BrokerConfig {
    /// Creates a config with a random name and default limits.
    #[must_use]
    pub fn new(cluster: impl Into<String>, listen_addr: SocketAddr, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: BrokerName::new(random_hex_id()),
            cluster: cluster.into(),
            listen_addr,
            advertised_addr: None,
            data_dir: data_dir.into(),
            limits: Limits::default(),
            max_segments: None,
            bootstrap_scale: None,
        }
    }

    /// Sets the broker name.
    #[must_use]
    pub fn with_name(mut self, name: BrokerName) -> Self {
        self.name = name;
        self
    }

    /// Sets the advertised address.
    #[must_use]
    pub fn with_advertised_addr(mut self, addr: impl Into<String>) -> Self {
        self.advertised_addr = Some(addr.into());
        self
    }

    /// Sets the system limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the per-partition segment retention.
    #[must_use]
    pub const fn with_max_segments(mut self, max_segments: Option<usize>) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Sets the sizing applied after registration.
    #[must_use]
    pub const fn with_bootstrap_scale(mut self, scale: Option<DataCommon>) -> Self {
        self.bootstrap_scale = scale;
        self
    }

    /// Partition storage settings derived from this config.
    #[must_use]
    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig::new(&self.data_dir, &self.cluster)
            .with_segment_config(SegmentConfig::from_limits(&self.limits))
            .with_max_segments(self.max_segments)
    }

    /// Lease settings derived from this config.
    #[must_use]
    pub const fn membership_config(&self) -> MembershipConfig {
        MembershipConfig::from_limits(&self.limits)
    }

    /// Largest frame the server accepts.
    #[must_use]
    pub const fn max_frame_bytes(&self) -> usize {
        self.limits.max_message_bytes as usize + FRAME_OVERHEAD + FRAME_HEADER_SIZE
    }

    /// Validates the config.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first invalid field.
    pub fn validate(&self) -> BrokerResult<()> {
        let invalid = |name, reason: &str| BrokerError::InvalidConfig {
            name,
            reason: reason.to_string(),
        };

        if self.name.is_empty() || self.name.as_str().contains('/') {
            return Err(invalid("name", "must be non-empty and contain no '/'"));
        }
        if self.cluster.trim_matches('/').is_empty() {
            return Err(invalid("cluster", "must be non-empty"));
        }
        self.limits
            .validate()
            .map_err(|e| invalid("limits", &e.to_string()))?;
        self.partition_config()
            .validate()
            .map_err(|e| invalid("partition", &e.to_string()))?;
        self.membership_config()
            .validate()
            .map_err(|e| invalid("membership", &e.to_string()))?;
        Ok(())
    }
}
