//! Partition configuration.

use std::path::{Path, PathBuf};

use strata_core::PartitionId;
use strata_log::{LogError, SegmentConfig};

use crate::error::{PartitionError, PartitionResult};

/// Configuration shared by every partition of one broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Directory holding one subdirectory per partition
    /// (`<data_dir>/<cluster>`).
    pub root: PathBuf,
    /// Segment sizing and flush policies.
    pub segment_config: SegmentConfig,
    /// Oldest segments are deleted on rotation beyond this many.
    /// `None` keeps every segment.
    pub max_segments: Option<usize>,
}

impl PartitionConfig {
    /// Creates a configuration storing partitions under `<data_dir>/<cluster>`.
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>, cluster: &str) -> Self {
        Self {
            root: data_dir.as_ref().join(cluster),
            segment_config: SegmentConfig::new(),
            max_segments: None,
        }
    }

    /// Sets the segment configuration.
    #[must_use]
    pub const fn with_segment_config(mut self, config: SegmentConfig) -> Self {
        self.segment_config = config;
        self
    }

    /// Sets the segment retention limit.
    #[must_use]
    pub const fn with_max_segments(mut self, max: Option<usize>) -> Self {
        self.max_segments = max;
        self
    }

    /// Returns the directory of one partition.
    ///
    /// # Errors
    /// Returns `InvalidId` if the ID would resolve outside `root`.
    pub fn partition_dir(&self, id: &PartitionId) -> PartitionResult<PathBuf> {
        match id.validate() {
            Ok(()) => Ok(self.root.join(id.as_str())),
            Err(strata_core::Error::InvalidArgument { reason, .. }) => Err(PartitionError::InvalidId {
                partition: id.clone(),
                reason,
            }),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the segment configuration is invalid or
    /// `max_segments` is zero.
    pub fn validate(&self) -> PartitionResult<()> {
        if let Err(LogError::InvalidConfig { name, reason }) = self.segment_config.validate() {
            return Err(PartitionError::InvalidConfig { name, reason });
        }
        if self.max_segments == Some(0) {
            return Err(PartitionError::InvalidConfig {
                name: "max_segments",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}
