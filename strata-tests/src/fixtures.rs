//! Shared setup for integration tests.

use std::path::Path;
use std::sync::Arc;

use strata_cluster::{DataCommon, InMemoryCoordinationStore};
use strata_core::{BrokerName, PartitionId, ReplicaRole, TopicName};
use strata_log::{SegmentConfig, Storage, TokioStorage};
use strata_partition::{Partition, PartitionConfig, PartitionResult};
use strata_server::BrokerConfig;
use tracing::debug;

/// Cluster name used by every fixture.
pub const CLUSTER: &str = "it";

/// Encoded size of a record with a one-byte body.
pub const ONE_BYTE_RECORD: u64 = strata_log::RECORD_HEADER_SIZE as u64 + 1;

/// Partition config whose segments hold `records` one-byte messages.
#[must_use]
pub fn small_segments(data_dir: &Path, records: u64) -> PartitionConfig {
    PartitionConfig::new(data_dir, CLUSTER)
        .with_segment_config(SegmentConfig::new().with_capacity_bytes(ONE_BYTE_RECORD * records))
}

/// Shared file-backed storage.
#[must_use]
pub fn disk() -> Arc<dyn Storage> {
    Arc::new(TokioStorage::new())
}

/// Opens partition `id` as primary.
///
/// # Errors
/// Returns the partition open failure.
pub async fn open_partition(config: &PartitionConfig, id: &str) -> PartitionResult<Partition> {
    debug!(partition = id, root = %config.root.display(), "Opening test partition");
    Partition::open(
        disk(),
        config.clone(),
        PartitionId::new(id),
        TopicName::new("test"),
        ReplicaRole::Primary,
    )
    .await
}

/// Config for a broker on an ephemeral port with a one-partition cluster.
#[must_use]
pub fn broker_config(data_dir: &Path, name: &str) -> BrokerConfig {
    BrokerConfig::new(CLUSTER, ([127, 0, 0, 1], 0).into(), data_dir)
        .with_name(BrokerName::new(name))
        .with_bootstrap_scale(Some(DataCommon {
            partition_count: 1,
            replica_count: 1,
        }))
}

/// Fresh embedded coordination store.
#[must_use]
pub fn store() -> InMemoryCoordinationStore {
    InMemoryCoordinationStore::new()
}
