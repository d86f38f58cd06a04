//! Cluster administration: partition scale-out, topic registration and
//! the cluster summary.

use std::collections::BTreeMap;
use std::fmt;

use strata_core::{random_hex_id, BrokerName, PartitionId, ReplicaRole, TopicName};
use tracing::info;

use crate::error::{ClusterError, ClusterResult};
use crate::model::{DataBroker, DataCommon, DataPartition, DataTopic, Replica};
use crate::registry::ClusterRegistry;

/// Checks a requested sizing, and that it does not shrink `current`.
///
/// # Errors
/// Returns `InvalidScale` describing the violation.
pub fn validate_scale(requested: &DataCommon, current: Option<&DataCommon>) -> ClusterResult<()> {
    if requested.replica_count == 0 {
        return Err(ClusterError::InvalidScale {
            reason: "replica count must be at least 1".to_string(),
        });
    }
    if requested.partition_count < requested.replica_count {
        return Err(ClusterError::InvalidScale {
            reason: format!(
                "partition count {} is below replica count {}",
                requested.partition_count, requested.replica_count
            ),
        });
    }
    if let Some(current) = current {
        if requested.partition_count < current.partition_count
            || requested.replica_count < current.replica_count
        {
            return Err(ClusterError::InvalidScale {
                reason: format!(
                    "cannot scale in [{},{} -> {},{}]",
                    current.partition_count,
                    current.replica_count,
                    requested.partition_count,
                    requested.replica_count
                ),
            });
        }
    }
    Ok(())
}

/// Plans the partitions needed to reach `common.partition_count`.
///
/// Replica `j` of new partition `i` goes to `brokers[(i + j) % brokers.len()]`.
/// Replica 0 is primary, the rest follow.
///
/// # Errors
/// Returns `InvalidScale` without brokers, or `NothingToAdjust` when
/// `existing` already meets the count.
pub fn plan_scale_out(
    common: &DataCommon,
    brokers: &[BrokerName],
    existing: usize,
    mut next_id: impl FnMut() -> PartitionId,
) -> ClusterResult<Vec<DataPartition>> {
    let missing = common.partition_count.saturating_sub(existing);
    if missing == 0 {
        return Err(ClusterError::NothingToAdjust {
            partitions: existing,
        });
    }
    if brokers.is_empty() {
        return Err(ClusterError::InvalidScale {
            reason: "no live brokers".to_string(),
        });
    }

    let plan = (0..missing)
        .map(|i| DataPartition {
            partition_id: next_id(),
            topic: TopicName::default(),
            status: ReplicaRole::Free,
            replicas: (0..common.replica_count)
                .map(|j| Replica {
                    broker: brokers[(i + j) % brokers.len()].clone(),
                    role: if j == 0 {
                        ReplicaRole::Primary
                    } else {
                        ReplicaRole::Follow
                    },
                })
                .collect(),
        })
        .collect();
    Ok(plan)
}

/// Applies a new cluster sizing and creates the missing partitions.
///
/// Nothing is written unless the plan succeeds. Returns the partitions
/// created.
///
/// # Errors
/// Returns `InvalidScale` for a rejected request, `NothingToAdjust` when
/// no partition is missing, or a store error.
pub async fn scale_out(
    registry: &ClusterRegistry,
    requested: DataCommon,
) -> ClusterResult<Vec<DataPartition>> {
    let current = registry.common().await?;
    validate_scale(&requested, current.as_ref())?;

    let brokers: Vec<BrokerName> = registry
        .brokers()
        .await?
        .into_iter()
        .map(|b| b.broker)
        .collect();
    let existing = registry.partitions().await?.len();
    let plan = plan_scale_out(&requested, &brokers, existing, || {
        PartitionId::new(random_hex_id())
    })?;

    registry.put_common(&requested).await?;
    info!(
        cluster = registry.keys().cluster(),
        partitions = requested.partition_count,
        replicas = requested.replica_count,
        "Updated cluster sizing"
    );
    for partition in &plan {
        registry.put_partition(partition).await?;
    }
    info!(
        cluster = registry.keys().cluster(),
        created = plan.len(),
        "Partition scale-out complete"
    );
    Ok(plan)
}

/// Binds `topic` to a free partition.
///
/// Returns the existing binding if the topic is already registered.
///
/// # Errors
/// Returns `NoFreePartition` if every partition is in use, or a store error.
pub async fn register_topic(registry: &ClusterRegistry, topic: &TopicName) -> ClusterResult<DataTopic> {
    if let Some(existing) = registry.topic(topic).await? {
        return Ok(existing);
    }

    let mut partitions = registry.partitions().await?;
    partitions.sort_by(|a, b| a.partition_id.cmp(&b.partition_id));
    let mut partition = partitions
        .into_iter()
        .find(|p| !p.is_used() && p.topic.is_empty())
        .ok_or_else(|| ClusterError::NoFreePartition {
            topic: topic.clone(),
        })?;

    partition.topic = topic.clone();
    partition.status = ReplicaRole::Primary;
    registry.put_partition(&partition).await?;

    let binding = DataTopic {
        topic: topic.clone(),
        partition_id: partition.partition_id,
    };
    registry.put_topic(&binding).await?;
    info!(%topic, partition = %binding.partition_id, "Registered topic");
    Ok(binding)
}

/// Replica load of one broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerLoad {
    /// Replicas hosted.
    pub used: usize,
    /// Primary replicas.
    pub primary: usize,
    /// Follow replicas.
    pub follow: usize,
}

/// Overview of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    /// Cluster name.
    pub cluster: String,
    /// Configured sizing.
    pub common: Option<DataCommon>,
    /// Live brokers.
    pub brokers: Vec<DataBroker>,
    /// Registered topics.
    pub topics: Vec<DataTopic>,
    /// Partition assignments.
    pub partitions: Vec<DataPartition>,
    /// Percentage of partitions in service.
    pub used_percent: f64,
    /// Load per live broker.
    pub loads: BTreeMap<BrokerName, BrokerLoad>,
}

impl ClusterSummary {
    /// Computes the summary from listed values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(
        cluster: &str,
        common: Option<DataCommon>,
        brokers: Vec<DataBroker>,
        topics: Vec<DataTopic>,
        partitions: Vec<DataPartition>,
    ) -> Self {
        let used = partitions.iter().filter(|p| p.is_used()).count();
        let used_percent = if partitions.is_empty() {
            0.0
        } else {
            used as f64 * 100.0 / partitions.len() as f64
        };

        let mut loads: BTreeMap<BrokerName, BrokerLoad> = brokers
            .iter()
            .map(|b| (b.broker.clone(), BrokerLoad::default()))
            .collect();
        for replica in partitions.iter().flat_map(|p| &p.replicas) {
            if let Some(load) = loads.get_mut(&replica.broker) {
                load.used += 1;
                if replica.role == ReplicaRole::Primary {
                    load.primary += 1;
                } else {
                    load.follow += 1;
                }
            }
        }

        Self {
            cluster: cluster.to_string(),
            common,
            brokers,
            topics,
            partitions,
            used_percent,
            loads,
        }
    }

    /// Reads every value and computes the summary.
    ///
    /// # Errors
    /// Returns a store error.
    pub async fn load(registry: &ClusterRegistry) -> ClusterResult<Self> {
        Ok(Self::compute(
            registry.keys().cluster(),
            registry.common().await?,
            registry.brokers().await?,
            registry.topics().await?,
            registry.partitions().await?,
        ))
    }
}

const SEPARATOR: &str = "------------------------------------------------";

impl fmt::Display for ClusterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let common = self.common.unwrap_or_default();
        writeln!(f, "{SEPARATOR}")?;
        writeln!(f, "Cluster name   : {}", self.cluster)?;
        writeln!(
            f,
            "Sizing         : [{},{}]",
            common.partition_count, common.replica_count
        )?;
        writeln!(f, "Brokers        : {}", self.brokers.len())?;
        writeln!(f, "Topics         : {}", self.topics.len())?;
        writeln!(f, "Partitions     : {}", self.partitions.len())?;

        if !self.brokers.is_empty() {
            writeln!(f, "{SEPARATOR}")?;
            for (idx, broker) in self.brokers.iter().enumerate() {
                writeln!(f, "[{idx:3}] broker    : {} {}", broker.broker, broker.endpoint)?;
            }
        }
        if !self.topics.is_empty() {
            writeln!(f, "{SEPARATOR}")?;
            for (idx, topic) in self.topics.iter().enumerate() {
                writeln!(f, "[{idx:3}] topic     : {} -> {}", topic.topic, topic.partition_id)?;
            }
        }
        if !self.partitions.is_empty() {
            writeln!(f, "{SEPARATOR}")?;
            for (idx, partition) in self.partitions.iter().enumerate() {
                let replicas: Vec<String> = partition
                    .replicas
                    .iter()
                    .map(|r| format!("{}:{}", r.broker, r.role))
                    .collect();
                writeln!(
                    f,
                    "[{idx:3}] partition : {} {} [{}]",
                    partition.partition_id,
                    partition.status,
                    replicas.join(", ")
                )?;
            }
            writeln!(f, "{SEPARATOR}")?;
            writeln!(f, "Partition usage : {:.2}%", self.used_percent)?;
        }
        if !self.loads.is_empty() && !self.partitions.is_empty() {
            writeln!(f, "{SEPARATOR}")?;
            for (broker, load) in &self.loads {
                writeln!(
                    f,
                    "broker {broker} (used: {}, primary: {}, follow: {})",
                    load.used, load.primary, load.follow
                )?;
            }
        }
        write!(f, "{SEPARATOR}")
    }
}
