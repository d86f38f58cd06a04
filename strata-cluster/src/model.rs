//! Values stored in the coordination store.
//!
//! All values are JSON with camelCase field names.

use serde::{Deserialize, Serialize};
use strata_core::{BrokerName, ConsumerId, Offset, PartitionId, ReplicaRole, TopicName};

/// Liveness record of a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBroker {
    /// Broker name.
    pub broker: BrokerName,
    /// Address clients connect to.
    pub endpoint: String,
}

/// Topic registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTopic {
    /// Topic name.
    pub topic: TopicName,
    /// Partition the topic is bound to.
    pub partition_id: PartitionId,
}

/// One replica assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    /// Broker hosting the replica.
    pub broker: BrokerName,
    /// Role of the replica.
    pub role: ReplicaRole,
}

/// Partition assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPartition {
    /// Partition ID.
    pub partition_id: PartitionId,
    /// Topic bound to the partition, empty while unused.
    #[serde(default)]
    pub topic: TopicName,
    /// Aggregate status of the partition.
    #[serde(default)]
    pub status: ReplicaRole,
    /// Replica placement.
    #[serde(default)]
    pub replicas: Vec<Replica>,
}

impl DataPartition {
    /// Returns the role assigned to `broker`, if any.
    ///
    /// A broker listed more than once takes `Primary` if any entry is
    /// primary, otherwise the first entry's role.
    #[must_use]
    pub fn role_of(&self, broker: &BrokerName) -> Option<ReplicaRole> {
        let mut found = None;
        for replica in self.replicas.iter().filter(|r| &r.broker == broker) {
            if replica.role == ReplicaRole::Primary {
                return Some(ReplicaRole::Primary);
            }
            found.get_or_insert(replica.role);
        }
        found
    }

    /// Returns true if the partition is in service.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.status != ReplicaRole::Free
    }
}

/// Cluster sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCommon {
    /// Number of partitions.
    pub partition_count: usize,
    /// Replicas per partition.
    pub replica_count: usize,
}

/// Consumer position on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscribed topic.
    pub topic: TopicName,
    /// Last consumed offset.
    pub offset: Offset,
}

/// Consumer subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConsumer {
    /// Consumer ID.
    pub consumer_id: ConsumerId,
    /// Topics and positions.
    #[serde(default)]
    pub subs: Vec<Subscription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(broker: &str, role: ReplicaRole) -> Replica {
        Replica {
            broker: BrokerName::new(broker),
            role,
        }
    }

    #[test]
    fn test_partition_json_shape() {
        let partition = DataPartition {
            partition_id: PartitionId::new("ab"),
            topic: TopicName::new("t"),
            status: ReplicaRole::Primary,
            replicas: vec![replica("b1", ReplicaRole::Primary)],
        };
        let json = serde_json::to_value(&partition).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "partitionId": "ab",
                "topic": "t",
                "status": "primary",
                "replicas": [{"broker": "b1", "role": "primary"}]
            })
        );
    }

    #[test]
    fn test_partition_missing_fields_default() {
        let partition: DataPartition = serde_json::from_str(r#"{"partitionId":"x"}"#).unwrap();
        assert!(!partition.is_used());
        assert_eq!(partition.status, ReplicaRole::Free);
        assert!(partition.replicas.is_empty());
    }

    #[test]
    fn test_role_of() {
        let partition = DataPartition {
            partition_id: PartitionId::new("x"),
            topic: TopicName::default(),
            status: ReplicaRole::Free,
            replicas: vec![
                replica("b1", ReplicaRole::Follow),
                replica("b2", ReplicaRole::Follow),
                replica("b1", ReplicaRole::Primary),
            ],
        };
        assert_eq!(
            partition.role_of(&BrokerName::new("b1")),
            Some(ReplicaRole::Primary)
        );
        assert_eq!(
            partition.role_of(&BrokerName::new("b2")),
            Some(ReplicaRole::Follow)
        );
        assert_eq!(partition.role_of(&BrokerName::new("b3")), None);
    }

    #[test]
    fn test_common_and_consumer() {
        let common: DataCommon =
            serde_json::from_str(r#"{"partitionCount":4,"replicaCount":2}"#).unwrap();
        assert_eq!(common.partition_count, 4);

        let consumer: DataConsumer = serde_json::from_str(
            r#"{"consumerId":"c1","subs":[{"topic":"t","offset":7}]}"#,
        )
        .unwrap();
        assert_eq!(consumer.subs[0].offset, Offset::new(7));
    }
}
