//! Typed access to cluster values.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_core::{BrokerName, ConsumerId, PartitionId, TopicName};
use tracing::warn;

use crate::error::{ClusterError, ClusterResult};
use crate::keys::ClusterKeys;
use crate::model::{DataBroker, DataCommon, DataConsumer, DataPartition, DataTopic};
use crate::store::{CoordinationStore, KeyValue};

/// Encodes a value as JSON.
///
/// # Errors
/// Returns `Codec` if serialization fails.
pub fn encode<T: Serialize>(key: &str, value: &T) -> ClusterResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ClusterError::codec(key, e))
}

/// Decodes a JSON value.
///
/// # Errors
/// Returns `Codec` if the bytes are not a valid `T`.
pub fn decode<T: DeserializeOwned>(key: &str, value: &[u8]) -> ClusterResult<T> {
    serde_json::from_slice(value).map_err(|e| ClusterError::codec(key, e))
}

/// JSON views over one cluster's namespace.
#[derive(Clone)]
pub struct ClusterRegistry {
    store: Arc<dyn CoordinationStore>,
    keys: ClusterKeys,
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("cluster", &self.keys.cluster())
            .finish_non_exhaustive()
    }
}

impl ClusterRegistry {
    /// Creates a registry over `store` for the namespace `keys`.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, keys: ClusterKeys) -> Self {
        Self { store, keys }
    }

    /// Returns the store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Returns the key namespace.
    #[must_use]
    pub const fn keys(&self) -> &ClusterKeys {
        &self.keys
    }

    async fn put<T: Serialize + Sync>(&self, key: &str, value: &T) -> ClusterResult<()> {
        let bytes = encode(key, value)?;
        self.store.put(key, bytes).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> ClusterResult<Option<T>> {
        match self.store.get(key).await {
            Ok(bytes) => decode(key, &bytes).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list<T: DeserializeOwned>(&self, prefix: &str) -> ClusterResult<Vec<T>> {
        let entries = match self.store.list_prefix(prefix).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(decode_all(entries))
    }

    /// Lists live brokers.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn brokers(&self) -> ClusterResult<Vec<DataBroker>> {
        self.list(&self.keys.broker_prefix()).await
    }

    /// Returns one broker.
    ///
    /// # Errors
    /// Returns an error if the store fails or the value is malformed.
    pub async fn broker(&self, name: &BrokerName) -> ClusterResult<Option<DataBroker>> {
        self.get(&self.keys.broker(name)).await
    }

    /// Lists registered topics.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn topics(&self) -> ClusterResult<Vec<DataTopic>> {
        self.list(&self.keys.topic_prefix()).await
    }

    /// Returns one topic.
    ///
    /// # Errors
    /// Returns an error if the store fails or the value is malformed.
    pub async fn topic(&self, topic: &TopicName) -> ClusterResult<Option<DataTopic>> {
        self.get(&self.keys.topic(topic)).await
    }

    /// Writes a topic.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn put_topic(&self, topic: &DataTopic) -> ClusterResult<()> {
        self.put(&self.keys.topic(&topic.topic), topic).await
    }

    /// Lists partition assignments.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn partitions(&self) -> ClusterResult<Vec<DataPartition>> {
        self.list(&self.keys.partition_prefix()).await
    }

    /// Returns one partition assignment.
    ///
    /// # Errors
    /// Returns an error if the store fails or the value is malformed.
    pub async fn partition(&self, id: &PartitionId) -> ClusterResult<Option<DataPartition>> {
        self.get(&self.keys.partition(id)).await
    }

    /// Writes a partition assignment.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn put_partition(&self, partition: &DataPartition) -> ClusterResult<()> {
        self.put(&self.keys.partition(&partition.partition_id), partition)
            .await
    }

    /// Returns cluster sizing, if set.
    ///
    /// # Errors
    /// Returns an error if the store fails or the value is malformed.
    pub async fn common(&self) -> ClusterResult<Option<DataCommon>> {
        self.get(&self.keys.common()).await
    }

    /// Writes cluster sizing.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn put_common(&self, common: &DataCommon) -> ClusterResult<()> {
        self.put(&self.keys.common(), common).await
    }

    /// Lists consumers.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn consumers(&self) -> ClusterResult<Vec<DataConsumer>> {
        self.list(&self.keys.consumer_prefix()).await
    }

    /// Returns one consumer.
    ///
    /// # Errors
    /// Returns an error if the store fails or the value is malformed.
    pub async fn consumer(&self, id: &ConsumerId) -> ClusterResult<Option<DataConsumer>> {
        self.get(&self.keys.consumer(id)).await
    }

    /// Writes a consumer.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn put_consumer(&self, consumer: &DataConsumer) -> ClusterResult<()> {
        self.put(&self.keys.consumer(&consumer.consumer_id), consumer)
            .await
    }
}

fn decode_all<T: DeserializeOwned>(entries: Vec<KeyValue>) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|kv| match decode(&kv.key, &kv.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %kv.key, error = %e, "Skipping malformed value");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use strata_core::{Offset, ReplicaRole};

    use super::*;
    use crate::memory::InMemoryCoordinationStore;
    use crate::model::{Replica, Subscription};

    fn registry() -> (InMemoryCoordinationStore, ClusterRegistry) {
        let store = InMemoryCoordinationStore::new();
        let registry = ClusterRegistry::new(Arc::new(store.clone()), ClusterKeys::new("test"));
        (store, registry)
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let (_, registry) = registry();
        assert!(registry.brokers().await.unwrap().is_empty());
        assert!(registry.partitions().await.unwrap().is_empty());
        assert!(registry.common().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partition_roundtrip_and_malformed_skip() {
        let (store, registry) = registry();
        let partition = DataPartition {
            partition_id: PartitionId::new("p1"),
            topic: TopicName::default(),
            status: ReplicaRole::Free,
            replicas: vec![Replica {
                broker: BrokerName::new("b1"),
                role: ReplicaRole::Primary,
            }],
        };
        registry.put_partition(&partition).await.unwrap();
        store
            .put("/test/partition/bad", Bytes::from_static(b"not json"))
            .await
            .unwrap();

        let listed = registry.partitions().await.unwrap();
        assert_eq!(listed, vec![partition.clone()]);
        assert_eq!(
            registry.partition(&PartitionId::new("p1")).await.unwrap(),
            Some(partition)
        );
        assert!(matches!(
            registry.partition(&PartitionId::new("bad")).await,
            Err(ClusterError::Codec { .. })
        ));
    }

    #[tokio::test]
    async fn test_common_topic_consumer() {
        let (_, registry) = registry();
        registry
            .put_common(&DataCommon {
                partition_count: 3,
                replica_count: 1,
            })
            .await
            .unwrap();
        assert_eq!(registry.common().await.unwrap().unwrap().partition_count, 3);

        let topic = DataTopic {
            topic: TopicName::new("orders"),
            partition_id: PartitionId::new("p1"),
        };
        registry.put_topic(&topic).await.unwrap();
        assert_eq!(registry.topics().await.unwrap(), vec![topic]);

        let consumer = DataConsumer {
            consumer_id: ConsumerId::new("c1"),
            subs: vec![Subscription {
                topic: TopicName::new("orders"),
                offset: Offset::new(3),
            }],
        };
        registry.put_consumer(&consumer).await.unwrap();
        assert_eq!(
            registry.consumer(&ConsumerId::new("c1")).await.unwrap(),
            Some(consumer)
        );
    }
}
