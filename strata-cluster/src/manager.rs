//! Partition manager.
//!
//! Tracks the cluster's partition assignments and the partitions
//! materialized on this broker, and routes reads and writes to them.
//!
//! Both maps sit behind one lock. Data-path calls clone the partition
//! handle and release the lock before touching storage, so partitions
//! never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use strata_core::{BrokerName, Offset, PartitionId, ReplicaRole};
use strata_log::Storage;
use strata_partition::{Partition, PartitionConfig, PartitionError, PartitionSnapshot};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::keys::ClusterKeys;
use crate::model::DataPartition;
use crate::registry::{decode, ClusterRegistry};
use crate::store::{WatchAction, WatchEvent};

#[derive(Default)]
struct ManagerState {
    configs: HashMap<PartitionId, DataPartition>,
    locals: HashMap<PartitionId, Arc<Partition>>,
}

/// Routes partition traffic on one broker.
pub struct PartitionManager {
    broker: BrokerName,
    storage: Arc<dyn Storage>,
    config: PartitionConfig,
    state: RwLock<ManagerState>,
}

impl std::fmt::Debug for PartitionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionManager")
            .field("broker", &self.broker)
            .field("root", &self.config.root)
            .finish_non_exhaustive()
    }
}

impl PartitionManager {
    /// Creates an empty manager for `broker`.
    #[must_use]
    pub fn new(broker: BrokerName, storage: Arc<dyn Storage>, config: PartitionConfig) -> Self {
        Self {
            broker,
            storage,
            config,
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Broker this manager serves.
    #[must_use]
    pub const fn broker(&self) -> &BrokerName {
        &self.broker
    }

    /// Upserts an assignment and opens every partition assigned to this
    /// broker that is not open yet.
    ///
    /// A partition that is already open follows role changes. If the
    /// assignment no longer names this broker the partition stays open as
    /// `Free`.
    ///
    /// # Errors
    /// Returns `InvalidId` (wrapped in `Partition`) for an ID that cannot
    /// name a directory, without recording the assignment. Otherwise returns
    /// the first partition that failed to open. Assignments are kept, so a
    /// later call retries.
    pub async fn add_config(&self, config: DataPartition) -> ClusterResult<()> {
        let id = config.partition_id.clone();
        self.config.partition_dir(&id)?;
        let mut state = self.state.write().await;

        if let Some(partition) = state.locals.get(&id) {
            let role = config.role_of(&self.broker).unwrap_or_else(|| {
                warn!(
                    partition = %id,
                    broker = %self.broker,
                    "Assignment no longer names this broker, keeping partition as standby"
                );
                ReplicaRole::Free
            });
            if partition.status().await != role {
                partition.set_status(role).await;
            }
        }
        state.configs.insert(id, config);

        let pending: Vec<(DataPartition, ReplicaRole)> = state
            .configs
            .values()
            .filter(|c| !state.locals.contains_key(&c.partition_id))
            .filter_map(|c| c.role_of(&self.broker).map(|role| (c.clone(), role)))
            .collect();

        for (config, role) in pending {
            let partition = Partition::open(
                Arc::clone(&self.storage),
                self.config.clone(),
                config.partition_id.clone(),
                config.topic.clone(),
                role,
            )
            .await?;
            info!(partition = %config.partition_id, %role, "Materialized partition");
            state
                .locals
                .insert(config.partition_id, Arc::new(partition));
        }
        Ok(())
    }

    /// Forgets an assignment. A materialized partition stays open.
    pub async fn remove_config(&self, id: &PartitionId) {
        let mut state = self.state.write().await;
        if state.configs.remove(id).is_some() {
            debug!(partition = %id, "Removed assignment");
        }
    }

    /// Returns the local partition handle.
    pub async fn partition(&self, id: &PartitionId) -> Option<Arc<Partition>> {
        self.state.read().await.locals.get(id).cloned()
    }

    async fn local(&self, id: &PartitionId) -> ClusterResult<Arc<Partition>> {
        self.partition(id)
            .await
            .ok_or_else(|| ClusterError::PartitionNotFound {
                partition: id.clone(),
            })
    }

    /// Appends `message` to a local partition.
    ///
    /// # Errors
    /// Returns `PartitionNotFound` if the partition is not open here, or
    /// the partition's fatal write error.
    pub async fn put(&self, id: &PartitionId, message: &[u8]) -> ClusterResult<Offset> {
        let partition = self.local(id).await?;
        Ok(partition.write(message).await?)
    }

    /// Reads one message from a local partition. `None` means the offset
    /// holds no readable message.
    ///
    /// # Errors
    /// Returns `PartitionNotFound` if the partition is not open here, or a
    /// storage error.
    pub async fn get(&self, id: &PartitionId, offset: Offset) -> ClusterResult<Option<Bytes>> {
        let partition = self.local(id).await?;
        Ok(partition.read(offset).await?)
    }

    /// Returns the known assignment for `id`.
    pub async fn config(&self, id: &PartitionId) -> Option<DataPartition> {
        self.state.read().await.configs.get(id).cloned()
    }

    /// Number of known assignments.
    pub async fn config_count(&self) -> usize {
        self.state.read().await.configs.len()
    }

    /// Snapshots every local partition, sorted by ID.
    pub async fn snapshots(&self) -> Vec<PartitionSnapshot> {
        let partitions: Vec<Arc<Partition>> =
            self.state.read().await.locals.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(partitions.len());
        for partition in partitions {
            snapshots.push(partition.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Flushes every local partition.
    ///
    /// # Errors
    /// Returns the first sync failure.
    pub async fn sync_all(&self) -> ClusterResult<()> {
        let partitions: Vec<Arc<Partition>> =
            self.state.read().await.locals.values().cloned().collect();
        for partition in partitions {
            partition.sync().await?;
        }
        Ok(())
    }

    /// Applies one change from the partition watch.
    ///
    /// Malformed values are logged and ignored.
    ///
    /// # Errors
    /// Returns a partition open failure.
    pub async fn apply_event(&self, keys: &ClusterKeys, event: &WatchEvent) -> ClusterResult<()> {
        let prefix = keys.partition_prefix();
        let Some(name) = ClusterKeys::name_from_key(&prefix, &event.key) else {
            debug!(key = %event.key, "Ignoring event outside partition namespace");
            return Ok(());
        };

        match event.action {
            WatchAction::Add | WatchAction::Update => {
                match decode::<DataPartition>(&event.key, &event.value) {
                    Ok(config) if config.partition_id.as_str() != name => {
                        warn!(
                            key = %event.key,
                            partition = %config.partition_id,
                            "Ignoring assignment whose ID does not match its key"
                        );
                        Ok(())
                    }
                    Ok(config) => self.add_config(config).await,
                    Err(e) => {
                        warn!(key = %event.key, error = %e, "Ignoring malformed assignment");
                        Ok(())
                    }
                }
            }
            WatchAction::Delete | WatchAction::Expire => {
                self.remove_config(&PartitionId::new(name)).await;
                Ok(())
            }
        }
    }

    /// Subscribes to assignment changes, then loads the current assignments.
    ///
    /// The watch is opened first so no change between listing and
    /// subscribing is lost. Returns the subscription for [`Self::run_watch`].
    ///
    /// # Errors
    /// Returns a store error or a partition open failure.
    pub async fn bootstrap(
        &self,
        registry: &ClusterRegistry,
        cancel: CancellationToken,
    ) -> ClusterResult<mpsc::Receiver<WatchEvent>> {
        let events = registry
            .store()
            .watch_prefix(&registry.keys().partition_prefix(), cancel)
            .await?;

        let configs = registry.partitions().await?;
        let count = configs.len();
        for config in configs {
            match self.add_config(config).await {
                Err(ClusterError::Partition(e @ PartitionError::InvalidId { .. })) => {
                    warn!(error = %e, "Skipping assignment with invalid partition ID");
                }
                result => result?,
            }
        }
        info!(broker = %self.broker, assignments = count, "Loaded partition assignments");
        Ok(events)
    }

    /// Applies watch events until the subscription closes.
    ///
    /// # Errors
    /// Returns the first fatal error. Non-fatal failures are logged.
    pub async fn run_watch(
        &self,
        keys: &ClusterKeys,
        mut events: mpsc::Receiver<WatchEvent>,
    ) -> ClusterResult<()> {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.apply_event(keys, &event).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(key = %event.key, error = %e, "Failed to apply assignment change");
            }
        }
        debug!(broker = %self.broker, "Partition watch closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::TopicName;
    use strata_log::MemoryStorage;

    use super::*;
    use crate::memory::InMemoryCoordinationStore;
    use crate::model::Replica;
    use crate::registry::encode;
    use crate::store::CoordinationStore;

    fn manager(broker: &str) -> PartitionManager {
        PartitionManager::new(
            BrokerName::new(broker),
            Arc::new(MemoryStorage::new()),
            PartitionConfig::new("/data", "test"),
        )
    }

    fn assignment(id: &str, replicas: &[(&str, ReplicaRole)]) -> DataPartition {
        DataPartition {
            partition_id: PartitionId::new(id),
            topic: TopicName::default(),
            status: ReplicaRole::Free,
            replicas: replicas
                .iter()
                .map(|(broker, role)| Replica {
                    broker: BrokerName::new(*broker),
                    role: *role,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_routing() {
        let manager = manager("b1");
        let id = PartitionId::new("p1");

        let err = manager.put(&id, b"x").await.unwrap_err();
        assert!(matches!(err, ClusterError::PartitionNotFound { .. }));

        manager
            .add_config(assignment("p1", &[("b1", ReplicaRole::Primary)]))
            .await
            .unwrap();
        assert_eq!(manager.put(&id, b"x").await.unwrap(), Offset::new(1));
        assert_eq!(
            manager.get(&id, Offset::new(1)).await.unwrap(),
            Some(Bytes::from_static(b"x"))
        );
        assert_eq!(manager.get(&id, Offset::new(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_assignment_not_materialized() {
        let manager = manager("b1");
        manager
            .add_config(assignment("p1", &[("b2", ReplicaRole::Primary)]))
            .await
            .unwrap();
        assert_eq!(manager.config_count().await, 1);
        assert!(manager.partition(&PartitionId::new("p1")).await.is_none());
    }

    #[tokio::test]
    async fn test_role_change_and_standby() {
        let manager = manager("b1");
        let id = PartitionId::new("p1");
        manager
            .add_config(assignment("p1", &[("b1", ReplicaRole::Follow)]))
            .await
            .unwrap();
        let partition = manager.partition(&id).await.unwrap();
        assert_eq!(partition.status().await, ReplicaRole::Follow);

        manager
            .add_config(assignment("p1", &[("b1", ReplicaRole::Primary)]))
            .await
            .unwrap();
        assert_eq!(partition.status().await, ReplicaRole::Primary);

        manager
            .add_config(assignment("p1", &[("b2", ReplicaRole::Primary)]))
            .await
            .unwrap();
        assert_eq!(partition.status().await, ReplicaRole::Free);
        assert!(manager.partition(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_apply_events() {
        let manager = manager("b1");
        let keys = ClusterKeys::new("test");
        let config = assignment("p1", &[("b1", ReplicaRole::Primary)]);
        let key = keys.partition(&config.partition_id);

        manager
            .apply_event(
                &keys,
                &WatchEvent {
                    action: WatchAction::Add,
                    key: key.clone(),
                    value: encode(&key, &config).unwrap(),
                },
            )
            .await
            .unwrap();
        assert!(manager.partition(&config.partition_id).await.is_some());

        manager
            .apply_event(
                &keys,
                &WatchEvent {
                    action: WatchAction::Update,
                    key: key.clone(),
                    value: Bytes::from_static(b"{broken"),
                },
            )
            .await
            .unwrap();

        manager
            .apply_event(
                &keys,
                &WatchEvent {
                    action: WatchAction::Delete,
                    key,
                    value: Bytes::new(),
                },
            )
            .await
            .unwrap();
        assert!(manager.config(&config.partition_id).await.is_none());
        assert!(manager.partition(&config.partition_id).await.is_some());
    }

    #[tokio::test]
    async fn test_invalid_partition_id_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = PartitionManager::new(
            BrokerName::new("b1"),
            Arc::clone(&storage) as Arc<dyn Storage>,
            PartitionConfig::new("/data", "test"),
        );

        for id in ["../../escaped", "..", "a/b", ""] {
            let err = manager
                .add_config(assignment(id, &[("b1", ReplicaRole::Primary)]))
                .await
                .unwrap_err();
            assert!(
                matches!(err, ClusterError::Partition(PartitionError::InvalidId { .. })),
                "{id:?}"
            );
        }
        assert_eq!(manager.config_count().await, 0);
        assert!(manager.snapshots().await.is_empty());
        assert!(storage.paths().is_empty());
    }

    #[tokio::test]
    async fn test_event_with_mismatched_id_ignored() {
        let manager = manager("b1");
        let keys = ClusterKeys::new("test");
        let key = keys.partition(&PartitionId::new("a"));
        let config = assignment("b", &[("b1", ReplicaRole::Primary)]);

        manager
            .apply_event(
                &keys,
                &WatchEvent {
                    action: WatchAction::Add,
                    key: key.clone(),
                    value: encode(&key, &config).unwrap(),
                },
            )
            .await
            .unwrap();
        assert_eq!(manager.config_count().await, 0);
        assert!(manager.partition(&PartitionId::new("b")).await.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_skips_invalid_ids() {
        let store = InMemoryCoordinationStore::new();
        let keys = ClusterKeys::new("test");
        let registry = ClusterRegistry::new(Arc::new(store), keys);
        registry
            .put_partition(&assignment("..", &[("b1", ReplicaRole::Primary)]))
            .await
            .unwrap();
        registry
            .put_partition(&assignment("p1", &[("b1", ReplicaRole::Primary)]))
            .await
            .unwrap();

        let manager = manager("b1");
        let _events = manager
            .bootstrap(&registry, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(manager.config_count().await, 1);
        assert!(manager.partition(&PartitionId::new("p1")).await.is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_then_watch() {
        let store = InMemoryCoordinationStore::new();
        let keys = ClusterKeys::new("test");
        let registry = ClusterRegistry::new(Arc::new(store.clone()), keys.clone());
        registry
            .put_partition(&assignment("p1", &[("b1", ReplicaRole::Primary)]))
            .await
            .unwrap();

        let manager = Arc::new(manager("b1"));
        let cancel = CancellationToken::new();
        let events = manager.bootstrap(&registry, cancel.clone()).await.unwrap();
        assert!(manager.partition(&PartitionId::new("p1")).await.is_some());

        let watcher = {
            let manager = Arc::clone(&manager);
            let keys = keys.clone();
            tokio::spawn(async move { manager.run_watch(&keys, events).await })
        };

        let p2 = assignment("p2", &[("b1", ReplicaRole::Follow)]);
        let key = keys.partition(&p2.partition_id);
        store.put(&key, encode(&key, &p2).unwrap()).await.unwrap();

        let id = PartitionId::new("p2");
        for _ in 0..100 {
            if manager.partition(&id).await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(manager.partition(&id).await.is_some());

        cancel.cancel();
        assert!(watcher.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_snapshots_sorted() {
        let manager = manager("b1");
        for id in ["p2", "p1"] {
            manager
                .add_config(assignment(id, &[("b1", ReplicaRole::Primary)]))
                .await
                .unwrap();
        }
        let ids: Vec<String> = manager
            .snapshots()
            .await
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        manager.sync_all().await.unwrap();
    }
}
