//! Partition management.
//!
//! A partition is an append-only sequence of messages addressed by offset.
//! Writes are serialized behind the partition's lock and each one takes the
//! next offset; reads share the lock and never block each other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use strata_core::{Offset, PartitionId, ReplicaRole, TopicName};
use strata_log::{Segment, SegmentList, Storage};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::PartitionConfig;
use crate::error::{PartitionError, PartitionResult};

/// Point-in-time view of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSnapshot {
    /// Partition ID.
    pub id: PartitionId,
    /// Topic the partition belongs to.
    pub topic: TopicName,
    /// Current replica role.
    pub status: ReplicaRole,
    /// Offset of the last written message.
    pub offset: Offset,
    /// Number of segments.
    pub segment_count: usize,
    /// Total log size in bytes.
    pub size_bytes: u64,
}

struct PartitionState {
    status: ReplicaRole,
    offset: Offset,
    segments: SegmentList,
}

/// A locally materialized partition replica.
pub struct Partition {
    id: PartitionId,
    topic: TopicName,
    dir: PathBuf,
    storage: Arc<dyn Storage>,
    config: PartitionConfig,
    state: RwLock<PartitionState>,
}

impl Partition {
    /// Opens the partition, recovering its segments from disk.
    ///
    /// The partition directory is created if missing. A partition without
    /// segments starts with one empty segment at offset 0.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or recovery fails.
    pub async fn open(
        storage: Arc<dyn Storage>,
        config: PartitionConfig,
        id: PartitionId,
        topic: TopicName,
        status: ReplicaRole,
    ) -> PartitionResult<Self> {
        config.validate()?;
        let dir = config.partition_dir(&id)?;

        let segments = SegmentList::recover(Arc::clone(&storage), &dir, &config.segment_config)
            .await
            .map_err(|e| PartitionError::storage(&id, e))?;
        let offset = segments.last().map_or(Offset::ZERO, Segment::end);

        info!(
            partition = %id,
            %topic,
            %status,
            offset = offset.get(),
            segments = segments.len(),
            "Opened partition"
        );

        Ok(Self {
            id,
            topic,
            dir,
            storage,
            config,
            state: RwLock::new(PartitionState {
                status,
                offset,
                segments,
            }),
        })
    }

    /// Appends a message and returns its offset.
    ///
    /// When the open segment is full a new segment rooted at the new offset
    /// is created and the write retried there.
    ///
    /// # Errors
    /// Any storage failure is returned as [`PartitionError::Fatal`]; the
    /// partition offset is unchanged in that case.
    pub async fn write(&self, message: &[u8]) -> PartitionResult<Offset> {
        let mut state = self.state.write().await;
        let next = state.offset.next();

        let result = match state.segments.last_mut() {
            Some(segment) => segment.write(next, message).await,
            None => Err(strata_log::LogError::SegmentFull { offset: next.get() }),
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_segment_full() => {
                self.rotate(&mut state, next).await?;
                if let Some(segment) = state.segments.last_mut() {
                    segment
                        .write(next, message)
                        .await
                        .map_err(|e| PartitionError::fatal(&self.id, "write", e))?;
                }
            }
            Err(e) => return Err(PartitionError::fatal(&self.id, "write", e)),
        }

        state.offset = next;
        debug!(partition = %self.id, offset = next.get(), bytes = message.len(), "Wrote message");
        Ok(next)
    }

    async fn rotate(&self, state: &mut PartitionState, begin: Offset) -> PartitionResult<()> {
        let segment = Segment::open(
            Arc::clone(&self.storage),
            &self.dir,
            begin,
            &self.config.segment_config,
        )
        .await
        .map_err(|e| PartitionError::fatal(&self.id, "rotate", e))?;
        state.segments.add([segment]);
        info!(partition = %self.id, begin = begin.get(), "Rotated to new segment");

        if let Some(max) = self.config.max_segments {
            while state.segments.len() > max {
                let dropped = state
                    .segments
                    .drop_oldest()
                    .await
                    .map_err(|e| PartitionError::fatal(&self.id, "retention", e))?;
                if let Some(dropped) = dropped {
                    info!(partition = %self.id, begin = dropped.get(), "Deleted oldest segment");
                }
            }
        }
        Ok(())
    }

    /// Reads the message at `id`.
    ///
    /// Returns `Ok(None)` if the offset was never written, was deleted, or
    /// its record failed verification.
    ///
    /// # Errors
    /// Returns an error only for storage I/O failures.
    pub async fn read(&self, id: Offset) -> PartitionResult<Option<Bytes>> {
        let state = self.state.read().await;
        let Some(segment) = state.segments.find(id) else {
            return Ok(None);
        };
        segment
            .read(id)
            .await
            .map_err(|e| PartitionError::storage(&self.id, e))
    }

    /// Replaces the replica role.
    pub async fn set_status(&self, status: ReplicaRole) {
        let mut state = self.state.write().await;
        if state.status != status {
            info!(partition = %self.id, from = %state.status, to = %status, "Replica role changed");
            state.status = status;
        }
    }

    /// Deletes every message and restarts the partition at offset 0.
    ///
    /// The next write after a reset is assigned offset 1.
    ///
    /// # Errors
    /// Returns [`PartitionError::Fatal`] if segments cannot be deleted or
    /// recreated.
    pub async fn reset(&self) -> PartitionResult<()> {
        let mut state = self.state.write().await;
        let untouched = state.offset == Offset::ZERO
            && state.segments.len() == 1
            && state.segments.last().is_some_and(Segment::is_empty);
        if untouched {
            return Ok(());
        }

        if let Err(e) = state.segments.destroy_all().await {
            warn!(partition = %self.id, error = %e, "Failed to delete segments during reset");
            return Err(PartitionError::fatal(&self.id, "reset", e));
        }

        let segment = Segment::open(
            Arc::clone(&self.storage),
            &self.dir,
            Offset::ZERO,
            &self.config.segment_config,
        )
        .await
        .map_err(|e| PartitionError::fatal(&self.id, "reset", e))?;
        state.segments.add([segment]);
        state.offset = Offset::ZERO;

        info!(partition = %self.id, "Reset partition");
        Ok(())
    }

    /// Forces every segment to durable storage.
    ///
    /// # Errors
    /// Returns an error if a sync fails.
    pub async fn sync(&self) -> PartitionResult<()> {
        let mut state = self.state.write().await;
        state
            .segments
            .sync()
            .await
            .map_err(|e| PartitionError::fatal(&self.id, "sync", e))
    }

    /// Returns the partition ID.
    #[must_use]
    pub const fn id(&self) -> &PartitionId {
        &self.id
    }

    /// Returns the topic.
    #[must_use]
    pub const fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Returns the partition directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the current replica role.
    pub async fn status(&self) -> ReplicaRole {
        self.state.read().await.status
    }

    /// Returns the offset of the last written message (0 when empty).
    pub async fn offset(&self) -> Offset {
        self.state.read().await.offset
    }

    /// Returns a point-in-time view of the partition.
    pub async fn snapshot(&self) -> PartitionSnapshot {
        let state = self.state.read().await;
        PartitionSnapshot {
            id: self.id.clone(),
            topic: self.topic.clone(),
            status: state.status,
            offset: state.offset,
            segment_count: state.segments.len(),
            size_bytes: state.segments.iter().map(Segment::size_bytes).sum(),
        }
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_log::storage::FaultConfig;
    use strata_log::{MemoryStorage, SegmentConfig, TokioStorage};

    fn small_config(root: &Path) -> PartitionConfig {
        // Three one-byte messages fill a segment.
        PartitionConfig::new(root, "test")
            .with_segment_config(SegmentConfig::new().with_capacity_bytes(75))
    }

    async fn open(storage: Arc<dyn Storage>, config: PartitionConfig) -> Partition {
        Partition::open(
            storage,
            config,
            PartitionId::new("p0"),
            TopicName::new("orders"),
            ReplicaRole::Primary,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_partition_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let partition = open(Arc::new(TokioStorage::new()), small_config(dir.path())).await;

        assert_eq!(partition.offset().await, Offset::ZERO);
        assert_eq!(partition.write(b"first").await.unwrap(), Offset::new(1));
        assert!(partition.dir().ends_with("test/p0"));
    }

    #[tokio::test]
    async fn test_offsets_continue_across_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let partition = open(Arc::new(TokioStorage::new()), small_config(dir.path())).await;

        for (expected, message) in [b"a", b"b", b"c", b"d"].iter().enumerate() {
            let offset = partition.write(*message).await.unwrap();
            assert_eq!(offset.get(), expected as u64 + 1);
        }

        let snapshot = partition.snapshot().await;
        assert_eq!(snapshot.segment_count, 2);
        assert_eq!(snapshot.offset, Offset::new(4));
        assert_eq!(&partition.read(Offset::new(2)).await.unwrap().unwrap()[..], b"b");
        assert_eq!(&partition.read(Offset::new(4)).await.unwrap().unwrap()[..], b"d");
        assert!(partition.read(Offset::new(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let partition = open(Arc::new(TokioStorage::new()), small_config(dir.path())).await;
        for message in [b"a", b"b", b"c", b"d", b"e"] {
            partition.write(message).await.unwrap();
        }

        partition.reset().await.unwrap();
        assert_eq!(partition.offset().await, Offset::ZERO);
        for id in 1..=5 {
            assert!(partition.read(Offset::new(id)).await.unwrap().is_none());
        }
        assert_eq!(partition.snapshot().await.segment_count, 1);
        assert_eq!(partition.write(b"again").await.unwrap(), Offset::new(1));
        assert_eq!(&partition.read(Offset::new(1)).await.unwrap().unwrap()[..], b"again");
    }

    #[tokio::test]
    async fn test_reset_of_empty_partition_is_noop() {
        let storage = MemoryStorage::new();
        let partition = open(Arc::new(storage.clone()), small_config(Path::new("/data"))).await;
        let before = storage.paths();

        partition.reset().await.unwrap();
        assert_eq!(storage.paths(), before);
        assert_eq!(partition.offset().await, Offset::ZERO);
    }

    #[tokio::test]
    async fn test_set_status() {
        let storage = MemoryStorage::new();
        let partition = open(Arc::new(storage), small_config(Path::new("/data"))).await;

        partition.set_status(ReplicaRole::Follow).await;
        assert_eq!(partition.status().await, ReplicaRole::Follow);
        partition.set_status(ReplicaRole::Free).await;
        assert_eq!(partition.snapshot().await.status, ReplicaRole::Free);
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal_and_keeps_offset() {
        let storage = MemoryStorage::new();
        let partition = open(Arc::new(storage.clone()), small_config(Path::new("/data"))).await;
        partition.write(b"a").await.unwrap();

        storage.inject(FaultConfig {
            fail_next_write: true,
            ..FaultConfig::default()
        });
        let err = partition.write(b"b").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(partition.offset().await, Offset::new(1));
    }

    #[tokio::test]
    async fn test_reopen_resumes_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        {
            let partition = open(Arc::new(TokioStorage::new()), config.clone()).await;
            for message in [b"a", b"b", b"c", b"d"] {
                partition.write(message).await.unwrap();
            }
            partition.sync().await.unwrap();
        }

        let partition = open(Arc::new(TokioStorage::new()), config).await;
        assert_eq!(partition.offset().await, Offset::new(4));
        assert_eq!(&partition.read(Offset::new(3)).await.unwrap().unwrap()[..], b"c");
        assert_eq!(partition.write(b"e").await.unwrap(), Offset::new(5));
    }

    #[tokio::test]
    async fn test_retention_drops_oldest_segments() {
        let storage = MemoryStorage::new();
        let config = small_config(Path::new("/data")).with_max_segments(Some(2));
        let partition = open(Arc::new(storage), config).await;

        for i in 0..9u8 {
            partition.write(&[i]).await.unwrap();
        }
        // Segments hold 1..=3, 4..=6, 7..=9; the first one is gone.
        assert_eq!(partition.snapshot().await.segment_count, 2);
        assert!(partition.read(Offset::new(1)).await.unwrap().is_none());
        assert_eq!(&partition.read(Offset::new(4)).await.unwrap().unwrap()[..], &[3u8]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_get_unique_offsets() {
        let storage = MemoryStorage::new();
        let partition = Arc::new(open(Arc::new(storage), small_config(Path::new("/data"))).await);

        let mut handles = Vec::new();
        for task in 0..4u8 {
            let partition = Arc::clone(&partition);
            handles.push(tokio::spawn(async move {
                let mut offsets = Vec::new();
                for _ in 0..10 {
                    offsets.push(partition.write(&[task]).await.unwrap().get());
                }
                offsets
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=40).collect::<Vec<u64>>());
    }
}
