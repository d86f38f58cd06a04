//! Ordered segments of one partition.

use std::path::Path;
use std::sync::Arc;

use strata_core::Offset;
use tracing::{info, warn};

use crate::config::SegmentConfig;
use crate::error::LogResult;
use crate::segment::{Segment, INDEX_EXTENSION};
use crate::storage::Storage;

/// A partition's segments sorted by starting offset; the last one is open
/// for writes.
#[derive(Debug, Default)]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Rebuilds a partition's segments from the index files in `dir`.
    ///
    /// Every `<offset>.idx` file is opened (and verified) as a segment; files
    /// whose stem is not an offset are skipped. Empty segments trailing the
    /// newest non-empty one are deleted, since a crash between creating a
    /// segment and writing its first record leaves nothing to keep. An empty
    /// directory yields a single empty segment at offset 0.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or listed, or a
    /// segment cannot be opened.
    pub async fn recover(
        storage: Arc<dyn Storage>,
        dir: &Path,
        config: &SegmentConfig,
    ) -> LogResult<Self> {
        storage.create_dir_all(dir).await?;

        let mut starts = Vec::new();
        for path in storage.list_files(dir, INDEX_EXTENSION).await? {
            match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                Some(start) => starts.push(Offset::new(start)),
                None => warn!(?path, "Skipping index file with unparsable name"),
            }
        }

        let mut list = Self::new();
        for start in starts {
            let segment = Segment::open(Arc::clone(&storage), dir, start, config).await?;
            list.add([segment]);
        }

        while list.len() > 1 && list.last().is_some_and(Segment::is_empty) {
            if let Some(segment) = list.segments.pop() {
                info!(begin = segment.begin().get(), "Removing empty trailing segment");
                segment.delete().await?;
            }
        }

        if list.is_empty() {
            list.add([Segment::open(storage, dir, Offset::ZERO, config).await?]);
        }

        for pair in list.segments.windows(2) {
            if !pair[0].is_empty() && pair[1].begin().get() != pair[0].end().get() + 1 {
                warn!(
                    end = pair[0].end().get(),
                    next_begin = pair[1].begin().get(),
                    "Gap between recovered segments"
                );
            }
        }

        info!(
            ?dir,
            segments = list.len(),
            end = list.last().map_or(0, |s| s.end().get()),
            "Segment recovery complete"
        );
        Ok(list)
    }

    /// Appends segments and restores ordering by starting offset.
    pub fn add(&mut self, segments: impl IntoIterator<Item = Segment>) {
        self.segments.extend(segments);
        self.segments.sort_by_key(Segment::begin);
    }

    /// Returns the open segment.
    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Returns the open segment mutably.
    pub fn last_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    /// Returns the segment whose range contains `id`.
    #[must_use]
    pub fn find(&self, id: Offset) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.contains(id))
    }

    /// Deletes the oldest segment and returns its starting offset.
    ///
    /// # Errors
    /// Returns an error if the segment's files cannot be removed.
    pub async fn drop_oldest(&mut self) -> LogResult<Option<Offset>> {
        if self.segments.is_empty() {
            return Ok(None);
        }
        let segment = self.segments.remove(0);
        let begin = segment.begin();
        segment.delete().await?;
        Ok(Some(begin))
    }

    /// Deletes every segment, leaving the list empty.
    ///
    /// # Errors
    /// Returns the first removal error; segments after it are still
    /// dropped from the list.
    pub async fn destroy_all(&mut self) -> LogResult<()> {
        let mut result = Ok(());
        for segment in self.segments.drain(..) {
            if let Err(e) = segment.delete().await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Syncs every segment.
    ///
    /// # Errors
    /// Returns the first sync error.
    pub async fn sync(&mut self) -> LogResult<()> {
        for segment in &mut self.segments {
            segment.sync().await?;
        }
        Ok(())
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the list holds no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterates segments in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const DIR: &str = "/data/c/p";

    fn config() -> SegmentConfig {
        SegmentConfig::new().with_capacity_bytes(75)
    }

    async fn segment(storage: &MemoryStorage, begin: u64) -> Segment {
        Segment::open(Arc::new(storage.clone()), Path::new(DIR), Offset::new(begin), &config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_sorts_by_begin() {
        let storage = MemoryStorage::new();
        let mut list = SegmentList::new();
        list.add([segment(&storage, 10).await, segment(&storage, 0).await]);
        list.add([segment(&storage, 4).await]);

        let begins: Vec<u64> = list.iter().map(|s| s.begin().get()).collect();
        assert_eq!(begins, vec![0, 4, 10]);
        assert_eq!(list.last().unwrap().begin(), Offset::new(10));
    }

    #[tokio::test]
    async fn test_find_and_drop_oldest() {
        let storage = MemoryStorage::new();
        let mut first = segment(&storage, 0).await;
        for id in 1..=3 {
            first.write(Offset::new(id), b"x").await.unwrap();
        }
        let mut second = segment(&storage, 4).await;
        second.write(Offset::new(4), b"y").await.unwrap();

        let mut list = SegmentList::new();
        list.add([first, second]);

        assert_eq!(list.find(Offset::new(2)).unwrap().begin(), Offset::ZERO);
        assert_eq!(list.find(Offset::new(4)).unwrap().begin(), Offset::new(4));
        assert!(list.find(Offset::new(5)).is_none());

        assert_eq!(list.drop_oldest().await.unwrap(), Some(Offset::ZERO));
        assert!(list.find(Offset::new(2)).is_none());
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let storage = MemoryStorage::new();
        let mut list = SegmentList::new();
        list.add([segment(&storage, 0).await, segment(&storage, 4).await]);

        list.destroy_all().await.unwrap();
        assert!(list.is_empty());
        assert!(storage.paths().is_empty());
    }

    #[tokio::test]
    async fn test_recover_empty_dir_creates_initial_segment() {
        let storage = MemoryStorage::new();
        let list = SegmentList::recover(Arc::new(storage.clone()), Path::new(DIR), &config())
            .await
            .unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.last().unwrap().begin(), Offset::ZERO);
        assert_eq!(list.last().unwrap().end(), Offset::ZERO);
    }

    #[tokio::test]
    async fn test_recover_orders_segments_and_skips_junk() {
        let storage = MemoryStorage::new();
        {
            let mut first = segment(&storage, 0).await;
            for id in 1..=3 {
                first.write(Offset::new(id), b"x").await.unwrap();
            }
            let mut second = segment(&storage, 4).await;
            second.write(Offset::new(4), b"y").await.unwrap();
        }
        let _ = storage.open(&Path::new(DIR).join("garbage.idx")).await.unwrap();

        let list = SegmentList::recover(Arc::new(storage.clone()), Path::new(DIR), &config())
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.last().unwrap().end(), Offset::new(4));
        assert_eq!(
            &list.find(Offset::new(3)).unwrap().read(Offset::new(3)).await.unwrap().unwrap()[..],
            b"x"
        );
    }

    #[tokio::test]
    async fn test_recover_drops_empty_trailing_segment() {
        let storage = MemoryStorage::new();
        {
            let mut first = segment(&storage, 0).await;
            for id in 1..=3 {
                first.write(Offset::new(id), b"x").await.unwrap();
            }
            let _empty = segment(&storage, 4).await;
        }

        let list = SegmentList::recover(Arc::new(storage.clone()), Path::new(DIR), &config())
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.last().unwrap().end(), Offset::new(3));
        assert!(storage
            .raw_content(&Path::new(DIR).join("00000000000000000004.idx"))
            .is_none());
    }
}
