//! Partition log segments.
//!
//! A segment covers one contiguous range `[begin, end]` of a partition's
//! offsets and is backed by an index file and a log file that share the
//! segment's starting offset as file stem:
//!
//! ```text
//! /data/<cluster>/<partition>/
//!   00000000000000000000.idx   # positions -> byte offsets
//!   00000000000000000000.log   # checksummed records
//!   00000000000000000042.idx
//!   00000000000000000042.log   # open segment
//! ```
//!
//! `begin` is the offset the segment was created at. A partition's first
//! segment is created at offset 0 while its first record is offset 1, so the
//! segment also tracks the offset of its first stored record and locates
//! record `id` at index position `id - first`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use strata_core::Offset;
use tracing::{debug, info, warn};

use crate::config::SegmentConfig;
use crate::error::{LogError, LogResult};
use crate::index::IndexFile;
use crate::log_file::LogFile;
use crate::storage::Storage;

/// Extension of index files.
pub const INDEX_EXTENSION: &str = "idx";

/// Extension of log files.
pub const LOG_EXTENSION: &str = "log";

/// Returns the file name of a segment file: the 20-digit zero-padded start
/// offset plus `extension`.
#[must_use]
pub fn segment_file_name(begin: Offset, extension: &str) -> String {
    format!("{:020}.{extension}", begin.get())
}

/// One bounded range of a partition log.
pub struct Segment {
    storage: Arc<dyn Storage>,
    begin: Offset,
    end: Offset,
    first: Option<Offset>,
    index: IndexFile,
    log: LogFile,
}

impl Segment {
    /// Opens or creates the segment starting at `begin` in `dir`.
    ///
    /// Existing index entries are replayed and every record they point at is
    /// verified. If any entry is invalid both files are truncated to zero:
    /// the segment comes back empty rather than failing the partition.
    ///
    /// # Errors
    /// Returns an error if the files cannot be opened or read.
    pub async fn open(
        storage: Arc<dyn Storage>,
        dir: &Path,
        begin: Offset,
        config: &SegmentConfig,
    ) -> LogResult<Self> {
        let index_path = dir.join(segment_file_name(begin, INDEX_EXTENSION));
        let log_path = dir.join(segment_file_name(begin, LOG_EXTENSION));

        let index = IndexFile::open(storage.as_ref(), &index_path, config.index_flush).await?;
        let log =
            LogFile::open(storage.as_ref(), &log_path, config.capacity_bytes, config.log_flush).await?;

        let mut segment = Self {
            storage,
            begin,
            end: begin,
            first: None,
            index,
            log,
        };

        if segment.index.count() > 0 {
            segment.recover().await?;
        }
        Ok(segment)
    }

    async fn recover(&mut self) -> LogResult<()> {
        let count = self.index.count();
        if let Some(first) = self.replay().await? {
            self.first = Some(first);
            self.end = Offset::new(first.get() + count - 1);
            info!(
                begin = self.begin.get(),
                end = self.end.get(),
                records = count,
                "Recovered segment"
            );
            return Ok(());
        }

        warn!(
            path = ?self.log.path(),
            records = count,
            "Invalid record found during recovery, discarding segment contents"
        );
        self.index.clear().await?;
        self.log.clear().await?;
        self.first = None;
        self.end = self.begin;
        Ok(())
    }

    /// Verifies every indexed record and returns the offset of the first one,
    /// or `None` if any entry is invalid.
    async fn replay(&self) -> LogResult<Option<Offset>> {
        let mut first = None;
        for position in 0..self.index.count() {
            let Some(byte_offset) = self.index.get(position).await? else {
                return Ok(None);
            };

            let record = match self.log.read(byte_offset).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(position, byte_offset, "Index entry points past end of log");
                    return Ok(None);
                }
                Err(e) if e.is_corruption() => {
                    debug!(position, byte_offset, error = %e, "Corrupt record");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            let expected = match first {
                None if record.offset >= self.begin => {
                    first = Some(record.offset);
                    record.offset
                }
                None => return Ok(None),
                Some(first) => Offset::new(first.get() + position),
            };
            if record.offset != expected {
                debug!(
                    position,
                    expected = expected.get(),
                    stored = record.offset.get(),
                    "Record offset out of sequence"
                );
                return Ok(None);
            }
        }
        Ok(first)
    }

    /// Appends the record `id`.
    ///
    /// An empty segment accepts any `id >= begin`; a non-empty one only the
    /// offset following `end`.
    ///
    /// # Errors
    /// Returns `InvalidOffset` for an out-of-sequence id, `SegmentFull` once
    /// the log file reached capacity, or an I/O error.
    pub async fn write(&mut self, id: Offset, body: &[u8]) -> LogResult<()> {
        let in_sequence = match self.first {
            None => id >= self.begin,
            Some(_) => id.get() == self.end.get().wrapping_add(1),
        };
        if !in_sequence {
            return Err(LogError::InvalidOffset {
                id: id.get(),
                begin: self.begin.get(),
                end: self.end.get(),
            });
        }

        if self.log.is_full() {
            return Err(LogError::SegmentFull { offset: id.get() });
        }

        let byte_offset = self.log.append(id, body).await?;
        self.index.append(byte_offset).await?;

        if self.first.is_none() {
            self.first = Some(id);
        }
        self.end = id;
        Ok(())
    }

    /// Reads the body of record `id`.
    ///
    /// Returns `Ok(None)` outside `[begin, end]`, on an index miss, when the
    /// stored record is corrupt, and when its stored offset disagrees with
    /// `id`. Corruption is logged at warn level.
    ///
    /// # Errors
    /// Returns an error only for storage I/O failures.
    pub async fn read(&self, id: Offset) -> LogResult<Option<Bytes>> {
        if !self.contains(id) {
            return Ok(None);
        }
        let Some(first) = self.first.filter(|first| id >= *first) else {
            return Ok(None);
        };

        let Some(byte_offset) = self.index.get(id.get() - first.get()).await? else {
            debug!(id = id.get(), "Index miss");
            return Ok(None);
        };

        match self.log.read(byte_offset).await {
            Ok(Some(record)) if record.offset == id => Ok(Some(record.body)),
            Ok(Some(record)) => {
                warn!(
                    id = id.get(),
                    stored = record.offset.get(),
                    "Stored record offset does not match"
                );
                Ok(None)
            }
            Ok(None) => {
                debug!(id = id.get(), byte_offset, "Record past end of log");
                Ok(None)
            }
            Err(e) if e.is_corruption() => {
                warn!(id = id.get(), byte_offset, error = %e, "Corrupt record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns true if `id` lies within `[begin, end]`.
    #[must_use]
    pub fn contains(&self, id: Offset) -> bool {
        self.begin <= id && id <= self.end
    }

    /// Returns true once the log file reached capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.log.is_full()
    }

    /// Returns true if the segment holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Returns the offset the segment was created at.
    #[must_use]
    pub const fn begin(&self) -> Offset {
        self.begin
    }

    /// Returns the offset of the last written record, or `begin` if empty.
    #[must_use]
    pub const fn end(&self) -> Offset {
        self.end
    }

    /// Returns the number of records.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.index.count()
    }

    /// Returns the log file size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.log.size()
    }

    /// Returns the paths of the index and log files.
    #[must_use]
    pub fn paths(&self) -> (PathBuf, PathBuf) {
        (self.index.path().to_path_buf(), self.log.path().to_path_buf())
    }

    /// Forces both files to durable storage.
    ///
    /// # Errors
    /// Returns an error if either sync fails.
    pub async fn sync(&mut self) -> LogResult<()> {
        self.log.sync().await?;
        self.index.sync().await
    }

    /// Removes both files.
    ///
    /// # Errors
    /// Returns an error if either file cannot be removed.
    pub async fn delete(self) -> LogResult<()> {
        let (index_path, log_path) = self.paths();
        let storage = Arc::clone(&self.storage);
        drop(self);

        storage.remove(&index_path).await?;
        storage.remove(&log_path).await?;
        debug!(?index_path, "Deleted segment");
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("records", &self.index.count())
            .field("full", &self.log.is_full())
            .finish_non_exhaustive()
    }
}
