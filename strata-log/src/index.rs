//! Segment index file.
//!
//! An append-only array of 8-byte big-endian byte offsets into the log file.
//! Entry `i` locates the segment's `i`-th record. The entry count is derived
//! from the file size; a trailing partial entry is ignored and overwritten by
//! the next append.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{FlushPolicy, PendingWrites};
use crate::error::LogResult;
use crate::storage::{Storage, StorageFile};

/// Width of one index entry in bytes.
pub const INDEX_ENTRY_SIZE: u64 = 8;

/// Append-only position to byte-offset map.
pub struct IndexFile {
    file: Box<dyn StorageFile>,
    path: PathBuf,
    count: u64,
    flush: FlushPolicy,
    pending: PendingWrites,
}

impl IndexFile {
    /// Opens or creates the index file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or sized.
    pub async fn open(storage: &dyn Storage, path: &Path, flush: FlushPolicy) -> LogResult<Self> {
        let file = storage.open(path).await?;
        let size = file.size().await?;
        if size % INDEX_ENTRY_SIZE != 0 {
            debug!(?path, size, "Ignoring partial trailing index entry");
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            count: size / INDEX_ENTRY_SIZE,
            flush,
            pending: PendingWrites::default(),
        })
    }

    /// Appends a byte offset and returns its position.
    ///
    /// # Errors
    /// Returns an error if the write or a policy-triggered sync fails.
    pub async fn append(&mut self, byte_offset: u64) -> LogResult<u64> {
        let position = self.count;
        self.file
            .write_at(position * INDEX_ENTRY_SIZE, &byte_offset.to_be_bytes())
            .await?;
        self.count += 1;

        self.pending.record(INDEX_ENTRY_SIZE);
        if self.flush.should_sync(self.pending) {
            self.sync().await?;
        }
        Ok(position)
    }

    /// Returns the byte offset stored at `position`, or `None` past the end.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub async fn get(&self, position: u64) -> LogResult<Option<u64>> {
        if position >= self.count {
            return Ok(None);
        }

        #[allow(clippy::cast_possible_truncation)]
        let buf = self
            .file
            .read_at(position * INDEX_ENTRY_SIZE, INDEX_ENTRY_SIZE as usize)
            .await?;
        let Ok(raw) = <[u8; 8]>::try_from(&buf[..]) else {
            return Ok(None);
        };
        Ok(Some(u64::from_be_bytes(raw)))
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces buffered entries to durable storage.
    ///
    /// # Errors
    /// Returns an error if the sync fails.
    pub async fn sync(&mut self) -> LogResult<()> {
        self.file.sync().await?;
        self.pending.clear();
        Ok(())
    }

    /// Drops every entry.
    ///
    /// # Errors
    /// Returns an error if the truncation fails.
    pub async fn clear(&mut self) -> LogResult<()> {
        self.file.truncate(0).await?;
        self.count = 0;
        self.pending.clear();
        Ok(())
    }
}

impl std::fmt::Debug for IndexFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexFile")
            .field("path", &self.path)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
