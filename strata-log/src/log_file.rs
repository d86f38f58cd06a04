//! Segment log file.
//!
//! Append-only store of encoded [`LogRecord`]s. The file becomes full once
//! its size reaches the configured capacity; the record that crosses the
//! capacity is still written whole, every append after it is rejected.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use strata_core::Offset;
use tracing::debug;

use crate::config::{FlushPolicy, PendingWrites};
use crate::error::{LogError, LogResult};
use crate::record::{LogRecord, RecordHeader, RECORD_HEADER_SIZE};
use crate::storage::{Storage, StorageFile};

/// Append-only record file with a capacity cap.
pub struct LogFile {
    file: Box<dyn StorageFile>,
    path: PathBuf,
    size: u64,
    capacity: u64,
    full: bool,
    flush: FlushPolicy,
    pending: PendingWrites,
}

impl LogFile {
    /// Opens or creates the log file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or sized.
    pub async fn open(
        storage: &dyn Storage,
        path: &Path,
        capacity: u64,
        flush: FlushPolicy,
    ) -> LogResult<Self> {
        let file = storage.open(path).await?;
        let size = file.size().await?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            capacity,
            full: size >= capacity,
            flush,
            pending: PendingWrites::default(),
        })
    }

    /// Appends a record and returns the byte offset it was written at.
    ///
    /// # Errors
    /// Returns `SegmentFull` once the file reached capacity, or an I/O error.
    pub async fn append(&mut self, offset: Offset, body: &[u8]) -> LogResult<u64> {
        if self.full {
            return Err(LogError::SegmentFull {
                offset: offset.get(),
            });
        }

        let record = LogRecord::new(offset, Bytes::copy_from_slice(body));
        let mut buf = BytesMut::with_capacity(record.encoded_size());
        record.encode(&mut buf);

        let position = self.size;
        self.file.write_at(position, &buf).await?;
        self.size += buf.len() as u64;

        self.pending.record(buf.len() as u64);
        if self.flush.should_sync(self.pending) {
            self.sync().await?;
        }

        if self.size >= self.capacity {
            debug!(path = ?self.path, size = self.size, "Log file reached capacity");
            self.full = true;
        }
        Ok(position)
    }

    /// Reads and verifies the record stored at `position`.
    ///
    /// Returns `Ok(None)` when `position` is at or past the end of the file.
    ///
    /// # Errors
    /// Returns `ChecksumMismatch` or `Truncated` for damaged records, or an
    /// I/O error.
    pub async fn read(&self, position: u64) -> LogResult<Option<LogRecord>> {
        if position >= self.size {
            return Ok(None);
        }

        let mut header_bytes = self.file.read_at(position, RECORD_HEADER_SIZE).await?;
        let header = RecordHeader::decode(&mut header_bytes.clone())?;

        let available = self.size.saturating_sub(position + RECORD_HEADER_SIZE as u64);
        if header.size > available {
            return Err(LogError::Truncated {
                needed: header.size,
                available,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let total = RECORD_HEADER_SIZE + header.size as usize;
        if header_bytes.len() < total {
            header_bytes = self.file.read_at(position, total).await?;
        }
        LogRecord::decode(header_bytes, position).map(Some)
    }

    /// Returns true once the file reached capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.full
    }

    /// Returns the current size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces buffered records to durable storage.
    ///
    /// # Errors
    /// Returns an error if the sync fails.
    pub async fn sync(&mut self) -> LogResult<()> {
        self.file.sync().await?;
        self.pending.clear();
        Ok(())
    }

    /// Drops every record and clears the full flag.
    ///
    /// # Errors
    /// Returns an error if the truncation fails.
    pub async fn clear(&mut self) -> LogResult<()> {
        self.file.truncate(0).await?;
        self.size = 0;
        self.full = false;
        self.pending.clear();
        Ok(())
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("full", &self.full)
            .finish_non_exhaustive()
    }
}
