//! Storage abstraction for segment files.
//!
//! Segments talk to the filesystem only through [`Storage`] and
//! [`StorageFile`], so the engine runs unchanged on `tokio::fs` or on the
//! in-memory backend used by tests.
//!
//! # Design
//!
//! The storage trait is intentionally simple - it handles raw bytes at offsets.
//! Records, checksums and index entries are handled by the layers above.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{LogError, LogResult};

/// Storage backend for segment files.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens or creates a file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or created.
    async fn open(&self, path: &Path) -> LogResult<Box<dyn StorageFile>>;

    /// Lists files in a directory with the given extension, sorted by name.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    async fn list_files(&self, dir: &Path, extension: &str) -> LogResult<Vec<PathBuf>>;

    /// Removes a file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be removed.
    async fn remove(&self, path: &Path) -> LogResult<()>;

    /// Creates a directory and all parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    async fn create_dir_all(&self, path: &Path) -> LogResult<()>;
}

/// A handle to an open file for reading and writing.
#[async_trait]
pub trait StorageFile: Send + Sync {
    /// Writes data at the specified offset.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    async fn write_at(&self, offset: u64, data: &[u8]) -> LogResult<()>;

    /// Reads up to `len` bytes from the specified offset.
    ///
    /// Returns fewer bytes than requested at end of file.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    async fn read_at(&self, offset: u64, len: usize) -> LogResult<Bytes>;

    /// Syncs all buffered data to disk (fsync).
    ///
    /// # Errors
    /// Returns an error if the sync fails.
    async fn sync(&self) -> LogResult<()>;

    /// Returns the current file size in bytes.
    ///
    /// # Errors
    /// Returns an error if the size cannot be determined.
    async fn size(&self) -> LogResult<u64>;

    /// Truncates the file to the specified length.
    ///
    /// # Errors
    /// Returns an error if the truncation fails.
    async fn truncate(&self, len: u64) -> LogResult<()>;
}

/// Tokio-based file storage.
///
/// `tokio::fs` runs blocking calls on a thread pool; good enough for a
/// broker whose writes are serialized per partition.
#[derive(Debug, Clone, Copy)]
pub struct TokioStorage;

impl TokioStorage {
    /// Creates a new Tokio storage instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for TokioStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for TokioStorage {
    async fn open(&self, path: &Path) -> LogResult<Box<dyn StorageFile>> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| LogError::io("open", e))?;

        Ok(Box::new(TokioFile {
            file: tokio::sync::Mutex::new(file),
        }))
    }

    async fn list_files(&self, dir: &Path, extension: &str) -> LogResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| LogError::io("read_dir", e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LogError::io("read_dir_entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == extension) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    async fn remove(&self, path: &Path) -> LogResult<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| LogError::io("remove", e))
    }

    async fn create_dir_all(&self, path: &Path) -> LogResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| LogError::io("create_dir_all", e))
    }
}

/// A file handle using `tokio::fs`.
struct TokioFile {
    file: tokio::sync::Mutex<tokio::fs::File>,
}

#[async_trait]
#[allow(clippy::significant_drop_tightening)]
impl StorageFile for TokioFile {
    async fn write_at(&self, offset: u64, data: &[u8]) -> LogResult<()> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| LogError::io("seek", e))?;
        file.write_all(data)
            .await
            .map_err(|e| LogError::io("write", e))?;
        file.flush().await.map_err(|e| LogError::io("flush", e))
    }

    async fn read_at(&self, offset: u64, len: usize) -> LogResult<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| LogError::io("seek", e))?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| LogError::io("read", e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn sync(&self) -> LogResult<()> {
        let file = self.file.lock().await;
        file.sync_all().await.map_err(|e| LogError::io("sync", e))
    }

    async fn size(&self) -> LogResult<u64> {
        let file = self.file.lock().await;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| LogError::io("metadata", e))?;
        Ok(metadata.len())
    }

    async fn truncate(&self, len: u64) -> LogResult<()> {
        let file = self.file.lock().await;
        file.set_len(len)
            .await
            .map_err(|e| LogError::io("truncate", e))
    }
}

// ----------------------------------------------------------------------------
// In-memory storage for tests
// ----------------------------------------------------------------------------

/// One-shot faults for [`MemoryStorage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConfig {
    /// Fail the next write with a simulated disk-full error.
    pub fail_next_write: bool,
    /// Fail the next sync.
    pub fail_next_sync: bool,
}

type FileMap = HashMap<PathBuf, Vec<u8>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory storage with fault injection.
///
/// Clones share the same files, so a test can keep one handle to inspect or
/// corrupt bytes while a partition writes through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<FileMap>>,
    faults: Arc<Mutex<FaultConfig>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms one-shot faults.
    pub fn inject(&self, faults: FaultConfig) {
        *lock(&self.faults) = faults;
    }

    /// Returns the raw content of a file.
    #[must_use]
    pub fn raw_content(&self, path: &Path) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }

    /// Flips every bit of `len` bytes starting at `offset`.
    pub fn corrupt_bytes(&self, path: &Path, offset: usize, len: usize) {
        if let Some(content) = lock(&self.files).get_mut(path) {
            let end = content.len().min(offset + len);
            for byte in content.iter_mut().take(end).skip(offset) {
                *byte ^= 0xFF;
            }
        }
    }

    /// Returns the paths of all files, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = lock(&self.files).keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self, path: &Path) -> LogResult<Box<dyn StorageFile>> {
        lock(&self.files).entry(path.to_path_buf()).or_default();
        Ok(Box::new(MemoryFile {
            path: path.to_path_buf(),
            files: Arc::clone(&self.files),
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn list_files(&self, dir: &Path, extension: &str) -> LogResult<Vec<PathBuf>> {
        let mut result: Vec<_> = lock(&self.files)
            .keys()
            .filter(|p| p.parent() == Some(dir) && p.extension().is_some_and(|ext| ext == extension))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    async fn remove(&self, path: &Path) -> LogResult<()> {
        lock(&self.files)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| LogError::io("remove", "file not found"))
    }

    async fn create_dir_all(&self, _path: &Path) -> LogResult<()> {
        // Directories are implicit.
        Ok(())
    }
}

struct MemoryFile {
    path: PathBuf,
    files: Arc<Mutex<FileMap>>,
    faults: Arc<Mutex<FaultConfig>>,
}

#[async_trait]
#[allow(clippy::cast_possible_truncation)]
impl StorageFile for MemoryFile {
    async fn write_at(&self, offset: u64, data: &[u8]) -> LogResult<()> {
        {
            let mut faults = lock(&self.faults);
            if faults.fail_next_write {
                faults.fail_next_write = false;
                return Err(LogError::io("write", "disk full (simulated)"));
            }
        }

        let mut files = lock(&self.files);
        let content = files
            .get_mut(&self.path)
            .ok_or_else(|| LogError::io("write", "file not found"))?;
        let start = offset as usize;
        let end = start + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        Ok(())
    }

    async fn read_at(&self, offset: u64, len: usize) -> LogResult<Bytes> {
        let files = lock(&self.files);
        let content = files
            .get(&self.path)
            .ok_or_else(|| LogError::io("read", "file not found"))?;
        let start = (offset as usize).min(content.len());
        let end = content.len().min(start + len);
        Ok(Bytes::copy_from_slice(&content[start..end]))
    }

    async fn sync(&self) -> LogResult<()> {
        let mut faults = lock(&self.faults);
        if faults.fail_next_sync {
            faults.fail_next_sync = false;
            return Err(LogError::io("sync", "fsync failed (simulated)"));
        }
        Ok(())
    }

    async fn size(&self) -> LogResult<u64> {
        let files = lock(&self.files);
        let content = files
            .get(&self.path)
            .ok_or_else(|| LogError::io("size", "file not found"))?;
        Ok(content.len() as u64)
    }

    async fn truncate(&self, len: u64) -> LogResult<()> {
        let mut files = lock(&self.files);
        let content = files
            .get_mut(&self.path)
            .ok_or_else(|| LogError::io("truncate", "file not found"))?;
        content.resize(len as usize, 0);
        Ok(())
    }
}
