//! Strata Log - Segmented partition log storage.
//!
//! A partition's messages live in a sequence of segments. Each segment pairs
//! an append-only log file of checksummed records with an index file mapping
//! record positions to byte offsets. Segments rotate when the log file
//! reaches capacity and are verified on open.
//!
//! # Design Principles
//!
//! - **Checksums**: CRC-64 on every record to detect corruption
//! - **Availability over history**: a segment with an invalid record is
//!   emptied on open instead of failing the partition
//! - **Explicit limits**: bounded segment sizes, configurable sync cadence
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod index;
mod log_file;
mod record;
mod segment;
mod segment_list;
pub mod storage;

pub use config::{FlushPolicy, PendingWrites, SegmentConfig};
pub use error::{LogError, LogResult};
pub use index::{IndexFile, INDEX_ENTRY_SIZE};
pub use log_file::LogFile;
pub use record::{checksum, LogRecord, RecordHeader, RECORD_HEADER_SIZE};
pub use segment::{segment_file_name, Segment, INDEX_EXTENSION, LOG_EXTENSION};
pub use segment_list::SegmentList;
pub use storage::{MemoryStorage, Storage, StorageFile, TokioStorage};
