//! Strata Partition - Partition logs on top of segmented storage.
//!
//! A partition owns an ordered list of segments and the offset counter.
//! Writes are linearized behind a per-partition lock and assigned strictly
//! increasing, gap-free offsets starting at 1; reads run concurrently.
//!
//! # Operations
//!
//! - `write`: append a message, rotating to a new segment when full
//! - `read`: fetch the message at an offset
//! - `set_status`: change the replica role
//! - `reset`: delete every message and restart at offset 0
//!
//! Storage failures on the write path surface as
//! [`PartitionError::Fatal`]; the caller decides how to stop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod partition;

pub use config::PartitionConfig;
pub use error::{PartitionError, PartitionResult};
pub use partition::{Partition, PartitionSnapshot};
