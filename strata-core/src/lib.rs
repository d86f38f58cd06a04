//! Strata Core - Strongly-typed identifiers, offsets and limits.
//!
//! This crate holds the vocabulary shared by every other Strata crate: the
//! partition offset type, the names used to address brokers, topics and
//! partitions in the coordination store, replica roles, and system limits.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a `BrokerName` cannot be passed where a
//!   `PartitionId` is expected
//! - **Explicit limits**: every tunable has a named default
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use types::{random_hex_id, BrokerName, ConsumerId, Offset, PartitionId, ReplicaRole, TopicName};
