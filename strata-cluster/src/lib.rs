//! Strata Cluster - Coordination, membership and partition assignment.
//!
//! Brokers share state through a [`CoordinationStore`]: liveness keys bound
//! to leases, partition assignments, topic bindings and cluster sizing, all
//! stored as JSON under `/<cluster>`.
//!
//! - [`Membership`] registers a broker and keeps its lease alive
//! - [`PartitionManager`] materializes the partitions assigned to this
//!   broker and follows assignment changes through a watch
//! - [`admin`] scales partitions out and summarizes the cluster
//!
//! [`InMemoryCoordinationStore`] implements the store inside the process,
//! for standalone brokers and tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod admin;
mod error;
mod keys;
mod manager;
mod membership;
mod memory;
mod model;
mod registry;
mod store;

pub use admin::{BrokerLoad, ClusterSummary};
pub use error::{ClusterError, ClusterResult, StoreError, StoreResult};
pub use keys::ClusterKeys;
pub use manager::PartitionManager;
pub use membership::{Membership, MembershipConfig};
pub use memory::{InMemoryCoordinationStore, WATCH_CHANNEL_CAPACITY};
pub use model::{
    DataBroker, DataCommon, DataConsumer, DataPartition, DataTopic, Replica, Subscription,
};
pub use registry::{decode, encode, ClusterRegistry};
pub use store::{CoordinationStore, KeyValue, LeaseId, WatchAction, WatchEvent};
