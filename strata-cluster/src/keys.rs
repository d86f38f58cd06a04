//! Key namespace of one cluster in the coordination store.

use strata_core::{BrokerName, ConsumerId, PartitionId, TopicName};

const BROKER: &str = "broker";
const TOPIC: &str = "topic";
const PARTITION: &str = "partition";
const COMMON: &str = "common";
const CONSUMER: &str = "consumer";

/// Builds keys under `/<cluster>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterKeys {
    root: String,
}

impl ClusterKeys {
    /// Creates the namespace for `cluster`.
    #[must_use]
    pub fn new(cluster: &str) -> Self {
        Self {
            root: format!("/{}", cluster.trim_matches('/')),
        }
    }

    /// Returns `/<cluster>`.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.root[1..]
    }

    fn prefix(&self, kind: &str) -> String {
        format!("{}/{kind}/", self.root)
    }

    /// `/<cluster>/broker/`
    #[must_use]
    pub fn broker_prefix(&self) -> String {
        self.prefix(BROKER)
    }

    /// `/<cluster>/broker/<name>`
    #[must_use]
    pub fn broker(&self, name: &BrokerName) -> String {
        format!("{}{name}", self.broker_prefix())
    }

    /// `/<cluster>/topic/`
    #[must_use]
    pub fn topic_prefix(&self) -> String {
        self.prefix(TOPIC)
    }

    /// `/<cluster>/topic/<topic>`
    #[must_use]
    pub fn topic(&self, topic: &TopicName) -> String {
        format!("{}{topic}", self.topic_prefix())
    }

    /// `/<cluster>/partition/`
    #[must_use]
    pub fn partition_prefix(&self) -> String {
        self.prefix(PARTITION)
    }

    /// `/<cluster>/partition/<id>`
    #[must_use]
    pub fn partition(&self, id: &PartitionId) -> String {
        format!("{}{id}", self.partition_prefix())
    }

    /// `/<cluster>/common`
    #[must_use]
    pub fn common(&self) -> String {
        format!("{}/{COMMON}", self.root)
    }

    /// `/<cluster>/consumer/`
    #[must_use]
    pub fn consumer_prefix(&self) -> String {
        self.prefix(CONSUMER)
    }

    /// `/<cluster>/consumer/<id>`
    #[must_use]
    pub fn consumer(&self, id: &ConsumerId) -> String {
        format!("{}{id}", self.consumer_prefix())
    }

    /// Returns the last path component of `key` if it lies directly under `prefix`.
    #[must_use]
    pub fn name_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(prefix)
            .filter(|name| !name.is_empty() && !name.contains('/'))
    }
}
