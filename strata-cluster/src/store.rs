//! Coordination store abstraction.
//!
//! The broker only needs a small slice of a replicated key-value service:
//! plain and lease-bound puts, create-if-absent, point and prefix reads,
//! deletes, lease renewal, and prefix watches. [`CoordinationStore`] captures
//! exactly that so membership and partition assignment are independent of
//! the backing service.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreResult;

/// Identifier of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeaseId(u64);

impl LeaseId {
    /// Creates a lease ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A stored key and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Full key.
    pub key: String,
    /// Raw value.
    pub value: Bytes,
}

/// Kind of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchAction {
    /// The key was created.
    Add,
    /// An existing key was overwritten.
    Update,
    /// The key was deleted explicitly.
    Delete,
    /// The key was removed because its lease expired.
    Expire,
}

/// One change under a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened.
    pub action: WatchAction,
    /// Full key.
    pub key: String,
    /// New value for `Add`/`Update`, last value for `Delete`/`Expire`.
    pub value: Bytes,
}

/// Client of the coordination store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Stores `value` under `key` without a lease.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn put(&self, key: &str, value: Bytes) -> StoreResult<()>;

    /// Grants a lease with `ttl` and stores `value` under `key` bound to it.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn put_with_lease(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<LeaseId>;

    /// Stores `value` only if `key` does not exist. Returns whether the
    /// value was written.
    ///
    /// # Errors
    /// Returns `LeaseNotFound` for an unknown lease, or an error if the
    /// store is unreachable.
    async fn put_if_absent(&self, key: &str, value: Bytes, lease: Option<LeaseId>)
        -> StoreResult<bool>;

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    /// Returns `NotFound` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Returns every key under `prefix`, sorted by key.
    ///
    /// # Errors
    /// Returns `NotFound` if no key matches.
    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<KeyValue>>;

    /// Deletes `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Grants a lease that expires after `ttl` unless renewed.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn grant_lease(&self, ttl: Duration) -> StoreResult<LeaseId>;

    /// Extends the lease by its TTL once.
    ///
    /// # Errors
    /// Returns `LeaseNotFound` if the lease expired.
    async fn renew_lease_once(&self, lease: LeaseId) -> StoreResult<()>;

    /// Revokes the lease and deletes every key bound to it.
    ///
    /// # Errors
    /// Returns `LeaseNotFound` if the lease does not exist.
    async fn revoke_lease(&self, lease: LeaseId) -> StoreResult<()>;

    /// Streams changes to keys under `prefix` until `cancel` fires.
    ///
    /// Events that happen before the call returns are not delivered, so
    /// callers subscribe before taking an initial listing.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn watch_prefix(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> StoreResult<mpsc::Receiver<WatchEvent>>;
}
