//! In-process coordination store.
//!
//! Keeps versioned keys, TTL leases and prefix watchers behind one mutex.
//! Lease deadlines use `tokio::time`, so tests can pause and advance time.
//! Expired leases are collected at the start of every operation and, when
//! [`InMemoryCoordinationStore::spawn_reaper`] is running, periodically in
//! the background so watchers see `Expire` events without other traffic.
//!
//! Clones share the same data.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::store::{CoordinationStore, KeyValue, LeaseId, WatchAction, WatchEvent};

/// Default capacity of a watch subscription channel.
pub const WATCH_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug)]
struct Entry {
    value: Bytes,
    version: u64,
    lease: Option<LeaseId>,
}

#[derive(Debug)]
struct Lease {
    ttl: Duration,
    deadline: Instant,
    keys: BTreeSet<String>,
}

#[derive(Debug)]
struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    watchers: Vec<Watcher>,
    next_lease: u64,
    unavailable: bool,
}

impl StoreState {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable {
                message: "store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn notify(&mut self, event: &WatchEvent) {
        self.watchers.retain(|watcher| {
            if !event.key.starts_with(&watcher.prefix) {
                return !watcher.tx.is_closed();
            }
            watcher.tx.send(event.clone()).is_ok()
        });
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(lease) = self.leases.remove(&id) {
                debug!(lease = %id, keys = lease.keys.len(), "Lease expired");
                for key in lease.keys {
                    if let Some(entry) = self.entries.remove(&key) {
                        self.notify(&WatchEvent {
                            action: WatchAction::Expire,
                            key,
                            value: entry.value,
                        });
                    }
                }
            }
        }
    }

    fn detach(&mut self, key: &str, lease: Option<LeaseId>) {
        if let Some(lease) = lease.and_then(|id| self.leases.get_mut(&id)) {
            lease.keys.remove(key);
        }
    }

    fn insert(&mut self, key: &str, value: Bytes, lease: Option<LeaseId>) -> StoreResult<()> {
        if let Some(id) = lease {
            let lease = self
                .leases
                .get_mut(&id)
                .ok_or(StoreError::LeaseNotFound { lease: id.get() })?;
            lease.keys.insert(key.to_string());
        }

        let version = match self.entries.get(key) {
            Some(existing) => {
                let previous = existing.lease;
                let version = existing.version + 1;
                if previous != lease {
                    self.detach(key, previous);
                }
                version
            }
            None => 1,
        };

        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                version,
                lease,
            },
        );

        let action = if version == 1 {
            WatchAction::Add
        } else {
            WatchAction::Update
        };
        trace!(key, version, ?action, "Stored key");
        self.notify(&WatchEvent {
            action,
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn grant(&mut self, ttl: Duration, now: Instant) -> LeaseId {
        self.next_lease += 1;
        let id = LeaseId::new(self.next_lease);
        self.leases.insert(
            id,
            Lease {
                ttl,
                deadline: now + ttl,
                keys: BTreeSet::new(),
            },
        );
        id
    }
}

/// Process-local [`CoordinationStore`].
#[derive(Debug, Clone)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<StoreState>>,
    watch_capacity: usize,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordinationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            watch_capacity: WATCH_CHANNEL_CAPACITY,
        }
    }

    /// Sets the capacity of watch subscription channels.
    #[must_use]
    pub fn with_watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_capacity = capacity.max(1);
        self
    }

    /// Makes every operation fail with `Unavailable` while `unavailable` is true.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Returns the number of live leases.
    #[must_use]
    pub fn lease_count(&self) -> usize {
        let mut state = self.lock();
        state.expire(Instant::now());
        state.leases.len()
    }

    /// Collects expired leases every `interval` until `cancel` fires.
    #[must_use]
    pub fn spawn_reaper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => store.lock().expire(Instant::now()),
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state after collecting expired leases.
    fn begin(&self) -> StoreResult<MutexGuard<'_, StoreState>> {
        let mut state = self.lock();
        state.check_available()?;
        state.expire(Instant::now());
        Ok(state)
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn put(&self, key: &str, value: Bytes) -> StoreResult<()> {
        self.begin()?.insert(key, value, None)
    }

    async fn put_with_lease(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<LeaseId> {
        let mut state = self.begin()?;
        let lease = state.grant(ttl, Instant::now());
        state.insert(key, value, Some(lease))?;
        Ok(lease)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> StoreResult<bool> {
        let mut state = self.begin()?;
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.insert(key, value, lease)?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.begin()?
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<KeyValue>> {
        let state = self.begin()?;
        let found: Vec<KeyValue> = state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect();

        if found.is_empty() {
            return Err(StoreError::NotFound {
                key: prefix.to_string(),
            });
        }
        Ok(found)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.begin()?;
        if let Some(entry) = state.entries.remove(key) {
            state.detach(key, entry.lease);
            state.notify(&WatchEvent {
                action: WatchAction::Delete,
                key: key.to_string(),
                value: entry.value,
            });
        }
        Ok(())
    }

    async fn grant_lease(&self, ttl: Duration) -> StoreResult<LeaseId> {
        let mut state = self.begin()?;
        Ok(state.grant(ttl, Instant::now()))
    }

    async fn renew_lease_once(&self, lease: LeaseId) -> StoreResult<()> {
        let mut state = self.begin()?;
        let now = Instant::now();
        let entry = state
            .leases
            .get_mut(&lease)
            .ok_or(StoreError::LeaseNotFound { lease: lease.get() })?;
        entry.deadline = now + entry.ttl;
        Ok(())
    }

    async fn revoke_lease(&self, lease: LeaseId) -> StoreResult<()> {
        let mut state = self.begin()?;
        let revoked = state
            .leases
            .remove(&lease)
            .ok_or(StoreError::LeaseNotFound { lease: lease.get() })?;
        for key in revoked.keys {
            if let Some(entry) = state.entries.remove(&key) {
                state.notify(&WatchEvent {
                    action: WatchAction::Delete,
                    key,
                    value: entry.value,
                });
            }
        }
        Ok(())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> StoreResult<mpsc::Receiver<WatchEvent>> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.begin()?;
            state.watchers.push(Watcher {
                prefix: prefix.to_string(),
                tx: raw_tx,
            });
        }

        let (tx, rx) = mpsc::channel(self.watch_capacity);
        let prefix = prefix.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = raw_rx.recv() => {
                        let Some(event) = event else { break };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(prefix, "Watch ended");
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let store = InMemoryCoordinationStore::new();
        store.put("/c/partition/a", value("1")).await.unwrap();
        store.put("/c/partition/b", value("2")).await.unwrap();
        store.put("/c/topic/t", value("3")).await.unwrap();

        assert_eq!(store.get("/c/partition/a").await.unwrap(), value("1"));

        let listed = store.list_prefix("/c/partition/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/c/partition/a", "/c/partition/b"]);

        store.delete("/c/partition/a").await.unwrap();
        assert!(store.get("/c/partition/a").await.unwrap_err().is_not_found());
        assert!(store.list_prefix("/c/broker/").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = InMemoryCoordinationStore::new();
        assert!(store.put_if_absent("/k", value("a"), None).await.unwrap());
        assert!(!store.put_if_absent("/k", value("b"), None).await.unwrap());
        assert_eq!(store.get("/k").await.unwrap(), value("a"));

        let err = store
            .put_if_absent("/other", value("x"), Some(LeaseId::new(999)))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::LeaseNotFound { lease: 999 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_and_renewal() {
        let store = InMemoryCoordinationStore::new();
        let lease = store
            .put_with_lease("/c/broker/b1", value("x"), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        store.renew_lease_once(lease).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.get("/c/broker/b1").await.is_ok());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("/c/broker/b1").await.unwrap_err().is_not_found());
        assert_eq!(
            store.renew_lease_once(lease).await.unwrap_err(),
            StoreError::LeaseNotFound { lease: lease.get() }
        );
    }

    #[tokio::test]
    async fn test_watch_actions() {
        let store = InMemoryCoordinationStore::new();
        let cancel = CancellationToken::new();
        let mut events = store.watch_prefix("/c/partition/", cancel.clone()).await.unwrap();

        store.put("/c/partition/p1", value("v1")).await.unwrap();
        store.put("/c/partition/p1", value("v2")).await.unwrap();
        store.put("/c/topic/ignored", value("t")).await.unwrap();
        store.delete("/c/partition/p1").await.unwrap();

        let actions: Vec<WatchAction> = [
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
            events.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.action)
        .collect();
        assert_eq!(
            actions,
            vec![WatchAction::Add, WatchAction::Update, WatchAction::Delete]
        );

        cancel.cancel();
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_small_watch_capacity_keeps_order() {
        let store = InMemoryCoordinationStore::new().with_watch_capacity(1);
        let cancel = CancellationToken::new();
        let mut events = store.watch_prefix("/c/topic/", cancel.clone()).await.unwrap();

        for i in 0..5 {
            store.put(&format!("/c/topic/t{i}"), value("x")).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(events.recv().await.unwrap().key, format!("/c/topic/t{i}"));
        }
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_emits_expire() {
        let store = InMemoryCoordinationStore::new();
        let cancel = CancellationToken::new();
        let _reaper = store.spawn_reaper(Duration::from_millis(100), cancel.clone());
        let mut events = store.watch_prefix("/c/broker/", cancel.clone()).await.unwrap();

        store
            .put_with_lease("/c/broker/b1", value("x"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap().action, WatchAction::Add);

        tokio::time::advance(Duration::from_secs(2)).await;
        let event = events.recv().await.unwrap();
        assert_eq!(event.action, WatchAction::Expire);
        assert_eq!(event.key, "/c/broker/b1");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_revoke_deletes_bound_keys() {
        let store = InMemoryCoordinationStore::new();
        let lease = store.grant_lease(Duration::from_secs(60)).await.unwrap();
        store.put_if_absent("/c/broker/b1", value("x"), Some(lease)).await.unwrap();

        store.revoke_lease(lease).await.unwrap();
        assert!(store.get("/c/broker/b1").await.is_err());
        assert_eq!(store.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryCoordinationStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.put("/k", value("v")).await,
            Err(StoreError::Unavailable { .. })
        ));
        store.set_unavailable(false);
        store.put("/k", value("v")).await.unwrap();
    }
}
