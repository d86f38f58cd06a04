//! Broker registration and lease keepalive.
//!
//! A broker announces itself by writing its liveness key bound to a lease.
//! The key disappears when the lease expires, so a broker that stops
//! renewing drops out of the cluster on its own.

use std::sync::Arc;
use std::time::Duration;

use strata_core::{BrokerName, Limits};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult, StoreError};
use crate::keys::ClusterKeys;
use crate::model::DataBroker;
use crate::registry::encode;
use crate::store::{CoordinationStore, LeaseId};

/// Lease and keepalive settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipConfig {
    /// Lease TTL.
    pub lease_ttl: Duration,
    /// Renewals attempted per TTL.
    pub renewals_per_ttl: u32,
    /// Consecutive renewal failures tolerated before giving up.
    pub max_failures: u32,
    /// Bound on each renewal call.
    pub renew_timeout: Duration,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self::from_limits(&Limits::default())
    }
}

impl MembershipConfig {
    /// Builds the config from system limits.
    #[must_use]
    pub const fn from_limits(limits: &Limits) -> Self {
        Self {
            lease_ttl: Duration::from_secs(limits.lease_ttl_secs),
            renewals_per_ttl: limits.keepalive_rounds_per_ttl,
            max_failures: limits.keepalive_max_failures,
            renew_timeout: limits.store_timeout,
        }
    }

    /// Sets the lease TTL.
    #[must_use]
    pub const fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Sets the failure budget.
    #[must_use]
    pub const fn with_max_failures(mut self, failures: u32) -> Self {
        self.max_failures = failures;
        self
    }

    /// Sets the renewal timeout.
    #[must_use]
    pub const fn with_renew_timeout(mut self, timeout: Duration) -> Self {
        self.renew_timeout = timeout;
        self
    }

    /// Time between renewals.
    #[must_use]
    pub fn renew_interval(&self) -> Duration {
        self.lease_ttl / self.renewals_per_ttl.max(1)
    }

    /// Validates the config.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the zero field.
    pub fn validate(&self) -> ClusterResult<()> {
        let zero = if self.lease_ttl.is_zero() {
            Some("lease_ttl")
        } else if self.renewals_per_ttl == 0 {
            Some("renewals_per_ttl")
        } else if self.max_failures == 0 {
            Some("max_failures")
        } else if self.renew_timeout.is_zero() {
            Some("renew_timeout")
        } else {
            None
        };
        match zero {
            Some(name) => Err(ClusterError::InvalidConfig {
                name,
                reason: "must be non-zero",
            }),
            None => Ok(()),
        }
    }
}

/// Registers and keeps alive one broker's liveness key.
#[derive(Clone)]
pub struct Membership {
    store: Arc<dyn CoordinationStore>,
    keys: ClusterKeys,
    name: BrokerName,
    config: MembershipConfig,
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Membership {
    /// Creates the membership handle for broker `name`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        keys: ClusterKeys,
        name: BrokerName,
        config: MembershipConfig,
    ) -> Self {
        Self {
            store,
            keys,
            name,
            config,
        }
    }

    /// Broker name.
    #[must_use]
    pub const fn name(&self) -> &BrokerName {
        &self.name
    }

    /// Writes the liveness key bound to a fresh lease.
    ///
    /// # Errors
    /// Returns `BrokerAlreadyRegistered` if another broker holds the name,
    /// or a store error.
    pub async fn register(&self, endpoint: &str) -> ClusterResult<LeaseId> {
        let key = self.keys.broker(&self.name);
        let value = encode(
            &key,
            &DataBroker {
                broker: self.name.clone(),
                endpoint: endpoint.to_string(),
            },
        )?;

        let lease = self.store.grant_lease(self.config.lease_ttl).await?;
        if !self.store.put_if_absent(&key, value, Some(lease)).await? {
            if let Err(e) = self.store.revoke_lease(lease).await {
                debug!(lease = %lease, error = %e, "Failed to revoke unused lease");
            }
            return Err(ClusterError::BrokerAlreadyRegistered {
                broker: self.name.clone(),
            });
        }

        info!(broker = %self.name, endpoint, lease = %lease, "Registered broker");
        Ok(lease)
    }

    /// Renews `lease` until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation.
    ///
    /// # Errors
    /// Returns `HeartbeatLost` after `max_failures` consecutive failed
    /// renewals.
    pub async fn run_keepalive(
        &self,
        lease: LeaseId,
        cancel: CancellationToken,
    ) -> ClusterResult<()> {
        let interval = self.config.renew_interval();
        let mut failures = 0u32;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(broker = %self.name, "Keepalive stopped");
                    return Ok(());
                }
                () = tokio::time::sleep(interval) => {}
            }

            let renewal = tokio::time::timeout(
                self.config.renew_timeout,
                self.store.renew_lease_once(lease),
            )
            .await
            .unwrap_or(Err(StoreError::Timeout {
                operation: "renew_lease",
            }));

            match renewal {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures += 1;
                    warn!(
                        broker = %self.name,
                        lease = %lease,
                        failures,
                        error = %e,
                        "Lease renewal failed"
                    );
                    if failures >= self.config.max_failures {
                        return Err(ClusterError::HeartbeatLost { failures });
                    }
                }
            }
        }
    }

    /// Revokes `lease`, removing the liveness key.
    ///
    /// # Errors
    /// Returns a store error.
    pub async fn deregister(&self, lease: LeaseId) -> ClusterResult<()> {
        self.store.revoke_lease(lease).await?;
        info!(broker = %self.name, "Deregistered broker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;
    use crate::registry::ClusterRegistry;

    fn membership(store: &InMemoryCoordinationStore, name: &str) -> Membership {
        Membership::new(
            Arc::new(store.clone()),
            ClusterKeys::new("test"),
            BrokerName::new(name),
            MembershipConfig::default(),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = MembershipConfig::default();
        assert_eq!(config.lease_ttl, Duration::from_secs(5));
        assert_eq!(config.max_failures, 3);
        assert!(config.validate().is_ok());

        let err = config.with_max_failures(0).validate().unwrap_err();
        assert!(matches!(
            err,
            ClusterError::InvalidConfig {
                name: "max_failures",
                ..
            }
        ));
        let err = config.with_lease_ttl(Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, ClusterError::InvalidConfig { name: "lease_ttl", .. }));
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let store = InMemoryCoordinationStore::new();
        let first = membership(&store, "b1");
        first.register("127.0.0.1:1").await.unwrap();

        let err = membership(&store, "b1")
            .register("127.0.0.1:2")
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::BrokerAlreadyRegistered { .. }));
        assert_eq!(store.lease_count(), 1);

        let registry = ClusterRegistry::new(Arc::new(store), ClusterKeys::new("test"));
        let broker = registry.broker(&BrokerName::new("b1")).await.unwrap().unwrap();
        assert_eq!(broker.endpoint, "127.0.0.1:1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_holds_registration() {
        let store = InMemoryCoordinationStore::new();
        let member = membership(&store, "b1");
        let lease = member.register("addr").await.unwrap();

        let cancel = CancellationToken::new();
        let task = {
            let member = member.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { member.run_keepalive(lease, cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(store.get("/test/broker/b1").await.is_ok());

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_fatal_after_failures() {
        let store = InMemoryCoordinationStore::new();
        let member = membership(&store, "b1");
        let lease = member.register("addr").await.unwrap();

        store.set_unavailable(true);
        let err = member
            .run_keepalive(lease, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::HeartbeatLost { failures: 3 }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_deregister_frees_name() {
        let store = InMemoryCoordinationStore::new();
        let member = membership(&store, "b1");
        let lease = member.register("addr").await.unwrap();
        member.deregister(lease).await.unwrap();
        member.register("addr").await.unwrap();
    }
}
