//! Broker process.
//!
//! Startup order:
//! 1. register the broker under a lease
//! 2. apply the bootstrap sizing, if configured
//! 3. spawn the lease keepalive
//! 4. subscribe to assignment changes, then load current assignments
//! 5. serve clients
//!
//! [`RunningBroker::wait`] supervises the background tasks. The first
//! fatal error ends it with [`BrokerError::Fatal`]; the process exits
//! non-zero on that.

use std::net::SocketAddr;
use std::sync::Arc;

use strata_cluster::{
    admin, ClusterError, ClusterKeys, ClusterRegistry, ClusterResult, ClusterSummary,
    CoordinationStore, LeaseId, Membership, PartitionManager, StoreError,
};
use strata_core::BrokerName;
use strata_log::Storage;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::server::Server;

const FATAL_CHANNEL_CAPACITY: usize = 16;

/// A configured broker with its listener bound.
pub struct Broker {
    parts: Parts,
    listener: TcpListener,
}

struct Parts {
    config: BrokerConfig,
    registry: ClusterRegistry,
    manager: Arc<PartitionManager>,
    membership: Membership,
    local_addr: SocketAddr,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.parts.config.name)
            .field("cluster", &self.parts.config.cluster)
            .field("local_addr", &self.parts.local_addr)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Validates `config` and binds the client listener.
    ///
    /// # Errors
    /// Returns `InvalidConfig` or a bind failure.
    pub async fn bind(
        config: BrokerConfig,
        store: Arc<dyn CoordinationStore>,
        storage: Arc<dyn Storage>,
    ) -> BrokerResult<Self> {
        config.validate()?;

        let keys = ClusterKeys::new(&config.cluster);
        let registry = ClusterRegistry::new(Arc::clone(&store), keys.clone());
        let manager = Arc::new(PartitionManager::new(
            config.name.clone(),
            storage,
            config.partition_config(),
        ));
        let membership = Membership::new(
            store,
            keys,
            config.name.clone(),
            config.membership_config(),
        );

        let listener = crate::server::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            parts: Parts {
                config,
                registry,
                manager,
                membership,
                local_addr,
            },
            listener,
        })
    }

    /// Bound client address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.parts.local_addr
    }

    /// Broker name.
    #[must_use]
    pub const fn name(&self) -> &BrokerName {
        &self.parts.config.name
    }

    /// Registers the broker and starts every background task.
    ///
    /// # Errors
    /// Returns `BrokerAlreadyRegistered` (wrapped in `Cluster`) if the name
    /// is taken, or any startup failure.
    pub async fn start(self, shutdown: CancellationToken) -> BrokerResult<RunningBroker> {
        let Self { parts, listener } = self;
        let endpoint = parts.endpoint();
        info!(
            broker = %parts.config.name,
            cluster = %parts.config.cluster,
            %endpoint,
            data_dir = %parts.config.data_dir.display(),
            "Starting broker"
        );

        let lease = parts
            .membership
            .register(&endpoint)
            .await
            .map_err(BrokerError::from_cluster)?;

        let tasks = shutdown.child_token();
        match parts.spawn_tasks(lease, listener, shutdown, tasks.clone()).await {
            Ok(running) => Ok(running),
            Err(e) => {
                tasks.cancel();
                if let Err(revoke) = parts.membership.deregister(lease).await {
                    debug!(error = %revoke, "Failed to deregister after startup failure");
                }
                Err(e)
            }
        }
    }
}

impl Parts {
    fn endpoint(&self) -> String {
        self.config
            .advertised_addr
            .clone()
            .unwrap_or_else(|| self.local_addr.to_string())
    }

    async fn spawn_tasks(
        &self,
        lease: LeaseId,
        listener: TcpListener,
        shutdown: CancellationToken,
        tasks: CancellationToken,
    ) -> BrokerResult<RunningBroker> {
        if let Some(scale) = self.config.bootstrap_scale {
            match admin::scale_out(&self.registry, scale).await {
                Ok(created) => info!(created = created.len(), "Applied bootstrap sizing"),
                Err(ClusterError::NothingToAdjust { partitions }) => {
                    debug!(partitions, "Bootstrap sizing already applied");
                }
                Err(e) => return Err(BrokerError::from_cluster(e)),
            }
        }

        let keepalive = {
            let membership = self.membership.clone();
            let cancel = tasks.clone();
            tokio::spawn(async move { membership.run_keepalive(lease, cancel).await })
        };

        let events = self
            .manager
            .bootstrap(&self.registry, tasks.clone())
            .await
            .map_err(BrokerError::from_cluster)?;
        let watch = {
            let manager = Arc::clone(&self.manager);
            let keys = self.registry.keys().clone();
            tokio::spawn(async move { manager.run_watch(&keys, events).await })
        };

        let (fatal_tx, fatal_rx) = mpsc::channel(FATAL_CHANNEL_CAPACITY);
        let server = Server::new(
            Arc::clone(&self.manager),
            self.config.max_frame_bytes(),
            self.config.limits.max_message_bytes as usize,
            fatal_tx,
        );
        let server = tokio::spawn(server.run(listener, tasks.clone()));

        info!(broker = %self.config.name, addr = %self.local_addr, "Broker started");
        Ok(RunningBroker {
            name: self.config.name.clone(),
            local_addr: self.local_addr,
            registry: self.registry.clone(),
            manager: Arc::clone(&self.manager),
            membership: self.membership.clone(),
            lease,
            shutdown,
            tasks,
            keepalive,
            watch,
            server,
            fatal_rx,
        })
    }
}

/// A started broker.
pub struct RunningBroker {
    name: BrokerName,
    local_addr: SocketAddr,
    registry: ClusterRegistry,
    manager: Arc<PartitionManager>,
    membership: Membership,
    lease: LeaseId,
    shutdown: CancellationToken,
    tasks: CancellationToken,
    keepalive: JoinHandle<ClusterResult<()>>,
    watch: JoinHandle<ClusterResult<()>>,
    server: JoinHandle<BrokerResult<()>>,
    fatal_rx: mpsc::Receiver<ClusterError>,
}

impl std::fmt::Debug for RunningBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningBroker")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl RunningBroker {
    /// Bound client address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Cluster registry of this broker.
    #[must_use]
    pub const fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Partition manager of this broker.
    #[must_use]
    pub const fn manager(&self) -> &Arc<PartitionManager> {
        &self.manager
    }

    /// Loads the cluster summary.
    ///
    /// # Errors
    /// Returns a store error.
    pub async fn summary(&self) -> BrokerResult<ClusterSummary> {
        Ok(ClusterSummary::load(&self.registry).await?)
    }

    /// Runs until shutdown or the first fatal error.
    ///
    /// On shutdown the partitions are flushed and the broker deregistered.
    ///
    /// # Errors
    /// Returns `Fatal` for lost heartbeat, storage failure or a closed
    /// assignment watch, and `TaskFailed` if a task panicked.
    pub async fn wait(mut self) -> BrokerResult<()> {
        let outcome = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Ok(()),
            joined = &mut self.keepalive => flatten("keepalive", joined),
            joined = &mut self.watch => flatten("watch", joined).and_then(|()| {
                Err(BrokerError::Fatal(ClusterError::Store(StoreError::Unavailable {
                    message: "partition watch closed".to_string(),
                })))
            }),
            joined = &mut self.server => match joined {
                Ok(result) => result,
                Err(e) => Err(task_failed("server", &e)),
            },
            Some(err) = self.fatal_rx.recv() => Err(BrokerError::Fatal(err)),
        };
        self.tasks.cancel();

        if let Err(e) = self.manager.sync_all().await {
            warn!(broker = %self.name, error = %e, "Final partition sync failed");
        }

        match &outcome {
            Ok(()) => {
                if let Err(e) = self.membership.deregister(self.lease).await {
                    debug!(broker = %self.name, error = %e, "Deregistration failed");
                }
                info!(broker = %self.name, "Broker stopped");
            }
            Err(e) => error!(broker = %self.name, error = %e, "Broker stopped on error"),
        }
        outcome
    }
}

fn flatten(task: &'static str, joined: Result<ClusterResult<()>, JoinError>) -> BrokerResult<()> {
    match joined {
        Ok(result) => result.map_err(BrokerError::from_cluster),
        Err(e) => Err(task_failed(task, &e)),
    }
}

fn task_failed(task: &'static str, err: &JoinError) -> BrokerError {
    BrokerError::TaskFailed {
        task,
        message: err.to_string(),
    }
}
