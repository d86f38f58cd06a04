//! Strata broker binary.
//!
//! Runs a standalone broker with an embedded coordination store:
//!
//! ```bash
//! strata-broker --name b1 --listen 127.0.0.1:7070 --data-dir ./data \
//!     --partitions 4 --replicas 1
//! ```
//!
//! `--info` prints the cluster summary after startup and exits.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use strata_cluster::{DataCommon, InMemoryCoordinationStore};
use strata_core::{random_hex_id, BrokerName, Limits};
use strata_log::TokioStorage;
use strata_server::{Broker, BrokerConfig, BrokerError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Strata partitioned commit-log broker.
#[derive(Parser, Debug)]
#[command(name = "strata-broker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Broker name, unique within the cluster. Random if omitted.
    #[arg(long)]
    name: Option<String>,

    /// Address to listen on for client connections.
    #[arg(long, default_value = "127.0.0.1:7070")]
    listen: SocketAddr,

    /// Cluster name.
    #[arg(long, default_value = "default")]
    cluster: String,

    /// Root directory for partition data.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Partition count to create at startup.
    #[arg(long, default_value = "1")]
    partitions: usize,

    /// Replicas per partition.
    #[arg(long, default_value = "1")]
    replicas: usize,

    /// Segment capacity in bytes.
    #[arg(long)]
    segment_bytes: Option<u64>,

    /// Keep at most this many segments per partition.
    #[arg(long)]
    max_segments: Option<usize>,

    /// Print the cluster summary and exit.
    #[arg(long)]
    info: bool,
}

impl Args {
    fn broker_config(&self) -> BrokerConfig {
        let mut limits = Limits::default();
        if let Some(bytes) = self.segment_bytes {
            limits.segment_capacity_bytes = bytes;
        }
        let name = self.name.clone().unwrap_or_else(random_hex_id);

        BrokerConfig::new(&self.cluster, self.listen, &self.data_dir)
            .with_name(BrokerName::new(name))
            .with_limits(limits)
            .with_max_segments(self.max_segments)
            .with_bootstrap_scale(Some(DataCommon {
                partition_count: self.partitions,
                replica_count: self.replicas,
            }))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            error!(error = %e, "Broker stopped on fatal error");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "Broker failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), BrokerError> {
    let config = args.broker_config();
    info!(
        name = %config.name,
        cluster = %config.cluster,
        listen = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        "Starting Strata broker"
    );

    let store =
        InMemoryCoordinationStore::new().with_watch_capacity(config.limits.watch_channel_capacity);
    let shutdown = CancellationToken::new();
    let _reaper = store.spawn_reaper(Duration::from_secs(1), shutdown.clone());

    let broker = Broker::bind(config, Arc::new(store), Arc::new(TokioStorage::new())).await?;
    let running = broker.start(shutdown.clone()).await?;

    if args.info {
        println!("{}", running.summary().await?);
        shutdown.cancel();
        return running.wait().await;
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received interrupt, shutting down");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for interrupt"),
            }
        });
    }
    running.wait().await
}
