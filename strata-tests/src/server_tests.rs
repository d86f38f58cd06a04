//! Broker process and client protocol over TCP.

use std::sync::Arc;

use bytes::Bytes;
use strata_cluster::{ClusterError, CoordinationStore};
use strata_core::{Offset, PartitionId};
use strata_server::{Broker, BrokerError, ErrorCode, RunningBroker, StrataClient};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::fixtures::{broker_config, disk, store};

async fn start(
    tmp: &TempDir,
    store: Arc<dyn CoordinationStore>,
    name: &str,
    shutdown: &CancellationToken,
) -> RunningBroker {
    Broker::bind(broker_config(tmp.path(), name), store, disk())
        .await
        .unwrap()
        .start(shutdown.clone())
        .await
        .unwrap()
}

async fn only_partition(running: &RunningBroker) -> PartitionId {
    let snapshots = running.manager().snapshots().await;
    assert_eq!(snapshots.len(), 1);
    snapshots[0].id.clone()
}

#[tokio::test]
async fn test_server_produce_fetch_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let shutdown = CancellationToken::new();
    let running = start(&tmp, Arc::new(store()), "b1", &shutdown).await;
    let partition = only_partition(&running).await;

    let mut client = StrataClient::connect(running.local_addr()).await.unwrap();
    for (i, body) in ["alpha", "beta", "gamma"].iter().enumerate() {
        let offset = client.produce(&partition, body.as_bytes().to_vec()).await.unwrap();
        assert_eq!(offset.get(), i as u64 + 1);
    }

    assert_eq!(
        client.fetch(&partition, Offset::new(2)).await.unwrap(),
        Some(Bytes::from_static(b"beta"))
    );
    assert_eq!(client.fetch(&partition, Offset::new(9)).await.unwrap(), None);

    shutdown.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_server_unknown_partition() {
    let tmp = TempDir::new().unwrap();
    let shutdown = CancellationToken::new();
    let running = start(&tmp, Arc::new(store()), "b1", &shutdown).await;

    let mut client = StrataClient::connect(running.local_addr()).await.unwrap();
    let err = client
        .produce(&PartitionId::new("missing"), Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BrokerError::Remote {
            code: ErrorCode::PartitionNotFound,
            ..
        }
    ));

    // The connection stays usable after an error response.
    let partition = only_partition(&running).await;
    assert_eq!(
        client.produce(&partition, Bytes::from_static(b"x")).await.unwrap(),
        Offset::new(1)
    );

    shutdown.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_server_duplicate_broker_name_rejected() {
    let tmp = TempDir::new().unwrap();
    let shared: Arc<dyn CoordinationStore> = Arc::new(store());
    let shutdown = CancellationToken::new();
    let running = start(&tmp, Arc::clone(&shared), "b1", &shutdown).await;

    let other = TempDir::new().unwrap();
    let err = Broker::bind(broker_config(other.path(), "b1"), shared, disk())
        .await
        .unwrap()
        .start(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BrokerError::Cluster(ClusterError::BrokerAlreadyRegistered { .. })
    ));

    shutdown.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_server_shutdown_deregisters_and_restart_resumes() {
    let tmp = TempDir::new().unwrap();
    let shared: Arc<dyn CoordinationStore> = Arc::new(store());

    let shutdown = CancellationToken::new();
    let running = start(&tmp, Arc::clone(&shared), "b1", &shutdown).await;
    let partition = only_partition(&running).await;
    let mut client = StrataClient::connect(running.local_addr()).await.unwrap();
    client.produce(&partition, Bytes::from_static(b"kept")).await.unwrap();
    drop(client);

    shutdown.cancel();
    running.wait().await.unwrap();
    assert!(shared.get("/it/broker/b1").await.unwrap_err().is_not_found());

    let shutdown = CancellationToken::new();
    let restarted = start(&tmp, Arc::clone(&shared), "b1", &shutdown).await;
    assert_eq!(only_partition(&restarted).await, partition);

    let mut client = StrataClient::connect(restarted.local_addr()).await.unwrap();
    assert_eq!(
        client.fetch(&partition, Offset::new(1)).await.unwrap(),
        Some(Bytes::from_static(b"kept"))
    );
    assert_eq!(
        client.produce(&partition, Bytes::from_static(b"next")).await.unwrap(),
        Offset::new(2)
    );

    let summary = restarted.summary().await.unwrap();
    assert_eq!(summary.brokers.len(), 1);
    assert_eq!(summary.partitions.len(), 1);

    shutdown.cancel();
    restarted.wait().await.unwrap();
}
