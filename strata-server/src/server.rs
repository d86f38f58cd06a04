//! Client-facing TCP server.
//!
//! Accepts connections and serves produce and fetch requests against the
//! partition manager, one task per connection. A fatal write error is
//! reported on the fatal channel and the connection is closed.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use strata_cluster::{ClusterError, PartitionManager};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{read_frame, write_frame, ErrorCode, Frame};
use crate::error::{BrokerError, BrokerResult};

/// Serves the client protocol.
#[derive(Debug, Clone)]
pub struct Server {
    manager: Arc<PartitionManager>,
    max_frame_bytes: usize,
    max_message_bytes: usize,
    fatal: mpsc::Sender<ClusterError>,
}

impl Server {
    /// Creates a server routing to `manager`. Fatal errors are sent on `fatal`.
    #[must_use]
    pub const fn new(
        manager: Arc<PartitionManager>,
        max_frame_bytes: usize,
        max_message_bytes: usize,
        fatal: mpsc::Sender<ClusterError>,
    ) -> Self {
        Self {
            manager,
            max_frame_bytes,
            max_message_bytes,
            fatal,
        }
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// # Errors
    /// Returns an error only if the listener address cannot be read.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> BrokerResult<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "Broker server listening");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!(%addr, "Broker server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "New connection");
                        let server = self.clone();
                        let shutdown = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer, shutdown).await {
                                warn!(%peer, error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
            }
        }
        Ok(())
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) -> BrokerResult<()> {
        let mut read_buf = BytesMut::with_capacity(64 * 1024);
        let mut write_buf = BytesMut::new();

        loop {
            let read = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                read = stream.read_buf(&mut read_buf) => read?,
            };
            if read == 0 {
                debug!(%peer, "Connection closed");
                return Ok(());
            }

            while let Some(request) = read_frame(&mut read_buf, self.max_frame_bytes)? {
                let (response, close) = self.handle_request(request).await;
                write_buf.clear();
                write_frame(&mut write_buf, &response)?;
                stream.write_all(&write_buf).await?;
                if close {
                    return Ok(());
                }
            }
        }
    }

    /// Returns the response and whether the connection must close.
    async fn handle_request(&self, request: Frame) -> (Frame, bool) {
        match request {
            Frame::Produce { partition, body } => {
                if body.len() > self.max_message_bytes {
                    let message = format!(
                        "message of {} bytes exceeds limit of {}",
                        body.len(),
                        self.max_message_bytes
                    );
                    return (Frame::error(ErrorCode::MessageTooLarge, message), false);
                }
                match self.manager.put(&partition, &body).await {
                    Ok(offset) => (Frame::Produced { offset }, false),
                    Err(e) => self.failure(e).await,
                }
            }
            Frame::Fetch { partition, offset } => match self.manager.get(&partition, offset).await {
                Ok(body) => (Frame::Fetched { body }, false),
                Err(e) => self.failure(e).await,
            },
            other => {
                let message = format!("not a request: {other:?}");
                (Frame::error(ErrorCode::InvalidRequest, message), false)
            }
        }
    }

    async fn failure(&self, err: ClusterError) -> (Frame, bool) {
        let message = err.to_string();
        match err {
            ClusterError::PartitionNotFound { .. } => {
                (Frame::error(ErrorCode::PartitionNotFound, message), false)
            }
            err if err.is_fatal() => {
                error!(error = %err, "Fatal storage error");
                if self.fatal.send(err).await.is_err() {
                    debug!("Fatal channel closed");
                }
                (Frame::error(ErrorCode::Fatal, message), true)
            }
            _ => (Frame::error(ErrorCode::Internal, message), false),
        }
    }
}

/// Binds the listener for `addr`.
///
/// # Errors
/// Returns an error if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> BrokerResult<TcpListener> {
    TcpListener::bind(addr).await.map_err(BrokerError::from)
}
