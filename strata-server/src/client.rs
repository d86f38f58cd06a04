//! Minimal async client for the broker protocol.

use std::io;

use bytes::{Bytes, BytesMut};
use strata_core::{Offset, PartitionId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::{read_frame, write_frame, Frame};
use crate::error::{BrokerError, BrokerResult};

/// Default bound on response frames.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// One connection to a broker. Requests are sent one at a time.
#[derive(Debug)]
pub struct StrataClient {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_frame_bytes: usize,
}

impl StrataClient {
    /// Connects to the broker at `addr`.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> BrokerResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(8 * 1024),
            write_buf: BytesMut::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    /// Sets the largest accepted response frame.
    #[must_use]
    pub const fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Appends `body` to `partition` and returns its offset.
    ///
    /// # Errors
    /// Returns `Remote` if the broker rejects the request, or an I/O error.
    pub async fn produce(&mut self, partition: &PartitionId, body: impl Into<Bytes>) -> BrokerResult<Offset> {
        let request = Frame::Produce {
            partition: partition.clone(),
            body: body.into(),
        };
        match self.request(&request).await? {
            Frame::Produced { offset } => Ok(offset),
            other => Err(unexpected(other)),
        }
    }

    /// Reads the message at `offset`; `None` if there is none.
    ///
    /// # Errors
    /// Returns `Remote` if the broker rejects the request, or an I/O error.
    pub async fn fetch(&mut self, partition: &PartitionId, offset: Offset) -> BrokerResult<Option<Bytes>> {
        let request = Frame::Fetch {
            partition: partition.clone(),
            offset,
        };
        match self.request(&request).await? {
            Frame::Fetched { body } => Ok(body),
            other => Err(unexpected(other)),
        }
    }

    async fn request(&mut self, request: &Frame) -> BrokerResult<Frame> {
        self.write_buf.clear();
        write_frame(&mut self.write_buf, request)?;
        self.stream.write_all(&self.write_buf).await?;

        loop {
            if let Some(frame) = read_frame(&mut self.read_buf, self.max_frame_bytes)? {
                return match frame {
                    Frame::Error { code, message } => Err(BrokerError::Remote { code, message }),
                    frame => Ok(frame),
                };
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "broker closed the connection",
                )
                .into());
            }
        }
    }
}

fn unexpected(frame: Frame) -> BrokerError {
    BrokerError::UnexpectedResponse {
        frame: format!("{frame:?}"),
    }
}
