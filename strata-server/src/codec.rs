//! Client wire protocol.
//!
//! # Wire Format
//!
//! ```text
//! ┌─────────────────┬──────────┬──────────────────────────────┐
//! │  Length (4B)    │ Tag (1B) │           Payload            │
//! │   big-endian    │          │                              │
//! └─────────────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! `Length` counts the tag and payload. Payloads by tag:
//!
//! | Tag | Frame      | Payload                                   |
//! |-----|------------|-------------------------------------------|
//! | 1   | `Produce`  | `[id_len:u16][id][body]`                  |
//! | 2   | `Produced` | `[offset:u64]`                            |
//! | 3   | `Fetch`    | `[id_len:u16][id][offset:u64]`            |
//! | 4   | `Fetched`  | `[present:u8][body]`                      |
//! | 5   | `Error`    | `[code:u16][message utf-8]`               |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strata_core::{Offset, PartitionId};
use thiserror::Error;

/// Bytes taken by the length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

const TAG_PRODUCE: u8 = 1;
const TAG_PRODUCED: u8 = 2;
const TAG_FETCH: u8 = 3;
const TAG_FETCHED: u8 = 4;
const TAG_ERROR: u8 = 5;

/// Errors decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The length prefix exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced length.
        size: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The frame tag is not known.
    #[error("unknown frame tag {tag}")]
    UnknownTag {
        /// Received tag.
        tag: u8,
    },

    /// The payload does not match its tag.
    #[error("malformed frame (tag {tag}): {reason}")]
    Malformed {
        /// Frame tag.
        tag: u8,
        /// What is wrong.
        reason: &'static str,
    },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Error classes carried by [`Frame::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// The partition is not open on this broker.
    PartitionNotFound = 1,
    /// The message exceeds the size limit.
    MessageTooLarge = 2,
    /// The request is not valid.
    InvalidRequest = 3,
    /// Storage failure; the broker is stopping.
    Fatal = 4,
    /// Any other failure.
    Internal = 5,
}

impl ErrorCode {
    /// Parses a wire code.
    #[must_use]
    pub const fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::PartitionNotFound),
            2 => Some(Self::MessageTooLarge),
            3 => Some(Self::InvalidRequest),
            4 => Some(Self::Fatal),
            5 => Some(Self::Internal),
            _ => None,
        }
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Append `body` to a partition.
    Produce {
        /// Target partition.
        partition: PartitionId,
        /// Message body.
        body: Bytes,
    },
    /// Offset assigned to a produced message.
    Produced {
        /// Assigned offset.
        offset: Offset,
    },
    /// Read one message.
    Fetch {
        /// Source partition.
        partition: PartitionId,
        /// Requested offset.
        offset: Offset,
    },
    /// Result of a fetch; `None` if the offset holds no message.
    Fetched {
        /// Message body.
        body: Option<Bytes>,
    },
    /// Request failed.
    Error {
        /// Error class.
        code: ErrorCode,
        /// Description.
        message: String,
    },
}

impl Frame {
    const fn tag(&self) -> u8 {
        match self {
            Self::Produce { .. } => TAG_PRODUCE,
            Self::Produced { .. } => TAG_PRODUCED,
            Self::Fetch { .. } => TAG_FETCH,
            Self::Fetched { .. } => TAG_FETCHED,
            Self::Error { .. } => TAG_ERROR,
        }
    }

    /// Builds an error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Appends `frame` to `buf`.
///
/// # Errors
/// Returns an error if a partition ID is longer than `u16::MAX` bytes or
/// the frame does not fit a `u32` length. `buf` is left unchanged.
pub fn write_frame(buf: &mut BytesMut, frame: &Frame) -> CodecResult<()> {
    let start = buf.len();
    let result = encode_into(buf, frame, start);
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

fn encode_into(buf: &mut BytesMut, frame: &Frame, start: usize) -> CodecResult<()> {
    buf.put_u32(0);
    buf.put_u8(frame.tag());

    match frame {
        Frame::Produce { partition, body } => {
            put_id(buf, partition, TAG_PRODUCE)?;
            buf.put_slice(body);
        }
        Frame::Produced { offset } => buf.put_u64(offset.get()),
        Frame::Fetch { partition, offset } => {
            put_id(buf, partition, TAG_FETCH)?;
            buf.put_u64(offset.get());
        }
        Frame::Fetched { body } => match body {
            Some(body) => {
                buf.put_u8(1);
                buf.put_slice(body);
            }
            None => buf.put_u8(0),
        },
        Frame::Error { code, message } => {
            buf.put_u16(*code as u16);
            buf.put_slice(message.as_bytes());
        }
    }

    let size = buf.len() - start - FRAME_HEADER_SIZE;
    let length = u32::try_from(size).map_err(|_| CodecError::FrameTooLarge {
        size,
        max: u32::MAX as usize,
    })?;
    buf[start..start + FRAME_HEADER_SIZE].copy_from_slice(&length.to_be_bytes());
    Ok(())
}

fn put_id(buf: &mut BytesMut, id: &PartitionId, tag: u8) -> CodecResult<()> {
    let bytes = id.as_str().as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| CodecError::Malformed {
        tag,
        reason: "partition id too long",
    })?;
    buf.put_u16(len);
    buf.put_slice(bytes);
    Ok(())
}

/// Takes one complete frame off the front of `buf`.
///
/// Returns `None` if more bytes are needed.
///
/// # Errors
/// Returns an error if the frame exceeds `max_frame_bytes` or is malformed.
pub fn read_frame(buf: &mut BytesMut, max_frame_bytes: usize) -> CodecResult<Option<Frame>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if length > max_frame_bytes {
        return Err(CodecError::FrameTooLarge {
            size: length,
            max: max_frame_bytes,
        });
    }
    if length == 0 {
        return Err(CodecError::Malformed {
            tag: 0,
            reason: "empty frame",
        });
    }
    if buf.len() < FRAME_HEADER_SIZE + length {
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_SIZE);
    let mut payload = buf.split_to(length).freeze();
    let tag = payload.get_u8();
    decode_payload(tag, payload).map(Some)
}

fn decode_payload(tag: u8, mut payload: Bytes) -> CodecResult<Frame> {
    let malformed = |reason| CodecError::Malformed { tag, reason };

    let frame = match tag {
        TAG_PRODUCE => {
            let partition = take_id(&mut payload).ok_or_else(|| malformed("bad partition id"))?;
            Frame::Produce {
                partition,
                body: payload,
            }
        }
        TAG_PRODUCED => {
            if payload.remaining() != 8 {
                return Err(malformed("expected 8-byte offset"));
            }
            Frame::Produced {
                offset: Offset::new(payload.get_u64()),
            }
        }
        TAG_FETCH => {
            let partition = take_id(&mut payload).ok_or_else(|| malformed("bad partition id"))?;
            if payload.remaining() != 8 {
                return Err(malformed("expected 8-byte offset"));
            }
            Frame::Fetch {
                partition,
                offset: Offset::new(payload.get_u64()),
            }
        }
        TAG_FETCHED => {
            if !payload.has_remaining() {
                return Err(malformed("missing presence flag"));
            }
            let body = match payload.get_u8() {
                0 => None,
                1 => Some(payload),
                _ => return Err(malformed("bad presence flag")),
            };
            Frame::Fetched { body }
        }
        TAG_ERROR => {
            if payload.remaining() < 2 {
                return Err(malformed("missing error code"));
            }
            let code = ErrorCode::from_u16(payload.get_u16())
                .ok_or_else(|| malformed("unknown error code"))?;
            let message =
                String::from_utf8(payload.to_vec()).map_err(|_| malformed("message is not utf-8"))?;
            Frame::Error { code, message }
        }
        _ => return Err(CodecError::UnknownTag { tag }),
    };
    Ok(frame)
}

fn take_id(payload: &mut Bytes) -> Option<PartitionId> {
    if payload.remaining() < 2 {
        return None;
    }
    let len = payload.get_u16() as usize;
    if len == 0 || payload.remaining() < len {
        return None;
    }
    let raw = payload.split_to(len);
    std::str::from_utf8(&raw).ok().map(PartitionId::new)
}
