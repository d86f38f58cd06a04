//! Log record encoding and decoding.
//!
//! # Record Format
//!
//! ```text
//! +----------------+----------------+----------------+-----------------+
//! | checksum (8)   | size (8)       | offset (8)     | body (size)     |
//! +----------------+----------------+----------------+-----------------+
//! ```
//!
//! All integers are big-endian. The checksum is CRC-64/GO-ISO over the body
//! followed by a 16-byte trailer holding `offset` then `size`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_64_GO_ISO};
use strata_core::Offset;

use crate::error::{LogError, LogResult};

/// Size of the fixed record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 24;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Computes the checksum of a record.
#[must_use]
pub fn checksum(offset: Offset, body: &[u8]) -> u64 {
    let mut trailer = [0u8; 16];
    trailer[..8].copy_from_slice(&offset.get().to_be_bytes());
    trailer[8..].copy_from_slice(&(body.len() as u64).to_be_bytes());

    let mut digest = CRC64.digest();
    digest.update(body);
    digest.update(&trailer);
    digest.finalize()
}

/// Decoded fixed-size part of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Stored checksum.
    pub checksum: u64,
    /// Body length in bytes.
    pub size: u64,
    /// Offset the record was written under.
    pub offset: Offset,
}

impl RecordHeader {
    /// Decodes a header from the front of `buf`.
    ///
    /// # Errors
    /// Returns `Truncated` if fewer than [`RECORD_HEADER_SIZE`] bytes remain.
    pub fn decode(buf: &mut impl Buf) -> LogResult<Self> {
        if buf.remaining() < RECORD_HEADER_SIZE {
            return Err(LogError::Truncated {
                needed: RECORD_HEADER_SIZE as u64,
                available: buf.remaining() as u64,
            });
        }
        Ok(Self {
            checksum: buf.get_u64(),
            size: buf.get_u64(),
            offset: Offset::new(buf.get_u64()),
        })
    }
}

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Partition offset of the record.
    pub offset: Offset,
    /// Message body.
    pub body: Bytes,
}

impl LogRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(offset: Offset, body: impl Into<Bytes>) -> Self {
        Self {
            offset,
            body: body.into(),
        }
    }

    /// Returns the encoded size of the record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.body.len()
    }

    /// Encodes the record into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_size());
        buf.put_u64(checksum(self.offset, &self.body));
        buf.put_u64(self.body.len() as u64);
        buf.put_u64(self.offset.get());
        buf.put_slice(&self.body);
    }

    /// Decodes and verifies a record stored at `position`.
    ///
    /// `position` is only used to report where corruption was found.
    ///
    /// # Errors
    /// Returns `Truncated` if the buffer is short and `ChecksumMismatch` if
    /// the stored checksum does not match.
    pub fn decode(mut buf: Bytes, position: u64) -> LogResult<Self> {
        let header = RecordHeader::decode(&mut buf)?;
        if (buf.len() as u64) < header.size {
            return Err(LogError::Truncated {
                needed: header.size,
                available: buf.len() as u64,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let body = buf.split_to(header.size as usize);
        let actual = checksum(header.offset, &body);
        if actual != header.checksum {
            return Err(LogError::ChecksumMismatch {
                position,
                expected: header.checksum,
                actual,
            });
        }

        Ok(Self {
            offset: header.offset,
            body,
        })
    }
}
