//! Strongly-typed identifiers for Strata entities.
//!
//! Brokers, topics, partitions and consumers are addressed by name in the
//! coordination store, so their identifiers wrap a `String`. Offsets are the
//! only numeric identity and wrap a `u64`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Macro to generate strongly-typed name wrappers.
///
/// Each name type wraps a `String` and provides:
/// - Type safety (can't mix `BrokerName` with `PartitionId`)
/// - Transparent serde representation (a plain JSON string)
/// - Debug/Display formatting
macro_rules! define_name {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new name from anything string-like.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the name as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the name is empty.
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(BrokerName, "broker", "Unique name of a broker within a cluster.");
define_name!(TopicName, "topic", "Name of a topic.");
define_name!(PartitionId, "partition", "Cluster-wide identifier of a partition.");
define_name!(ConsumerId, "consumer", "Identifier of a consumer and its subscriptions.");

impl PartitionId {
    /// Checks that the ID names a single directory under the cluster root.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the ID is empty, `.` or `..`, or contains
    /// a path separator or NUL.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.0.is_empty() {
            Some("must not be empty")
        } else if self.0 == "." || self.0 == ".." {
            Some("must not be a relative path component")
        } else if self.0.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
            Some("must not contain a path separator")
        } else {
            None
        };
        reason.map_or(Ok(()), |reason| {
            Err(Error::InvalidArgument {
                name: "partition_id",
                reason,
            })
        })
    }
}

/// Generates a random 64-bit identifier rendered as lowercase hex.
///
/// Used for fresh partition IDs and default broker names.
#[must_use]
pub fn random_hex_id() -> String {
    format!("{:x}", rand::random::<u64>())
}

/// Offset of a record in a partition log.
///
/// Offsets are strictly increasing within a partition's lifetime. A fresh
/// partition reports offset `0`; the first record written is assigned `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    /// Sentinel meaning "no such offset".
    pub const INVALID: Self = Self(u64::MAX);

    /// The offset of an empty partition.
    pub const ZERO: Self = Self(0);

    /// Creates an offset from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    ///
    /// # Panics
    /// Panics if the offset would reach the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 < u64::MAX - 1, "offset overflow");
        Self(self.0 + 1)
    }

    /// Returns false for the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.get()
    }
}

/// Role of a partition replica on a broker.
///
/// Roles are assigned by the cluster configuration. No transition validation
/// is enforced: any role may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    /// Not serving as a replica.
    #[default]
    Free,
    /// Accepts writes for the partition.
    Primary,
    /// Passive copy of the partition.
    Follow,
}

impl ReplicaRole {
    /// Returns the lowercase name used on the wire and in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Primary => "primary",
            Self::Follow => "follow",
        }
    }
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
