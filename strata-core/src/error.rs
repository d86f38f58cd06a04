//! Error types for Strata core operations.
//!
//! Configuration and identifier validation are the only fallible
//! operations at this layer; storage, partition and cluster errors live in
//! their own crates.

use std::fmt;

/// The result type for Strata core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Strata core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::InvalidArgument {
            name: "segment_capacity_bytes",
            reason: "must be positive",
        };
        assert_eq!(
            format!("{err}"),
            "invalid argument 'segment_capacity_bytes': must be positive"
        );
    }
}
