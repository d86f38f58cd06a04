//! Strata Tests - integration tests across the Strata crates.
//!
//! ## Test Organization
//!
//! - `partition_tests`: segment rotation, reopen and checksum handling on disk
//! - `cluster_tests`: membership leases, scale-out and watch-driven routing
//! - `server_tests`: broker lifecycle and the TCP client protocol
//!
//! `fixtures` holds the shared setup.
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod fixtures;

#[cfg(test)]
mod server_tests;
