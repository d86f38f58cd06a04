//! Strata broker server.
//!
//! Runs one broker: registers it in the cluster, follows partition
//! assignments and serves produce/fetch requests over a length-prefixed
//! TCP protocol.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod broker;
mod client;
pub mod codec;
mod config;
mod error;
mod server;

pub use broker::{Broker, RunningBroker};
pub use client::{StrataClient, DEFAULT_MAX_FRAME_BYTES};
pub use codec::{CodecError, CodecResult, ErrorCode, Frame};
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use server::{bind, Server};
