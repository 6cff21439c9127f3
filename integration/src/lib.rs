#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Adapter-facing connection lifecycle: reconnect supervision and durable
//! offline buffering, sitting below the `data` crate's router and collectors.

pub mod error;
pub mod offline_queue;
pub mod supervisor;

pub use error::IntegrationError;
pub use offline_queue::{OfflineEventQueue, OfflineQueueConfig};
pub use quoteflow_data::wire::ConnectionStatus;
pub use supervisor::{
    ConnectionConfig, ConnectionState, ConnectionSupervisor, HeartbeatConfig, ReconnectPolicy,
};
