//! Graceful-shutdown traits for kernel components.
//!
//! Background tasks (the integrity aggregation tick, the connection
//! supervisor's reconnect loop, the offline queue's spill writer) each own a
//! [`tokio::sync::watch::Receiver<bool>`] and select on it alongside their
//! normal work; flipping the paired `watch::Sender` to `true` is the signal to
//! wind down. Components that can tear down without awaiting anything
//! implement [`SyncShutdown`] instead.

use std::future::Future;

/// Components that can be shut down synchronously, with no pending I/O.
pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

/// Components whose shutdown involves async work (flushing a spill file,
/// awaiting a last send on a channel).
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// Marker signal broadcast to every background task at kernel teardown.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Shutdown;
