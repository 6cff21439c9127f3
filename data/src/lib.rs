#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Stateful market-data normalization kernel: subscription gating, per-symbol
//! collectors (quotes, trades, depth), the router that wires callbacks to
//! collectors and fans events out, and the passive anomaly observers that ride
//! alongside the same event stream.

pub mod anomaly;
pub mod collector;
pub mod error;
pub mod event;
pub mod integrity;
pub mod router;
pub mod subscription;
pub mod sweeper;
pub mod util;
pub mod wire;

pub use collector::{DepthCollector, DepthIntegrityConfig, QuoteCollector, TradeCollector};
pub use error::DataError;
pub use event::{EventPayload, MarketEvent, TimestampUs};
pub use router::{EventObserver, Router};
pub use subscription::{SubscriptionKind, SubscriptionTracker, DEFAULT_DEPTH_LEVELS};
pub use sweeper::{IdleSweeper, IdleSweeperConfig};
