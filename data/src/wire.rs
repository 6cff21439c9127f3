//! Adapter-facing inbound types passed from a venue adapter into the router.
//!
//! These are the language-neutral callback payloads vendor adapters hand to the
//! [`crate::router::Router`]; they live in this crate (rather than `integration`)
//! because the router and collectors that consume them are the hot path this
//! crate owns end-to-end.

use crate::event::TimestampUs;
use quoteflow_markets::{Aggressor, Decimal, Side};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// `operation ∈ {0=Insert,1=Update,2=Delete}` in the wire encoding; represented here
/// as a proper enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DepthOperation {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketTradeUpdate {
    pub symbol: String,
    pub timestamp_utc: TimestampUs,
    pub price: Decimal,
    pub size: i64,
    pub aggressor: Aggressor,
    /// Vendor-assigned sequence number. `i64` (not `u64`) so that a negative,
    /// corrupt value from a misbehaving vendor can actually be represented and
    /// rejected rather than being impossible to express.
    pub sequence: i64,
    pub stream_id: Option<SmolStr>,
    pub venue: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketQuoteUpdate {
    pub symbol: String,
    pub timestamp_utc: TimestampUs,
    pub bid: Decimal,
    pub bid_sz: Decimal,
    pub ask: Decimal,
    pub ask_sz: Decimal,
    pub stream_id: Option<SmolStr>,
    pub venue: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketDepthUpdate {
    pub symbol: String,
    pub timestamp_utc: TimestampUs,
    pub position: u16,
    pub operation: DepthOperation,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub market_maker: Option<SmolStr>,
    pub sequence: Option<i64>,
    pub stream_id: Option<SmolStr>,
    pub venue: Option<SmolStr>,
}

/// Connection lifecycle state reported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(u8)]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Faulted = 4,
}
