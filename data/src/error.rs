use quoteflow_markets::SymbolError;
use thiserror::Error;

/// Errors surfaced by the `data` crate's own plumbing.
///
/// Domain defects detected while processing a trade/quote/depth update (bad
/// sequence, book corruption, ...) are never represented here — per the
/// "no exceptions cross the collector boundary" rule, those become
/// [`crate::event::EventPayload::Integrity`] / `DepthIntegrity` values on the
/// normal return path. [`DataError`] exists for the handful of things that
/// really are exceptional: malformed construction inputs and a closed
/// downstream channel.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid symbol: {0}")]
    Symbol(#[from] SymbolError),

    #[error("downstream publisher channel closed")]
    ChannelClosed,
}
