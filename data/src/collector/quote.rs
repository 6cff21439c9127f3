//! QuoteCollector — maintains last BBO per symbol.

use crate::{
    event::{BboQuotePayload, EventPayload, MarketEvent},
    util::sharded_map::SymbolMap,
    wire::MarketQuoteUpdate,
};
use quoteflow_markets::{Decimal, Symbol};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

#[derive(Debug, Default)]
struct QuoteState {
    last: Option<BboQuotePayload>,
    quote_seq: AtomicU64,
}

/// Consumes [`MarketQuoteUpdate`]s, assigning a monotonic per-symbol quote sequence
/// and computing `mid`/`spread` only when both sides are crossed-free
/// (`bid > 0 ∧ ask > 0 ∧ ask ≥ bid`).
#[derive(Debug, Default)]
pub struct QuoteCollector {
    states: SymbolMap<QuoteState>,
}

impl QuoteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one quote update for an already-validated, non-empty [`Symbol`].
    ///
    /// Always succeeds — quote ingestion has no rejectable preconditions of its own
    /// beyond symbol validity, which the caller (the router) establishes before
    /// invoking this method.
    pub fn on_quote(&self, symbol: &Symbol, update: &MarketQuoteUpdate) -> MarketEvent {
        let state_lock = self.states.get_or_create(symbol);
        let mut state = state_lock.lock();

        let sequence = state.quote_seq.fetch_add(1, Ordering::Relaxed) + 1;

        let (mid, spread) = if update.bid > Decimal::ZERO
            && update.ask > Decimal::ZERO
            && update.ask >= update.bid
        {
            (
                Some((update.bid + update.ask) / Decimal::from(2)),
                Some(update.ask - update.bid),
            )
        } else {
            (None, None)
        };

        let payload = BboQuotePayload {
            bid_price: update.bid,
            bid_size: update.bid_sz,
            ask_price: update.ask,
            ask_size: update.ask_sz,
            mid,
            spread,
            sequence,
        };

        state.last = Some(payload.clone());
        drop(state);

        let mut event =
            MarketEvent::new(update.timestamp_utc, symbol.clone(), EventPayload::BboQuote(payload));
        event.stream_id = update.stream_id.clone();
        event.venue = update.venue.clone();
        event
    }

    /// Last known BBO for `symbol`, used by the trade collector to infer aggressor.
    pub fn try_get(&self, symbol: &Symbol) -> Option<BboQuotePayload> {
        let state_lock = self.states.get(symbol)?;
        let state = state_lock.lock();
        state.last.clone()
    }

    /// Drop state for every symbol untouched for at least `max_idle`, returning
    /// the evicted symbols.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<Symbol> {
        self.states.sweep_idle(max_idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TimestampUs;
    use rust_decimal_macros::dec;

    fn update(bid: Decimal, ask: Decimal) -> MarketQuoteUpdate {
        MarketQuoteUpdate {
            symbol: "AAPL".into(),
            timestamp_utc: TimestampUs::from_micros(0),
            bid,
            bid_sz: dec!(100),
            ask,
            ask_sz: dec!(100),
            stream_id: None,
            venue: None,
        }
    }

    #[test]
    fn computes_mid_and_spread_when_crossed_free() {
        let collector = QuoteCollector::new();
        let symbol = Symbol::new("AAPL").unwrap();
        let event = collector.on_quote(&symbol, &update(dec!(100.00), dec!(100.05)));
        let EventPayload::BboQuote(payload) = event.payload else {
            panic!("expected BboQuote");
        };
        assert_eq!(payload.mid, Some(dec!(100.025)));
        assert_eq!(payload.spread, Some(dec!(0.05)));
        assert_eq!(payload.sequence, 1);
    }

    #[test]
    fn mid_and_spread_none_when_crossed_or_zero() {
        let collector = QuoteCollector::new();
        let symbol = Symbol::new("AAPL").unwrap();

        let crossed = collector.on_quote(&symbol, &update(dec!(100.10), dec!(100.00)));
        let EventPayload::BboQuote(payload) = crossed.payload else {
            panic!()
        };
        assert_eq!(payload.mid, None);
        assert_eq!(payload.spread, None);

        let zero_bid = collector.on_quote(&symbol, &update(Decimal::ZERO, dec!(100.00)));
        let EventPayload::BboQuote(payload) = zero_bid.payload else {
            panic!()
        };
        assert_eq!(payload.mid, None);
    }

    #[test]
    fn quote_seq_is_monotonic_per_symbol() {
        let collector = QuoteCollector::new();
        let symbol = Symbol::new("AAPL").unwrap();
        let e1 = collector.on_quote(&symbol, &update(dec!(1), dec!(2)));
        let e2 = collector.on_quote(&symbol, &update(dec!(1), dec!(2)));
        let (EventPayload::BboQuote(p1), EventPayload::BboQuote(p2)) = (e1.payload, e2.payload) else {
            panic!()
        };
        assert_eq!(p1.sequence, 1);
        assert_eq!(p2.sequence, 2);
    }

    #[test]
    fn try_get_reflects_last_quote() {
        let collector = QuoteCollector::new();
        let symbol = Symbol::new("AAPL").unwrap();
        assert!(collector.try_get(&symbol).is_none());
        collector.on_quote(&symbol, &update(dec!(100.00), dec!(100.05)));
        let bbo = collector.try_get(&symbol).unwrap();
        assert_eq!(bbo.bid_price, dec!(100.00));
    }
}
