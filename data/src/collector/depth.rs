//! DepthCollector — L2 order-book state machine.

use crate::{
    event::{mid_price, DepthIntegrityKind, EventPayload, L2SnapshotPayload, MarketEvent, MarketState, OrderBookLevel},
    util::{ring::Ring, sharded_map::SymbolMap},
    wire::{DepthOperation, MarketDepthUpdate},
};
use quoteflow_markets::{Decimal, Side, Symbol};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const RECENT_INTEGRITY_CAP: usize = 100;

/// Tunables for the 15-second / 3-event auto-reset policy. Exposed as
/// configuration rather than hardcoded, since the right threshold is
/// deployment-dependent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DepthIntegrityConfig {
    pub window_ms: u64,
    pub threshold: u32,
}

impl Default for DepthIntegrityConfig {
    fn default() -> Self {
        Self {
            window_ms: 15_000,
            threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookLifecycle {
    Healthy,
    Stale,
}

#[derive(Debug)]
struct DepthState {
    bids: Vec<OrderBookLevel>,
    asks: Vec<OrderBookLevel>,
    lifecycle: BookLifecycle,
    seq: u64,
    integrity_window: Vec<Instant>,
    recent_integrity: Ring<crate::event::DepthIntegrityPayload>,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
            lifecycle: BookLifecycle::Healthy,
            seq: 0,
            integrity_window: Vec::new(),
            recent_integrity: Ring::new(RECENT_INTEGRITY_CAP),
        }
    }
}

impl DepthState {
    fn side_mut(&mut self, side: Side) -> &mut Vec<OrderBookLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn reindex(levels: &mut [OrderBookLevel]) {
        for (i, level) in levels.iter_mut().enumerate() {
            level.level = i as u16;
        }
    }

    fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.lifecycle = BookLifecycle::Healthy;
        self.integrity_window.clear();
    }
}

/// L2 order-book state machine. Consumes position-based insert/update/delete
/// deltas, rejects anything violating per-operation preconditions into `Stale`, and
/// emits `L2Snapshot` events on every successful mutation.
#[derive(Debug)]
pub struct DepthCollector {
    states: SymbolMap<DepthState>,
    config: DepthIntegrityConfig,
}

impl Default for DepthCollector {
    fn default() -> Self {
        Self::new(DepthIntegrityConfig::default())
    }
}

impl DepthCollector {
    pub fn new(config: DepthIntegrityConfig) -> Self {
        Self {
            states: SymbolMap::new(),
            config,
        }
    }

    /// Apply one depth delta, returning the events it produced: exactly one
    /// `DepthIntegrity` event on any precondition failure (possibly followed by
    /// nothing else), or exactly one `L2Snapshot` on success.
    pub fn apply_delta(&self, symbol: &Symbol, update: &MarketDepthUpdate) -> Vec<MarketEvent> {
        let state_lock = self.states.get_or_create(symbol);
        let mut state = state_lock.lock();

        if state.lifecycle == BookLifecycle::Stale {
            let mut events = vec![self.record_integrity(
                &mut state,
                symbol,
                update,
                DepthIntegrityKind::Stale,
                "book is stale; awaiting reset".to_string(),
            )];

            if self.should_auto_reset(&state) {
                state.reset();
                events.push(self.auto_reset_event(symbol, update));
            }
            return events;
        }

        let side_len = state.side_mut(update.side).len();
        let precondition_ok = match update.operation {
            DepthOperation::Insert => update.position as usize <= side_len,
            DepthOperation::Update => (update.position as usize) < side_len,
            DepthOperation::Delete => (update.position as usize) < side_len,
        };

        if !precondition_ok {
            let kind = match update.operation {
                DepthOperation::Insert => DepthIntegrityKind::Gap,
                DepthOperation::Update => DepthIntegrityKind::OutOfOrder,
                DepthOperation::Delete => DepthIntegrityKind::InvalidPosition,
            };
            let description = format!(
                "{:?} at position {} rejected: side has {} level(s)",
                update.operation, update.position, side_len
            );
            let mut events = vec![self.record_integrity(&mut state, symbol, update, kind, description)];
            state.lifecycle = BookLifecycle::Stale;

            if self.should_auto_reset(&state) {
                state.reset();
                events.push(self.auto_reset_event(symbol, update));
            }
            return events;
        }

        match update.operation {
            DepthOperation::Insert => {
                let level = OrderBookLevel::new(update.side, update.position, update.price, update.size);
                let levels = state.side_mut(update.side);
                levels.insert(update.position as usize, level);
                DepthState::reindex(levels);
            }
            DepthOperation::Update => {
                let levels = state.side_mut(update.side);
                let level = &mut levels[update.position as usize];
                level.price = update.price;
                level.size = update.size;
                level.market_maker = update.market_maker.clone();
            }
            DepthOperation::Delete => {
                let levels = state.side_mut(update.side);
                levels.remove(update.position as usize);
                DepthState::reindex(levels);
            }
        }

        state.seq += 1;
        let snapshot = self.snapshot(&state, symbol, update);
        vec![snapshot]
    }

    fn record_integrity(
        &self,
        state: &mut DepthState,
        symbol: &Symbol,
        update: &MarketDepthUpdate,
        kind: DepthIntegrityKind,
        description: String,
    ) -> MarketEvent {
        let payload = crate::event::DepthIntegrityPayload {
            kind,
            description: description.clone(),
            position: Some(update.position),
            side: Some(update.side),
            sequence: update.sequence.map(|s| s.max(0) as u64),
        };
        state.recent_integrity.push(payload.clone());
        state.integrity_window.push(Instant::now());

        let mut event = MarketEvent::new(
            update.timestamp_utc,
            symbol.clone(),
            EventPayload::DepthIntegrity(payload),
        );
        event.stream_id = update.stream_id.clone();
        event.venue = update.venue.clone();
        event
    }

    /// Three (configurable) `DepthIntegrity` events within the configured sliding
    /// window for this symbol trigger exactly one implicit reset.
    fn should_auto_reset(&self, state: &DepthState) -> bool {
        let window = Duration::from_millis(self.config.window_ms);
        let cutoff = Instant::now() - window;
        let in_window = state.integrity_window.iter().filter(|t| **t >= cutoff).count();
        in_window as u32 >= self.config.threshold
    }

    fn auto_reset_event(&self, symbol: &Symbol, update: &MarketDepthUpdate) -> MarketEvent {
        let payload = crate::event::DepthIntegrityPayload {
            kind: DepthIntegrityKind::Unknown,
            description: format!(
                "auto-reset triggered after {} integrity events within {}ms",
                self.config.threshold, self.config.window_ms
            ),
            position: None,
            side: None,
            sequence: update.sequence.map(|s| s.max(0) as u64),
        };
        let mut event = MarketEvent::new(
            update.timestamp_utc,
            symbol.clone(),
            EventPayload::DepthIntegrity(payload),
        );
        event.stream_id = update.stream_id.clone();
        event.venue = update.venue.clone();
        event
    }

    fn snapshot(&self, state: &DepthState, symbol: &Symbol, update: &MarketDepthUpdate) -> MarketEvent {
        let (mid, imbalance) = match (state.bids.first(), state.asks.first()) {
            (Some(best_bid), Some(best_ask)) => {
                let total = best_bid.size + best_ask.size;
                let imbalance = if total.is_zero() {
                    None
                } else {
                    Some((best_bid.size - best_ask.size) / total)
                };
                (Some(mid_price(best_bid.price, best_ask.price)), imbalance)
            }
            _ => (None, None),
        };

        let payload = L2SnapshotPayload {
            bids: state.bids.clone(),
            asks: state.asks.clone(),
            mid,
            imbalance,
            state: MarketState::Normal,
            sequence: state.seq,
        };

        let mut event = MarketEvent::new(
            update.timestamp_utc,
            symbol.clone(),
            EventPayload::L2Snapshot(payload),
        );
        event.stream_id = update.stream_id.clone();
        event.venue = update.venue.clone();
        event
    }

    /// Explicitly clear a book back to `Healthy` with no levels on either side.
    /// Called externally by operators/recovery flows, and internally by the
    /// auto-reset policy.
    pub fn reset(&self, symbol: &Symbol) {
        if let Some(state_lock) = self.states.get(symbol) {
            state_lock.lock().reset();
        }
    }

    /// The `cap 100` bounded FIFO of recent `DepthIntegrity` diagnostics for `symbol`.
    pub fn recent_integrity(&self, symbol: &Symbol, limit: usize) -> Vec<crate::event::DepthIntegrityPayload> {
        match self.states.get(symbol) {
            Some(state_lock) => state_lock.lock().recent_integrity.recent(limit),
            None => Vec::new(),
        }
    }

    pub fn is_stale(&self, symbol: &Symbol) -> bool {
        match self.states.get(symbol) {
            Some(state_lock) => state_lock.lock().lifecycle == BookLifecycle::Stale,
            None => false,
        }
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

    fn update(op: DepthOperation, side: Side, position: u16, price: Decimal, size: Decimal) -> MarketDepthUpdate {
        MarketDepthUpdate {
            symbol: "AAPL".into(),
            timestamp_utc: TimestampUs::from_micros(0),
            position,
            operation: op,
            side,
            price,
            size,
            market_maker: None,
            sequence: None,
            stream_id: None,
            venue: None,
        }
    }

    #[test]
    fn s4_insert_delete_sequence_matches_expected_snapshots() {
        let collector = DepthCollector::default();
        let symbol = Symbol::new("AAPL").unwrap();

        let e1 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Bid, 0, dec!(99.99), dec!(10)));
        let EventPayload::L2Snapshot(s1) = &e1[0].payload else { panic!() };
        assert_eq!(s1.bids, vec![OrderBookLevel::new(Side::Bid, 0, dec!(99.99), dec!(10))]);

        let e2 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Bid, 1, dec!(99.98), dec!(5)));
        let EventPayload::L2Snapshot(s2) = &e2[0].payload else { panic!() };
        assert_eq!(
            s2.bids,
            vec![
                OrderBookLevel::new(Side::Bid, 0, dec!(99.99), dec!(10)),
                OrderBookLevel::new(Side::Bid, 1, dec!(99.98), dec!(5)),
            ]
        );

        let e3 = collector.apply_delta(&symbol, &update(DepthOperation::Delete, Side::Bid, 0, dec!(0), dec!(0)));
        let EventPayload::L2Snapshot(s3) = &e3[0].payload else { panic!() };
        assert_eq!(s3.bids, vec![OrderBookLevel::new(Side::Bid, 0, dec!(99.98), dec!(5))]);
    }

    #[test]
    fn s5_corruption_then_stale_then_reset_recovers() {
        let collector = DepthCollector::default();
        let symbol = Symbol::new("AAPL").unwrap();

        // Update on empty book: precondition fails (0 < side_len required).
        let e1 = collector.apply_delta(&symbol, &update(DepthOperation::Update, Side::Bid, 0, dec!(1), dec!(1)));
        let EventPayload::DepthIntegrity(d1) = &e1[0].payload else { panic!() };
        assert_eq!(d1.kind, DepthIntegrityKind::OutOfOrder);
        assert!(collector.is_stale(&symbol));

        // Further mutation while stale is rejected.
        let e2 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Bid, 0, dec!(1), dec!(1)));
        let EventPayload::DepthIntegrity(d2) = &e2[0].payload else { panic!() };
        assert_eq!(d2.kind, DepthIntegrityKind::Stale);

        collector.reset(&symbol);
        assert!(!collector.is_stale(&symbol));

        let e3 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Bid, 0, dec!(1), dec!(1)));
        assert!(matches!(e3[0].payload, EventPayload::L2Snapshot(_)));
    }

    #[test]
    fn p9_three_integrity_events_in_window_trigger_one_auto_reset() {
        let collector = DepthCollector::default();
        let symbol = Symbol::new("AAPL").unwrap();

        // Each of these independently fails its precondition on an empty/stale book.
        let bad = update(DepthOperation::Update, Side::Bid, 0, dec!(1), dec!(1));
        let e1 = collector.apply_delta(&symbol, &bad);
        assert_eq!(e1.len(), 1);
        let e2 = collector.apply_delta(&symbol, &bad);
        assert_eq!(e2.len(), 1);
        let e3 = collector.apply_delta(&symbol, &bad);
        // Third failure crosses the threshold: integrity event + the implicit reset event.
        assert_eq!(e3.len(), 2);
        assert!(!collector.is_stale(&symbol), "auto-reset should have cleared Stale");

        // The book is healthy again and accepts a fresh insert.
        let e4 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Bid, 0, dec!(1), dec!(1)));
        assert!(matches!(e4[0].payload, EventPayload::L2Snapshot(_)));
    }

    #[test]
    fn p2_book_side_consistency_after_prefix_of_deltas() {
        let collector = DepthCollector::default();
        let symbol = Symbol::new("AAPL").unwrap();
        collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Ask, 0, dec!(101), dec!(1)));
        collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Ask, 1, dec!(102), dec!(1)));
        collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Ask, 0, dec!(100.5), dec!(1)));

        let state_lock = collector.states.get(&symbol).unwrap();
        let state = state_lock.lock();
        for (i, level) in state.asks.iter().enumerate() {
            assert_eq!(level.level as usize, i);
        }
    }

    #[test]
    fn mid_and_imbalance_computed_only_when_both_sides_present() {
        let collector = DepthCollector::default();
        let symbol = Symbol::new("AAPL").unwrap();
        let e1 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Bid, 0, dec!(99), dec!(10)));
        let EventPayload::L2Snapshot(s1) = &e1[0].payload else { panic!() };
        assert_eq!(s1.mid, None);

        let e2 = collector.apply_delta(&symbol, &update(DepthOperation::Insert, Side::Ask, 0, dec!(101), dec!(10)));
        let EventPayload::L2Snapshot(s2) = &e2[0].payload else { panic!() };
        assert_eq!(s2.mid, Some(dec!(100)));
        assert_eq!(s2.imbalance, Some(dec!(0)));
    }
}
