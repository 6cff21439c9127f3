//! TradeCollector — sequence continuity, aggressor inference, order-flow stats,
//! recent-trade ring.

use crate::{
    event::{
        integrity_code, BboQuotePayload, EventPayload, IntegrityPayload, MarketEvent, Severity,
        TradePayload,
    },
    util::{ring::Ring, sharded_map::SymbolMap},
    wire::MarketTradeUpdate,
};
use quoteflow_markets::{Aggressor, Decimal, Symbol};
use std::time::Duration;

/// Per-symbol state with no activity for this long is eligible for the
/// inactivity sweep.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const RECENT_TRADES_CAP: usize = 200;

#[derive(Debug)]
struct TradeState {
    last_seq: Option<u64>,
    buy_volume: Decimal,
    sell_volume: Decimal,
    unk_volume: Decimal,
    vwap_num: Decimal,
    vwap_den: Decimal,
    trade_count: u64,
    is_stale: bool,
    recent: Ring<TradePayload>,
}

impl Default for TradeState {
    fn default() -> Self {
        Self {
            last_seq: None,
            buy_volume: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            unk_volume: Decimal::ZERO,
            vwap_num: Decimal::ZERO,
            vwap_den: Decimal::ZERO,
            trade_count: 0,
            is_stale: false,
            recent: Ring::new(RECENT_TRADES_CAP),
        }
    }
}

/// Sanitize a raw, possibly-invalid symbol string into something that can still be
/// attached to an `Integrity` event envelope: truncate to the max length and
/// replace any disallowed character with `_`. Never used for state lookups — only
/// for giving the emitted `Integrity{InvalidSymbol}` event *some* symbol to carry.
fn sanitize_for_event(raw: &str) -> Symbol {
    let cleaned: String = raw
        .chars()
        .take(quoteflow_markets::symbol::MAX_SYMBOL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = if cleaned.is_empty() { "_".to_string() } else { cleaned };
    Symbol::new(cleaned).expect("sanitized symbol is always valid")
}

fn integrity_event(
    symbol: Symbol,
    update: &MarketTradeUpdate,
    severity: Severity,
    code: u32,
    description: impl Into<String>,
) -> MarketEvent {
    let payload = IntegrityPayload {
        severity,
        code,
        description: description.into(),
        sequence: update.sequence.max(0) as u64,
    };
    let mut event = MarketEvent::new(update.timestamp_utc, symbol, EventPayload::Integrity(payload));
    event.stream_id = update.stream_id.clone();
    event.venue = update.venue.clone();
    event
}

/// Consumes [`MarketTradeUpdate`]s. See module docs for the processing pipeline.
#[derive(Debug, Default)]
pub struct TradeCollector {
    states: SymbolMap<TradeState>,
}

impl TradeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single trade update. `bbo` is the prevailing BBO for this symbol
    /// (supplied by the caller, typically the router reading from the
    /// [`crate::collector::quote::QuoteCollector`]), used only for aggressor
    /// inference when `update.aggressor == Aggressor::Unknown`.
    ///
    /// Any step that detects a defect emits the matching `Integrity` event and
    /// returns without advancing state.
    pub fn on_trade(&self, update: &MarketTradeUpdate, bbo: Option<&BboQuotePayload>) -> Vec<MarketEvent> {
        // Step 1: symbol validation.
        let symbol = match Symbol::new(&update.symbol) {
            Ok(symbol) => symbol,
            Err(err) => {
                let fallback = sanitize_for_event(&update.symbol);
                return vec![integrity_event(
                    fallback,
                    update,
                    Severity::Error,
                    integrity_code::INVALID_SYMBOL,
                    format!("invalid symbol: {err}"),
                )];
            }
        };

        // Step 2: non-negative sequence.
        if update.sequence < 0 {
            return vec![integrity_event(
                symbol,
                update,
                Severity::Error,
                integrity_code::INVALID_SEQUENCE_NUMBER,
                format!("sequence must be non-negative, got {}", update.sequence),
            )];
        }
        let seq = update.sequence as u64;

        let state_lock = self.states.get_or_create(&symbol);
        let mut state = state_lock.lock();

        // Step 3: sequence continuity.
        let mut is_gap = false;
        if let Some(last) = state.last_seq {
            if seq <= last {
                return vec![integrity_event(
                    symbol,
                    update,
                    Severity::Warning,
                    integrity_code::OUT_OF_ORDER,
                    format!("out-of-order trade: last={last}, received={seq}"),
                )];
            }
            if seq > last + 1 {
                is_gap = true;
            }
        }

        let mut events = Vec::with_capacity(2);
        if is_gap {
            let expected_next = state.last_seq.expect("gap implies a prior sequence") + 1;
            events.push(integrity_event(
                symbol.clone(),
                update,
                Severity::Error,
                integrity_code::SEQUENCE_GAP,
                format!("sequence gap: expected_next={expected_next}, received={seq}"),
            ));
        }

        // Step 4: aggressor inference.
        let aggressor = if update.aggressor == Aggressor::Unknown {
            infer_aggressor(update.price, bbo)
        } else {
            update.aggressor
        };

        // Step 5: register trade.
        state.last_seq = Some(seq);
        match aggressor {
            Aggressor::Buy => state.buy_volume += Decimal::from(update.size),
            Aggressor::Sell => state.sell_volume += Decimal::from(update.size),
            Aggressor::Unknown => state.unk_volume += Decimal::from(update.size),
        }
        state.vwap_num += update.price * Decimal::from(update.size);
        state.vwap_den += Decimal::from(update.size);
        state.trade_count += 1;
        state.is_stale = is_gap;

        let trade_payload = TradePayload {
            price: update.price,
            size: update.size,
            aggressor,
            sequence: seq,
        };
        state.recent.push(trade_payload.clone());

        let vwap = if state.vwap_den.is_zero() {
            Decimal::ZERO
        } else {
            state.vwap_num / state.vwap_den
        };
        let total = state.buy_volume + state.sell_volume + state.unk_volume;
        let imbalance = if total.is_zero() {
            Decimal::ZERO
        } else {
            (state.buy_volume - state.sell_volume) / total
        };
        let order_flow = crate::event::OrderFlowPayload {
            buy_vol: state.buy_volume,
            sell_vol: state.sell_volume,
            unk_vol: state.unk_volume,
            vwap,
            imbalance,
            trade_count: state.trade_count,
            sequence: seq,
        };
        drop(state);

        // Step 6: emit Trade followed by OrderFlow.
        let mut trade_event =
            MarketEvent::new(update.timestamp_utc, symbol.clone(), EventPayload::Trade(trade_payload));
        trade_event.stream_id = update.stream_id.clone();
        trade_event.venue = update.venue.clone();
        events.push(trade_event);

        let mut flow_event = MarketEvent::new(
            update.timestamp_utc,
            symbol,
            EventPayload::OrderFlow(order_flow),
        );
        flow_event.stream_id = update.stream_id.clone();
        flow_event.venue = update.venue.clone();
        events.push(flow_event);

        events
    }

    /// Newest-first recent trades for `symbol`, capped at both `limit` and 200.
    /// Drop state for every symbol untouched for at least `max_idle`, returning
    /// the evicted symbols. Callers drive this from a periodic task; state is
    /// recreated lazily on the next trade for a swept symbol.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<Symbol> {
        self.states.sweep_idle(max_idle)
    }

    pub fn get_recent(&self, symbol: &Symbol, limit: usize) -> Vec<TradePayload> {
        match self.states.get(symbol) {
            Some(state_lock) => state_lock.lock().recent.recent(limit),
            None => Vec::new(),
        }
    }
}

fn infer_aggressor(price: Decimal, bbo: Option<&BboQuotePayload>) -> Aggressor {
    let Some(bbo) = bbo else {
        return Aggressor::Unknown;
    };
    if bbo.ask_price > Decimal::ZERO && price >= bbo.ask_price {
        Aggressor::Buy
    } else if bbo.bid_price > Decimal::ZERO && price <= bbo.bid_price {
        Aggressor::Sell
    } else {
        Aggressor::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TimestampUs;
    use rust_decimal_macros::dec;

    fn trade(seq: i64, price: Decimal, size: i64, aggressor: Aggressor) -> MarketTradeUpdate {
        MarketTradeUpdate {
            symbol: "AAPL".into(),
            timestamp_utc: TimestampUs::from_micros(0),
            price,
            size,
            aggressor,
            sequence: seq,
            stream_id: None,
            venue: None,
        }
    }

    #[test]
    fn s1_gap_scenario_emits_gap_integrity_and_keeps_history() {
        let collector = TradeCollector::new();
        let e100 = collector.on_trade(&trade(100, dec!(1), 1, Aggressor::Buy), None);
        assert_eq!(e100.len(), 2); // Trade, OrderFlow

        let e101 = collector.on_trade(&trade(101, dec!(1), 1, Aggressor::Buy), None);
        assert_eq!(e101.len(), 2);

        let e104 = collector.on_trade(&trade(104, dec!(1), 1, Aggressor::Buy), None);
        assert_eq!(e104.len(), 3); // Integrity(gap), Trade, OrderFlow
        let EventPayload::Integrity(integrity) = &e104[0].payload else {
            panic!("expected Integrity first");
        };
        assert_eq!(integrity.code, integrity_code::SEQUENCE_GAP);

        let symbol = Symbol::new("AAPL").unwrap();
        assert_eq!(collector.get_recent(&symbol, 10).len(), 3);

        let EventPayload::OrderFlow(flow) = &e104[2].payload else {
            panic!()
        };
        assert_eq!(flow.trade_count, 3);
    }

    #[test]
    fn s2_duplicate_out_of_order_rejects_second_equal_sequence() {
        let collector = TradeCollector::new();
        collector.on_trade(&trade(10, dec!(1), 1, Aggressor::Buy), None);
        collector.on_trade(&trade(11, dec!(1), 1, Aggressor::Buy), None);
        let rejected = collector.on_trade(&trade(11, dec!(1), 1, Aggressor::Buy), None);

        assert_eq!(rejected.len(), 1);
        let EventPayload::Integrity(integrity) = &rejected[0].payload else {
            panic!("expected Integrity");
        };
        assert_eq!(integrity.code, integrity_code::OUT_OF_ORDER);

        let symbol = Symbol::new("AAPL").unwrap();
        assert_eq!(collector.get_recent(&symbol, 10).len(), 2);
    }

    #[test]
    fn s3_aggressor_inference_from_bbo() {
        let collector = TradeCollector::new();
        let bbo = BboQuotePayload {
            bid_price: dec!(100.00),
            bid_size: dec!(100),
            ask_price: dec!(100.05),
            ask_size: dec!(100),
            mid: Some(dec!(100.025)),
            spread: Some(dec!(0.05)),
            sequence: 1,
        };
        let events = collector.on_trade(
            &trade(1, dec!(100.05), 200, Aggressor::Unknown),
            Some(&bbo),
        );
        let EventPayload::Trade(trade_payload) = &events[0].payload else {
            panic!()
        };
        assert_eq!(trade_payload.aggressor, Aggressor::Buy);

        let EventPayload::OrderFlow(flow) = &events[1].payload else {
            panic!()
        };
        assert_eq!(flow.buy_vol, dec!(200));
        assert_eq!(flow.imbalance, dec!(1));
    }

    #[test]
    fn invalid_symbol_emits_integrity_and_does_not_touch_state() {
        let collector = TradeCollector::new();
        let mut update = trade(1, dec!(1), 1, Aggressor::Buy);
        update.symbol = "BAD SYMBOL $".to_string();
        let events = collector.on_trade(&update, None);
        assert_eq!(events.len(), 1);
        let EventPayload::Integrity(integrity) = &events[0].payload else {
            panic!()
        };
        assert_eq!(integrity.code, integrity_code::INVALID_SYMBOL);
    }

    #[test]
    fn negative_sequence_emits_integrity() {
        let collector = TradeCollector::new();
        let events = collector.on_trade(&trade(-1, dec!(1), 1, Aggressor::Buy), None);
        assert_eq!(events.len(), 1);
        let EventPayload::Integrity(integrity) = &events[0].payload else {
            panic!()
        };
        assert_eq!(integrity.code, integrity_code::INVALID_SEQUENCE_NUMBER);
    }

    #[test]
    fn vwap_matches_independent_computation() {
        let collector = TradeCollector::new();
        collector.on_trade(&trade(1, dec!(10), 100, Aggressor::Buy), None);
        let events = collector.on_trade(&trade(2, dec!(20), 300, Aggressor::Sell), None);
        let EventPayload::OrderFlow(flow) = &events[1].payload else {
            panic!()
        };
        let expected = (dec!(10) * dec!(100) + dec!(20) * dec!(300)) / dec!(400);
        assert_eq!(flow.vwap, expected);
    }

    #[test]
    fn is_stale_clears_on_next_non_gap_trade() {
        let collector = TradeCollector::new();
        let symbol = Symbol::new("AAPL").unwrap();
        collector.on_trade(&trade(1, dec!(1), 1, Aggressor::Buy), None);
        collector.on_trade(&trade(5, dec!(1), 1, Aggressor::Buy), None); // gap -> stale
        {
            let state_lock = collector.states.get(&symbol).unwrap();
            assert!(state_lock.lock().is_stale);
        }
        collector.on_trade(&trade(6, dec!(1), 1, Aggressor::Buy), None); // no gap -> clears
        let state_lock = collector.states.get(&symbol).unwrap();
        assert!(!state_lock.lock().is_stale);
    }
}
