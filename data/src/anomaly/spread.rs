//! SpreadMonitor (component C8b): tracks running bid/ask spread statistics per
//! symbol, expressed in basis points, and flags runs of abnormally wide quotes.

use crate::{
    event::{EventPayload, MarketEvent},
    router::EventObserver,
    util::sharded_map::SymbolMap,
};
use quoteflow_markets::{Decimal, Symbol};
use std::time::Duration;

/// A quote is "wide" once any configured threshold is exceeded. Every field is
/// optional — thresholds that are `None` simply never trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadMonitorConfig {
    /// Wide once `spread_bps` exceeds this many basis points of mid.
    pub wide_spread_bps: Option<Decimal>,
    /// Wide once `(ask - bid) / mid * 100` exceeds this percentage.
    pub wide_spread_percent: Option<Decimal>,
    /// Wide once the raw `ask - bid` exceeds this absolute amount.
    pub wide_spread_absolute: Option<Decimal>,
    /// Consecutive wide quotes required before an alert fires.
    pub consecutive_wide_threshold: u32,
}

impl Default for SpreadMonitorConfig {
    fn default() -> Self {
        Self {
            wide_spread_bps: Some(Decimal::from(50)), // 0.50%
            wide_spread_percent: None,
            wide_spread_absolute: None,
            consecutive_wide_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadStats {
    pub last_bps: Decimal,
    pub min_bps: Decimal,
    pub max_bps: Decimal,
    pub avg_bps: Decimal,
    pub sample_count: u64,
    pub consecutive_wide: u32,
}

impl Default for SpreadStats {
    fn default() -> Self {
        Self {
            last_bps: Decimal::ZERO,
            min_bps: Decimal::MAX,
            max_bps: Decimal::MIN,
            avg_bps: Decimal::ZERO,
            sample_count: 0,
            consecutive_wide: 0,
        }
    }
}

/// Spread in basis points of the midpoint: `(ask - bid) / mid * 10_000`.
/// `None` when mid is zero (no meaningful spread to express).
pub fn spread_bps(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    let mid = (bid + ask) / Decimal::from(2);
    if mid.is_zero() {
        return None;
    }
    Some((ask - bid) / mid * Decimal::from(10_000))
}

/// Spread as a percentage of the midpoint: `(ask - bid) / mid * 100`.
/// `None` when mid is zero.
pub fn spread_percent(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    let mid = (bid + ask) / Decimal::from(2);
    if mid.is_zero() {
        return None;
    }
    Some((ask - bid) / mid * Decimal::from(100))
}

/// Observes `BboQuote` events and maintains a running [`SpreadStats`] per
/// symbol, escalating when `consecutive_wide_threshold` wide quotes land
/// back to back.
#[derive(Debug)]
pub struct SpreadMonitor {
    states: SymbolMap<SpreadStats>,
    config: SpreadMonitorConfig,
}

impl SpreadMonitor {
    pub fn new(config: SpreadMonitorConfig) -> Self {
        Self {
            states: SymbolMap::new(),
            config,
        }
    }

    /// True iff any of the configured bps/percent/absolute thresholds is
    /// exceeded by this quote.
    fn is_wide(&self, bid: Decimal, ask: Decimal, bps: Decimal) -> bool {
        if let Some(threshold) = self.config.wide_spread_bps {
            if bps >= threshold {
                return true;
            }
        }
        if let Some(threshold) = self.config.wide_spread_percent {
            if let Some(percent) = spread_percent(bid, ask) {
                if percent >= threshold {
                    return true;
                }
            }
        }
        if let Some(threshold) = self.config.wide_spread_absolute {
            if ask - bid >= threshold {
                return true;
            }
        }
        false
    }

    /// Returns `true` if this update pushed the symbol's consecutive-wide
    /// streak to (or past) the configured threshold.
    pub fn observe(&self, symbol: &Symbol, bid: Decimal, ask: Decimal) -> bool {
        let Some(bps) = spread_bps(bid, ask) else {
            return false;
        };

        let state_lock = self.states.get_or_create(symbol);
        let mut state = state_lock.lock();

        state.last_bps = bps;
        state.min_bps = state.min_bps.min(bps);
        state.max_bps = state.max_bps.max(bps);
        let n = Decimal::from(state.sample_count);
        state.avg_bps = (state.avg_bps * n + bps) / (n + Decimal::from(1));
        state.sample_count += 1;

        if self.is_wide(bid, ask, bps) {
            state.consecutive_wide += 1;
        } else {
            state.consecutive_wide = 0;
        }

        state.consecutive_wide >= self.config.consecutive_wide_threshold
    }

    pub fn stats(&self, symbol: &Symbol) -> Option<SpreadStats> {
        self.states.get(symbol).map(|s| *s.lock())
    }

    /// Drop state for every symbol untouched for at least `max_idle`, returning
    /// the evicted symbols.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<Symbol> {
        self.states.sweep_idle(max_idle)
    }
}

impl EventObserver for SpreadMonitor {
    fn on_event(&self, event: &MarketEvent) {
        if let EventPayload::BboQuote(quote) = &event.payload {
            let alert = self.observe(&event.symbol, quote.bid_price, quote.ask_price);
            if alert {
                tracing::warn!(symbol = %event.symbol, spread_bps = %quote.spread.unwrap_or_default(), "sustained wide spread");
            }
        }
    }
}
