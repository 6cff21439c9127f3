//! DuplicateDetector (component C8a): flags re-delivery of an event this kernel
//! has already processed, keyed by a per-payload-kind fingerprint of the fields
//! that should make an event unique.

use crate::{
    event::{EventPayload, MarketEvent},
    router::EventObserver,
    util::sharded_map::SymbolMap,
};
use quoteflow_markets::Symbol;
use std::{
    collections::VecDeque,
    hash::{Hash, Hasher},
    time::{Duration, Instant},
};
use std::collections::hash_map::DefaultHasher;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateDetectorConfig {
    pub window: Duration,
    pub max_entries_per_symbol: usize,
    pub alert_cooldown: Duration,
}

impl Default for DuplicateDetectorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            max_entries_per_symbol: 10_000,
            alert_cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct DuplicateState {
    seen: VecDeque<(u64, Instant)>,
    duplicate_count: u64,
    last_alert_at: Option<Instant>,
}

/// `Trade = hash(ts_us, price, size)`, `Quote = hash(ts_us, bid, ask, bid_sz,
/// ask_sz)`: the wire-level fields that make an event unique, not the
/// collector-assigned monotonic sequence — a re-delivered event gets a fresh
/// sequence number from the collector, so fingerprinting on sequence alone
/// would never recognize it as a duplicate.
fn fingerprint(event: &MarketEvent) -> u64 {
    let mut hasher = DefaultHasher::new();
    event.symbol.hash(&mut hasher);
    event.payload.kind_str().hash(&mut hasher);
    event.timestamp_utc.hash(&mut hasher);
    match &event.payload {
        EventPayload::Trade(p) => {
            p.price.hash(&mut hasher);
            p.size.hash(&mut hasher);
        }
        EventPayload::BboQuote(p) => {
            p.bid_price.hash(&mut hasher);
            p.ask_price.hash(&mut hasher);
            p.bid_size.hash(&mut hasher);
            p.ask_size.hash(&mut hasher);
        }
        EventPayload::L2Snapshot(p) => {
            p.sequence.hash(&mut hasher);
        }
        EventPayload::OrderFlow(p) => {
            p.sequence.hash(&mut hasher);
        }
        EventPayload::Integrity(p) => {
            p.sequence.hash(&mut hasher);
            p.code.hash(&mut hasher);
        }
        EventPayload::DepthIntegrity(p) => {
            p.sequence.hash(&mut hasher);
            p.position.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Result of checking a single event against the recent-fingerprint dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateVerdict {
    Unique,
    /// Duplicate of an event seen within the retention window. `alert` is set
    /// only when the per-symbol cooldown allowed a fresh alert to fire.
    Duplicate { alert: bool },
}

/// Maintains a bounded, time-windowed fingerprint dictionary per symbol and
/// flags re-delivered events.
#[derive(Debug)]
pub struct DuplicateDetector {
    states: SymbolMap<DuplicateState>,
    config: DuplicateDetectorConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateDetectorConfig) -> Self {
        Self {
            states: SymbolMap::new(),
            config,
        }
    }

    pub fn check(&self, event: &MarketEvent) -> DuplicateVerdict {
        let state_lock = self.states.get_or_create(&event.symbol);
        let mut state = state_lock.lock();

        let now = Instant::now();
        let cutoff = now - self.config.window;
        while let Some((_, seen_at)) = state.seen.front() {
            if *seen_at < cutoff {
                state.seen.pop_front();
            } else {
                break;
            }
        }

        let fp = fingerprint(event);
        let is_duplicate = state.seen.iter().any(|(existing, _)| *existing == fp);

        if is_duplicate {
            state.duplicate_count += 1;
            let suppressed = state
                .last_alert_at
                .is_some_and(|last| now.duration_since(last) < self.config.alert_cooldown);
            let alert = !suppressed;
            if alert {
                state.last_alert_at = Some(now);
            }
            return DuplicateVerdict::Duplicate { alert };
        }

        if state.seen.len() >= self.config.max_entries_per_symbol {
            state.seen.pop_front();
        }
        state.seen.push_back((fp, now));
        DuplicateVerdict::Unique
    }

    pub fn duplicate_count(&self, symbol: &Symbol) -> u64 {
        self.states
            .get(symbol)
            .map(|s| s.lock().duplicate_count)
            .unwrap_or(0)
    }

    /// Drop state for every symbol untouched for at least `max_idle`, returning
    /// the evicted symbols. Callers drive this from a periodic sweeper task; a
    /// swept symbol's fingerprint dictionary is simply recreated empty on its
    /// next event.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<Symbol> {
        self.states.sweep_idle(max_idle)
    }
}

impl EventObserver for DuplicateDetector {
    fn on_event(&self, event: &MarketEvent) {
        if let DuplicateVerdict::Duplicate { alert } = self.check(event) {
            if alert {
                tracing::warn!(
                    symbol = %event.symbol,
                    kind = event.payload.kind_str(),
                    "duplicate event detected"
                );
            }
        }
    }
}
