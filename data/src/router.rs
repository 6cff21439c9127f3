//! Router: dispatches adapter callbacks to the right
//! per-symbol collector, then fans the resulting events out to the downstream
//! publisher channel and to the passive anomaly observers (IntegrityAlertsService,
//! DuplicateDetector, SpreadMonitor) running in parallel over the same stream.

use crate::{
    collector::{DepthCollector, QuoteCollector, TradeCollector},
    event::MarketEvent,
    subscription::{SubscriptionKind, SubscriptionTracker},
    wire::{MarketDepthUpdate, MarketQuoteUpdate, MarketTradeUpdate},
};
use parking_lot::RwLock;
use quoteflow_markets::Symbol;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Passive observer over the normalized `MarketEvent` stream. Implemented by
/// `IntegrityAlertsService`, `DuplicateDetector` and `SpreadMonitor`; the router
/// calls every registered observer for every event it emits, in registration
/// order, synchronously (each observer's own per-symbol state is independently
/// locked, so this never serializes across symbols).
pub trait EventObserver: std::fmt::Debug + Send + Sync {
    fn on_event(&self, event: &MarketEvent);
}

/// Dispatches [`MarketTradeUpdate`]/[`MarketQuoteUpdate`]/[`MarketDepthUpdate`]
/// callbacks to the appropriate collector, gated by the [`SubscriptionTracker`].
#[derive(Debug)]
pub struct Router {
    subscriptions: Arc<SubscriptionTracker>,
    quotes: Arc<QuoteCollector>,
    trades: Arc<TradeCollector>,
    depth: Arc<DepthCollector>,
    publisher: UnboundedSender<MarketEvent>,
    observers: RwLock<Vec<Arc<dyn EventObserver>>>,
}

impl Router {
    pub fn new(
        subscriptions: Arc<SubscriptionTracker>,
        quotes: Arc<QuoteCollector>,
        trades: Arc<TradeCollector>,
        depth: Arc<DepthCollector>,
        publisher: UnboundedSender<MarketEvent>,
    ) -> Self {
        Self {
            subscriptions,
            quotes,
            trades,
            depth,
            publisher,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a passive anomaly observer. Dependency injection at construction
    /// time is preferred; this exists for tests and late-wiring callers.
    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        self.observers.write().push(observer);
    }

    fn publish_all(&self, events: Vec<MarketEvent>) {
        let observers = self.observers.read();
        for event in events {
            for observer in observers.iter() {
                observer.on_event(&event);
            }
            if self.publisher.send(event).is_err() {
                warn!("router publisher channel closed; downstream sink is gone");
            }
        }
    }

    pub fn route_trade(&self, update: MarketTradeUpdate) {
        let Ok(symbol) = Symbol::new(&update.symbol) else {
            // Invalid-symbol detection is the TradeCollector's own first step
            // first step; it cannot be subscription-gated because there is
            // no valid symbol to gate on.
            let bbo = None;
            let events = self.trades.on_trade(&update, bbo);
            self.publish_all(events);
            return;
        };

        if !self.subscriptions.should_process(&symbol, SubscriptionKind::Trades) {
            return;
        }

        let bbo = self.quotes.try_get(&symbol);
        let events = self.trades.on_trade(&update, bbo.as_ref());
        self.publish_all(events);
    }

    pub fn route_quote(&self, update: MarketQuoteUpdate) {
        let Ok(symbol) = Symbol::new(&update.symbol) else {
            warn!(symbol = %update.symbol, "dropping quote update with invalid symbol");
            return;
        };

        if !self.subscriptions.should_process(&symbol, SubscriptionKind::Quotes) {
            return;
        }

        let event = self.quotes.on_quote(&symbol, &update);
        self.publish_all(vec![event]);
    }

    pub fn route_depth(&self, update: MarketDepthUpdate) {
        let Ok(symbol) = Symbol::new(&update.symbol) else {
            warn!(symbol = %update.symbol, "dropping depth update with invalid symbol");
            return;
        };

        if !self.subscriptions.should_process(&symbol, SubscriptionKind::Depth) {
            return;
        }

        let events = self.depth.apply_delta(&symbol, &update);
        self.publish_all(events);
    }
}
