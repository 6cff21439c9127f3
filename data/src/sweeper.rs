//! IdleSweeper: periodic background task that evicts per-symbol state
//! untouched for the configured idle window, across every collector and
//! anomaly observer in the kernel.
//!
//! Mirrors [`crate::integrity::IntegrityAlertsService::run`]'s
//! cancellable-interval-task shape (`tokio::select!` +
//! `watch::Receiver<bool>`) rather than a raw timer callback, per the "model
//! background timers as dedicated, cancellable tasks" guidance this
//! workspace follows throughout.

use crate::{
    anomaly::{DuplicateDetector, SpreadMonitor},
    collector::{DepthCollector, QuoteCollector, TradeCollector},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::debug;

/// Per-symbol collector state (quotes/trades/depth) idle for at least this
/// long is garbage-collected ("no activity for >= 1 hour").
pub const DEFAULT_COLLECTOR_IDLE: Duration = Duration::from_secs(60 * 60);

/// Anomaly-observer (duplicate/spread) per-symbol state idle for at least
/// this long is garbage-collected ("background sweeper that evicts symbols
/// idle > 24h").
pub const DEFAULT_OBSERVER_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleSweeperConfig {
    /// How often a sweep pass runs.
    pub tick: Duration,
    pub collector_idle: Duration,
    pub observer_idle: Duration,
}

impl Default for IdleSweeperConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5 * 60),
            collector_idle: DEFAULT_COLLECTOR_IDLE,
            observer_idle: DEFAULT_OBSERVER_IDLE,
        }
    }
}

/// How many symbols an [`IdleSweeper::sweep_once`] pass evicted from each map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub quotes: usize,
    pub trades: usize,
    pub depth: usize,
    pub duplicates: usize,
    pub spread: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.quotes + self.trades + self.depth + self.duplicates + self.spread
    }
}

/// Drives the inactivity sweep for every per-symbol map in the kernel
/// (§3 lifecycle: "Removal is explicit (unsubscribe) or via inactivity
/// sweep") on a single shared interval.
#[derive(Debug)]
pub struct IdleSweeper {
    quotes: Arc<QuoteCollector>,
    trades: Arc<TradeCollector>,
    depth: Arc<DepthCollector>,
    duplicates: Arc<DuplicateDetector>,
    spread: Arc<SpreadMonitor>,
    config: IdleSweeperConfig,
}

impl IdleSweeper {
    pub fn new(
        quotes: Arc<QuoteCollector>,
        trades: Arc<TradeCollector>,
        depth: Arc<DepthCollector>,
        duplicates: Arc<DuplicateDetector>,
        spread: Arc<SpreadMonitor>,
        config: IdleSweeperConfig,
    ) -> Self {
        Self {
            quotes,
            trades,
            depth,
            duplicates,
            spread,
            config,
        }
    }

    /// Runs one sweep pass immediately, returning how many symbols were
    /// evicted from each map.
    pub fn sweep_once(&self) -> SweepReport {
        SweepReport {
            quotes: self.quotes.sweep_idle(self.config.collector_idle).len(),
            trades: self.trades.sweep_idle(self.config.collector_idle).len(),
            depth: self.depth.sweep_idle(self.config.collector_idle).len(),
            duplicates: self.duplicates.sweep_idle(self.config.observer_idle).len(),
            spread: self.spread.sweep_idle(self.config.observer_idle).len(),
        }
    }

    /// Runs the periodic sweep until `shutdown` signals `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.sweep_once();
                    if report.total() > 0 {
                        debug!(?report, "idle sweep evicted stale per-symbol state");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anomaly::DuplicateDetectorConfig,
        event::TimestampUs,
        wire::MarketQuoteUpdate,
    };
    use quoteflow_markets::Symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn sweep_once_evicts_idle_collector_and_observer_state() {
        let quotes = Arc::new(QuoteCollector::new());
        let trades = Arc::new(TradeCollector::new());
        let depth = Arc::new(DepthCollector::default());
        let duplicates = Arc::new(DuplicateDetector::new(DuplicateDetectorConfig::default()));
        let spread = Arc::new(SpreadMonitor::new(crate::anomaly::SpreadMonitorConfig::default()));

        let symbol = Symbol::new("AAPL").unwrap();
        quotes.on_quote(
            &symbol,
            &MarketQuoteUpdate {
                symbol: "AAPL".into(),
                timestamp_utc: TimestampUs::from_micros(0),
                bid: dec!(100),
                bid_sz: dec!(1),
                ask: dec!(101),
                ask_sz: dec!(1),
                stream_id: None,
                venue: None,
            },
        );

        let sweeper = IdleSweeper::new(
            quotes.clone(),
            trades,
            depth,
            duplicates,
            spread,
            IdleSweeperConfig {
                tick: Duration::from_secs(1),
                collector_idle: Duration::from_secs(0),
                observer_idle: Duration::from_secs(0),
            },
        );

        let report = sweeper.sweep_once();
        assert_eq!(report.quotes, 1);
        assert!(quotes.try_get(&symbol).is_none());
    }

    #[test]
    fn sweep_once_is_a_no_op_when_nothing_is_idle() {
        let sweeper = IdleSweeper::new(
            Arc::new(QuoteCollector::new()),
            Arc::new(TradeCollector::new()),
            Arc::new(DepthCollector::default()),
            Arc::new(DuplicateDetector::new(DuplicateDetectorConfig::default())),
            Arc::new(SpreadMonitor::new(crate::anomaly::SpreadMonitorConfig::default())),
            IdleSweeperConfig::default(),
        );
        assert_eq!(sweeper.sweep_once(), SweepReport::default());
    }
}
