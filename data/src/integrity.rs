//! IntegrityAlertsService: windowed aggregation,
//! severity escalation and alert rate-limiting over the Integrity/DepthIntegrity
//! event stream.

use crate::{
    event::{DepthIntegrityKind, EventPayload, MarketEvent, Severity},
    router::EventObserver,
    util::sharded_map::SymbolMap,
};
use quoteflow_markets::Symbol;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct IntegrityAlertsConfig {
    pub critical_error_threshold: u32,
    pub critical_consecutive: u32,
    pub high_error_threshold: u32,
    pub min_alert_interval_seconds: u64,
    pub max_recent_alerts: usize,
    pub window: Duration,
    pub max_window_entries_per_symbol: usize,
    pub aggregation_tick: Duration,
}

impl Default for IntegrityAlertsConfig {
    fn default() -> Self {
        Self {
            critical_error_threshold: 10,
            critical_consecutive: 5,
            high_error_threshold: 3,
            min_alert_interval_seconds: 30,
            max_recent_alerts: 100,
            window: Duration::from_secs(15 * 60),
            max_window_entries_per_symbol: 100,
            aggregation_tick: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum AlertPriority {
    Info,
    Warning,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub symbol: Symbol,
    pub priority: AlertPriority,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegritySummary {
    pub top_symbols: Vec<(Symbol, u64)>,
    pub recent_alerts: Vec<AlertRecord>,
}

#[derive(Debug, Default)]
struct SymbolIntegrityState {
    total_errors: u64,
    total_warnings: u64,
    consecutive_errors: u32,
    /// Timestamps of `Error`-severity incidents only, within `window`. Used
    /// for the High/Critical threshold comparisons in §4.6 — those key on
    /// *error* volume, not on Warnings.
    error_window: VecDeque<Instant>,
    last_alert_at: Option<Instant>,
}

impl SymbolIntegrityState {
    fn incident_count(&self) -> u64 {
        self.total_errors + self.total_warnings
    }
}

fn depth_kind_severity(kind: DepthIntegrityKind) -> Severity {
    match kind {
        DepthIntegrityKind::Unknown => Severity::Info,
        _ => Severity::Error,
    }
}

/// Observes the Integrity/DepthIntegrity stream and aggregates per-symbol state,
/// escalating to [`AlertRecord`]s subject to a per-symbol cooldown and a global
/// retention cap.
#[derive(Debug)]
pub struct IntegrityAlertsService {
    states: SymbolMap<SymbolIntegrityState>,
    recent_alerts: parking_lot::Mutex<VecDeque<AlertRecord>>,
    config: IntegrityAlertsConfig,
    summary_tx: broadcast::Sender<IntegritySummary>,
}

impl IntegrityAlertsService {
    pub fn new(config: IntegrityAlertsConfig) -> Self {
        let (summary_tx, _) = broadcast::channel(16);
        Self {
            states: SymbolMap::new(),
            recent_alerts: parking_lot::Mutex::new(VecDeque::new()),
            config,
            summary_tx,
        }
    }

    pub fn subscribe_summaries(&self) -> broadcast::Receiver<IntegritySummary> {
        self.summary_tx.subscribe()
    }

    fn handle_incident(&self, symbol: &Symbol, severity: Severity, description: String) {
        let state_lock = self.states.get_or_create(symbol);
        let mut state = state_lock.lock();

        let now = Instant::now();
        let cutoff = now - self.config.window;
        state.error_window.retain(|t| *t >= cutoff);

        match severity {
            Severity::Error => {
                state.total_errors += 1;
                state.consecutive_errors += 1;
                if state.error_window.len() >= self.config.max_window_entries_per_symbol {
                    state.error_window.pop_front();
                }
                state.error_window.push_back(now);
            }
            _ => {
                state.total_warnings += 1;
                state.consecutive_errors = 0;
            }
        }

        let recent_errors = state.error_window.len() as u32;
        let priority = if recent_errors >= self.config.critical_error_threshold
            || state.consecutive_errors >= self.config.critical_consecutive
        {
            AlertPriority::Critical
        } else if recent_errors >= self.config.high_error_threshold || severity == Severity::Error {
            AlertPriority::High
        } else if severity == Severity::Warning {
            AlertPriority::Warning
        } else {
            AlertPriority::Info
        };

        if priority == AlertPriority::Info {
            return;
        }

        let cooldown = Duration::from_secs(self.config.min_alert_interval_seconds);
        let suppressed = state
            .last_alert_at
            .is_some_and(|last| now.duration_since(last) < cooldown);
        if suppressed {
            return;
        }
        state.last_alert_at = Some(now);
        drop(state);

        let mut alerts = self.recent_alerts.lock();
        alerts.push_back(AlertRecord {
            symbol: symbol.clone(),
            priority,
            description,
        });
        while alerts.len() > self.config.max_recent_alerts {
            alerts.pop_front();
        }
    }

    /// Top-20-by-incident-count symbols plus the 10 most recent alerts.
    pub fn summary(&self) -> IntegritySummary {
        let mut counts: Vec<(Symbol, u64)> = self
            .states
            .snapshot_entries()
            .into_iter()
            .map(|(symbol, state)| (symbol, state.lock().incident_count()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(20);

        let alerts = self.recent_alerts.lock();
        let recent_alerts = alerts.iter().rev().take(10).cloned().collect::<Vec<_>>();

        IntegritySummary {
            top_symbols: counts,
            recent_alerts,
        }
    }

    /// Runs the periodic aggregation tick until `shutdown` signals `true`,
    /// publishing an [`IntegritySummary`] on every tick to subscribers of
    /// [`Self::subscribe_summaries`].
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.aggregation_tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let _ = self.summary_tx.send(self.summary());
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

impl EventObserver for IntegrityAlertsService {
    fn on_event(&self, event: &MarketEvent) {
        match &event.payload {
            EventPayload::Integrity(p) => {
                self.handle_incident(&event.symbol, p.severity, p.description.clone());
            }
            EventPayload::DepthIntegrity(p) => {
                self.handle_incident(&event.symbol, depth_kind_severity(p.kind), p.description.clone());
            }
            _ => {}
        }
    }
}
