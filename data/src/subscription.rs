//! Subscription tracker.

use parking_lot::Mutex;
use quoteflow_markets::Symbol;
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Which normalized stream a subscription applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Trades,
    Quotes,
    Depth,
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKind::Trades => write!(f, "trades"),
            SubscriptionKind::Quotes => write!(f, "quotes"),
            SubscriptionKind::Depth => write!(f, "depth"),
        }
    }
}

/// Opaque subscription id, generated from a counter starting at 100 000.
pub type SubscriptionId = u64;

const FIRST_SUBSCRIPTION_ID: u64 = 100_000;

/// Depth levels requested when a caller subscribes via [`SubscriptionTracker::subscribe_depth`]
/// without specifying its own, per the §6 `subscribe_depth(symbol, levels=10)` contract.
pub const DEFAULT_DEPTH_LEVELS: u16 = 10;

#[derive(Debug, Default)]
struct Inner {
    by_id: HashMap<SubscriptionId, (Symbol, SubscriptionKind)>,
    trades: HashSet<Symbol>,
    quotes: HashSet<Symbol>,
    depth: HashSet<Symbol>,
    depth_levels: HashMap<Symbol, u16>,
}

impl Inner {
    fn set_for_mut(&mut self, kind: SubscriptionKind) -> &mut HashSet<Symbol> {
        match kind {
            SubscriptionKind::Trades => &mut self.trades,
            SubscriptionKind::Quotes => &mut self.quotes,
            SubscriptionKind::Depth => &mut self.depth,
        }
    }

    fn set_for(&self, kind: SubscriptionKind) -> &HashSet<Symbol> {
        match kind {
            SubscriptionKind::Trades => &self.trades,
            SubscriptionKind::Quotes => &self.quotes,
            SubscriptionKind::Depth => &self.depth,
        }
    }
}

/// Owned, point-in-time copy of the three per-kind subscribed-symbol sets.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubscriptionSnapshot {
    pub trades: HashSet<Symbol>,
    pub quotes: HashSet<Symbol>,
    pub depth: HashSet<Symbol>,
}

/// Thread-safe registry mapping `subscription_id -> (symbol, kind)`, with one
/// coarse lock guarding all mutation. Total operations — there is no failure
/// mode, only empty results.
#[derive(Debug)]
pub struct SubscriptionTracker {
    next_id: AtomicU64,
    inner: Mutex<Inner>,
    /// When `false`, [`Self::should_process`] always returns `true` regardless of
    /// subscription state — i.e. every symbol is processed implicitly.
    require_explicit_subscription: bool,
}

impl Default for SubscriptionTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SubscriptionTracker {
    pub fn new(require_explicit_subscription: bool) -> Self {
        Self {
            next_id: AtomicU64::new(FIRST_SUBSCRIPTION_ID),
            inner: Mutex::new(Inner::default()),
            require_explicit_subscription,
        }
    }

    /// Register a subscription, returning its unique id.
    pub fn add(&self, symbol: Symbol, kind: SubscriptionKind) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.lock();
        guard.set_for_mut(kind).insert(symbol.clone());
        guard.by_id.insert(id, (symbol, kind));
        id
    }

    /// Remove a subscription. The symbol is dropped from its kind's set only if no
    /// other subscription on the same `(symbol, kind)` remains.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut guard = self.inner.lock();
        let Some((symbol, kind)) = guard.by_id.remove(&id) else {
            return false;
        };

        let still_referenced = guard
            .by_id
            .values()
            .any(|(s, k)| *k == kind && *s == symbol);

        if !still_referenced {
            guard.set_for_mut(kind).remove(&symbol);
            if kind == SubscriptionKind::Depth {
                guard.depth_levels.remove(&symbol);
            }
        }
        true
    }

    /// True iff `symbol` is subscribed for `kind`, or explicit subscription is
    /// disabled (in which case every symbol is processed).
    pub fn should_process(&self, symbol: &Symbol, kind: SubscriptionKind) -> bool {
        if !self.require_explicit_subscription {
            return true;
        }
        self.inner.lock().set_for(kind).contains(symbol)
    }

    /// Owned copy of the three subscribed-symbol sets, for diagnostics/tests.
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        let guard = self.inner.lock();
        SubscriptionSnapshot {
            trades: guard.trades.clone(),
            quotes: guard.quotes.clone(),
            depth: guard.depth.clone(),
        }
    }

    /// Subscribe to the normalized trade stream for `symbol`.
    pub fn subscribe_trades(&self, symbol: Symbol) -> SubscriptionId {
        self.add(symbol, SubscriptionKind::Trades)
    }

    /// Subscribe to the normalized top-of-book quote stream for `symbol`.
    pub fn subscribe_quotes(&self, symbol: Symbol) -> SubscriptionId {
        self.add(symbol, SubscriptionKind::Quotes)
    }

    /// Subscribe to the L2 depth stream for `symbol`, requesting `levels`
    /// price levels per side from the upstream venue (default 10).
    pub fn subscribe_depth(&self, symbol: Symbol, levels: u16) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.lock();
        guard.depth.insert(symbol.clone());
        guard.depth_levels.insert(symbol.clone(), levels);
        guard.by_id.insert(id, (symbol, SubscriptionKind::Depth));
        id
    }

    /// Requested depth level count for `symbol`, or [`DEFAULT_DEPTH_LEVELS`] if
    /// it was never subscribed via [`Self::subscribe_depth`] with an explicit
    /// value.
    pub fn depth_levels(&self, symbol: &Symbol) -> u16 {
        self.inner
            .lock()
            .depth_levels
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_DEPTH_LEVELS)
    }

    /// Cancel a subscription by id, regardless of which `subscribe_*` call
    /// created it. Unknown ids are a no-op, not an error.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
