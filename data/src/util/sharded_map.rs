use dashmap::DashMap;
use fnv::FnvBuildHasher;
use parking_lot::Mutex;
use quoteflow_markets::Symbol;
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Per-symbol state, lazily created on first touch, protected by its own mutex so
/// cross-symbol parallelism is unbounded while per-symbol mutation is strictly
/// serialized — the "single-writer / many-reader" discipline this kernel relies on
/// for every collector's state.
///
/// Backed by [`DashMap`] (sharded, lock-per-bucket) rather than one coarse lock, so
/// reads and insertions for unrelated symbols never contend.
#[derive(Debug)]
pub struct SymbolMap<V> {
    inner: DashMap<Symbol, Entry<V>, FnvBuildHasher>,
}

#[derive(Debug)]
struct Entry<V> {
    state: Arc<Mutex<V>>,
    last_active_unix_ms: Arc<AtomicI64>,
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl<V: Default> Default for SymbolMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Default> SymbolMap<V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::with_hasher(FnvBuildHasher::default()),
        }
    }

    /// Get the existing per-symbol state, or insert a `V::default()` and return that.
    /// Idempotent: concurrent callers racing on the same new symbol all observe the
    /// same created `Arc<Mutex<V>>`.
    pub fn get_or_create(&self, symbol: &Symbol) -> Arc<Mutex<V>> {
        let entry = self
            .inner
            .entry(symbol.clone())
            .or_insert_with(|| Entry {
                state: Arc::new(Mutex::new(V::default())),
                last_active_unix_ms: Arc::new(AtomicI64::new(now_unix_ms())),
            });
        entry.last_active_unix_ms.store(now_unix_ms(), Ordering::Relaxed);
        Arc::clone(&entry.state)
    }

    /// Only present if subscription/lifecycle has already created state for `symbol`.
    pub fn get(&self, symbol: &Symbol) -> Option<Arc<Mutex<V>>> {
        self.inner.get(symbol).map(|e| {
            e.last_active_unix_ms.store(now_unix_ms(), Ordering::Relaxed);
            Arc::clone(&e.state)
        })
    }

    pub fn remove(&self, symbol: &Symbol) -> bool {
        self.inner.remove(symbol).is_some()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.inner.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of every currently-tracked symbol and its state handle. Used by
    /// aggregation passes (e.g. the integrity-alerts summary rollup) that need to
    /// look across all symbols; never held while mutating an individual symbol's
    /// state.
    pub fn snapshot_entries(&self) -> Vec<(Symbol, Arc<Mutex<V>>)> {
        self.inner
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.state)))
            .collect()
    }

    /// Remove and return every symbol whose state has not been touched
    /// (`get_or_create`/`get`) for at least `max_idle` — the inactivity sweep that
    /// garbage-collects symbols with no activity for an extended period.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<Symbol> {
        let cutoff = now_unix_ms() - max_idle.as_millis() as i64;
        let stale: Vec<Symbol> = self
            .inner
            .iter()
            .filter(|e| e.last_active_unix_ms.load(Ordering::Relaxed) <= cutoff)
            .map(|e| e.key().clone())
            .collect();

        for symbol in &stale {
            self.inner.remove(symbol);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let map: SymbolMap<u32> = SymbolMap::new();
        let symbol = Symbol::new("AAPL").unwrap();
        let a = map.get_or_create(&symbol);
        let b = map.get_or_create(&symbol);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn get_returns_none_before_creation() {
        let map: SymbolMap<u32> = SymbolMap::new();
        let symbol = Symbol::new("AAPL").unwrap();
        assert!(map.get(&symbol).is_none());
    }

    #[test]
    fn sweep_idle_evicts_only_past_cutoff() {
        let map: SymbolMap<u32> = SymbolMap::new();
        let old = Symbol::new("OLD").unwrap();
        let fresh = Symbol::new("FRESH").unwrap();

        map.get_or_create(&old);
        // Backdate `old`'s last-active timestamp well into the past.
        map.inner
            .get(&old)
            .unwrap()
            .last_active_unix_ms
            .store(0, Ordering::Relaxed);
        map.get_or_create(&fresh);

        let swept = map.sweep_idle(Duration::from_secs(1));
        assert_eq!(swept, vec![old]);
        assert!(!map.contains(&Symbol::new("OLD").unwrap()));
        assert!(map.contains(&Symbol::new("FRESH").unwrap()));
    }
}
