/// Fixed-capacity, overwrite-oldest circular buffer shared by every per-symbol
/// ring (recent trades, recent depth-integrity events).
pub mod ring;

/// Sharded, get-or-create concurrent map from [`quoteflow_markets::Symbol`] to per-symbol
/// state, plus an inactivity sweeper.
pub mod sharded_map;
