/// DuplicateDetector (C8a): per-symbol, per-kind fingerprint dictionary with
/// bounded retention.
pub mod duplicate;

/// SpreadMonitor (C8b): running spread statistics and wide-spread alerting.
pub mod spread;

pub use duplicate::{DuplicateDetector, DuplicateDetectorConfig};
pub use spread::{SpreadMonitor, SpreadMonitorConfig};
