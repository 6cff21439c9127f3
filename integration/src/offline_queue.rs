//! OfflineEventQueue (component C10): a bounded in-memory buffer backed by a
//! durable JSON-Lines spill directory, so a connection outage never loses
//! events and never blocks the hot path.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quoteflow_data::{event::EventPayload, MarketEvent};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::warn;
use uuid::Uuid;

use crate::error::IntegrationError;

fn estimated_bytes(payload: &EventPayload) -> usize {
    match payload {
        EventPayload::Trade(_) => 200,
        EventPayload::BboQuote(_) => 250,
        EventPayload::L2Snapshot(_) => 1000,
        EventPayload::OrderFlow(_) => 500,
        EventPayload::Integrity(_) | EventPayload::DepthIntegrity(_) => 300,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfflineQueueConfig {
    pub max_memory_queue_size: usize,
    pub max_buffer_size_bytes: u64,
    pub flush_batch_size: usize,
    pub preserve_order: bool,
    pub spill_dir: PathBuf,
}

impl OfflineQueueConfig {
    pub fn new(spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_memory_queue_size: 100_000,
            max_buffer_size_bytes: 1024 * 1024 * 1024,
            flush_batch_size: 10_000,
            preserve_order: true,
            spill_dir: spill_dir.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpillRecord {
    event_id: Uuid,
    queued_at: DateTime<Utc>,
    estimated_bytes: usize,
    event: MarketEvent,
}

#[derive(Debug)]
struct QueuedEvent {
    event: MarketEvent,
    estimated_bytes: usize,
}

#[derive(Debug, Default)]
struct MemoryBuffer {
    events: VecDeque<QueuedEvent>,
    bytes: u64,
}

/// Bounded in-memory buffer for `MarketEvent`s awaiting a flush, with
/// overflow to a durable spill directory while the downstream sink is
/// unreachable.
#[derive(Debug)]
pub struct OfflineEventQueue {
    config: OfflineQueueConfig,
    buffer: Mutex<MemoryBuffer>,
    dropped: AtomicU64,
    clock_drift: Mutex<ClockDriftTracker>,
}

#[derive(Debug, Default)]
struct ClockDriftTracker {
    samples: VecDeque<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockDriftEvent {
    pub provider: String,
    pub drift_ms: i64,
    pub severity: DriftSeverity,
}

impl OfflineEventQueue {
    pub fn new(config: OfflineQueueConfig) -> Self {
        Self {
            config,
            buffer: Mutex::new(MemoryBuffer::default()),
            dropped: AtomicU64::new(0),
            clock_drift: Mutex::new(ClockDriftTracker::default()),
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking enqueue. Returns `false` (and increments `dropped`) if
    /// this event alone would exceed `max_buffer_size_bytes`; otherwise
    /// always succeeds, evicting the oldest queued event first if the queue
    /// is at `max_memory_queue_size` or the byte budget would be exceeded.
    pub fn try_enqueue(&self, event: MarketEvent) -> bool {
        let size = estimated_bytes(&event.payload);
        if size as u64 > self.config.max_buffer_size_bytes {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut buffer = self.buffer.lock();
        while buffer.events.len() >= self.config.max_memory_queue_size
            || buffer.bytes + size as u64 > self.config.max_buffer_size_bytes
        {
            let Some(evicted) = buffer.events.pop_front() else {
                break;
            };
            buffer.bytes -= evicted.estimated_bytes as u64;
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        buffer.bytes += size as u64;
        buffer.events.push_back(QueuedEvent {
            event,
            estimated_bytes: size,
        });
        true
    }

    /// Drains the in-memory buffer into a new spill file under `spill_dir`,
    /// named `queue_{yyyyMMdd_HHmmss}_{uuid}.pending.json`.
    pub async fn go_offline(&self) -> Result<Option<PathBuf>, IntegrationError> {
        let drained: Vec<QueuedEvent> = {
            let mut buffer = self.buffer.lock();
            buffer.bytes = 0;
            buffer.events.drain(..).collect()
        };
        if drained.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(&self.config.spill_dir).await?;
        let filename = format!(
            "queue_{}_{}.pending.json",
            Utc::now().format("%Y%m%d_%H%M%S"),
            Uuid::new_v4()
        );
        let path = self.config.spill_dir.join(filename);
        let mut file = fs::File::create(&path).await?;

        for queued in drained {
            let record = SpillRecord {
                event_id: Uuid::new_v4(),
                queued_at: Utc::now(),
                estimated_bytes: queued.estimated_bytes,
                event: queued.event,
            };
            let line = serde_json::to_string(&record)
                .map_err(|e| IntegrationError::SpillDecode(e.to_string()))?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;

        Ok(Some(path))
    }

    /// Reads every `*.pending.json` file in the spill directory in filename
    /// order, optionally merges with the current in-memory buffer and
    /// re-sorts by event timestamp (`preserve_order`), then hands batches of
    /// up to `flush_batch_size` to `flush`. A batch that `flush` fails is
    /// re-enqueued in memory rather than dropped. Successfully flushed spill
    /// files are renamed to `.recovered.json`. Lines that fail to parse are
    /// skipped and counted.
    pub async fn come_online<F, Fut>(&self, mut flush: F) -> Result<usize, IntegrationError>
    where
        F: FnMut(Vec<MarketEvent>) -> Fut,
        Fut: std::future::Future<Output = usize>,
    {
        let mut spill_paths = self.list_spill_files("pending.json").await?;
        spill_paths.sort();

        let mut pending: Vec<MarketEvent> = Vec::new();
        let mut skipped = 0u64;

        for path in &spill_paths {
            let (events, bad_lines) = self.read_spill_file(path).await?;
            skipped += bad_lines;
            pending.extend(events);
        }

        if skipped > 0 {
            warn!(skipped, "skipped undecodable spill records while coming online");
        }

        if self.config.preserve_order {
            let in_memory: Vec<MarketEvent> = {
                let mut buffer = self.buffer.lock();
                buffer.bytes = 0;
                buffer.events.drain(..).map(|q| q.event).collect()
            };
            pending.extend(in_memory);
            pending.sort_by_key(|e| e.timestamp_utc);
        }

        let mut flushed_total = 0usize;
        for batch in pending.chunks(self.config.flush_batch_size) {
            let batch_vec = batch.to_vec();
            let written = flush(batch_vec.clone()).await;
            flushed_total += written;
            if written < batch_vec.len() {
                for event in batch_vec.into_iter().skip(written) {
                    self.try_enqueue(event);
                }
            }
        }

        for path in spill_paths {
            let recovered = path.with_extension("").with_extension("recovered.json");
            let _ = fs::rename(&path, recovered).await;
        }

        Ok(flushed_total)
    }

    /// Startup recovery: loads every `*.pending.json` spill file back into
    /// the in-memory buffer and renames it `.recovered.json`.
    pub async fn recover(&self) -> Result<usize, IntegrationError> {
        let spill_paths = self.list_spill_files("pending.json").await?;
        let mut recovered_count = 0usize;

        for path in spill_paths {
            let (events, _bad_lines) = self.read_spill_file(&path).await?;
            recovered_count += events.len();
            for event in events {
                self.try_enqueue(event);
            }
            let recovered = path.with_extension("").with_extension("recovered.json");
            let _ = fs::rename(&path, recovered).await;
        }

        Ok(recovered_count)
    }

    async fn list_spill_files(&self, suffix: &str) -> Result<Vec<PathBuf>, IntegrationError> {
        let mut out = Vec::new();
        let Ok(mut entries) = fs::read_dir(&self.config.spill_dir).await else {
            return Ok(out);
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.to_string_lossy().ends_with(suffix) {
                out.push(path);
            }
        }
        Ok(out)
    }

    async fn read_spill_file(&self, path: &Path) -> Result<(Vec<MarketEvent>, u64), IntegrationError> {
        let file = fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut bad_lines = 0u64;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SpillRecord>(&line) {
                Ok(record) => events.push(record.event),
                Err(_) => bad_lines += 1,
            }
        }
        Ok((events, bad_lines))
    }

    /// Records a clock-sync sample (`server_time - local_now`), tracking a
    /// rolling history of the last 100 samples. Emits a [`ClockDriftEvent`]
    /// when the absolute drift exceeds `tolerance` (severity `Critical` above
    /// `2 * tolerance`).
    pub fn record_clock_sync(
        &self,
        provider: impl Into<String>,
        server_time: DateTime<Utc>,
        tolerance_ms: i64,
    ) -> Option<ClockDriftEvent> {
        let drift_ms = server_time.signed_duration_since(Utc::now()).num_milliseconds();

        let mut tracker = self.clock_drift.lock();
        tracker.samples.push_back(drift_ms);
        if tracker.samples.len() > 100 {
            tracker.samples.pop_front();
        }

        if drift_ms.abs() > tolerance_ms {
            let severity = if drift_ms.abs() > tolerance_ms * 2 {
                DriftSeverity::Critical
            } else {
                DriftSeverity::Warning
            };
            Some(ClockDriftEvent {
                provider: provider.into(),
                drift_ms,
                severity,
            })
        } else {
            None
        }
    }
}
