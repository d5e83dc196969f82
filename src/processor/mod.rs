/*!
 * Stream Processor
 * Central metric authority: enrichment, rolling windows, event history
 *
 * Subscribes to everything on the bus, turns metric payloads into named
 * time-series samples, and serves the windowed read contracts the ML
 * pipelines and external read layers consume.
 */

mod cache;
mod extract;
mod timeseries;

pub use cache::{ProcessCache, ProcessInfo, ProcessResolver, ResolvedProcess, SysinfoResolver};
pub use extract::extract_metrics;
pub use timeseries::{Sample, SeriesStats, TimeSeriesBuffer};

use crate::bus::EventBus;
use crate::core::config::Config;
use crate::core::types::{now_secs, TimestampSecs};
use crate::events::{EventRecord, EventType, Value};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

const SUBSCRIBER_ID: &str = "stream_processor";

/// Processor counters for the stats read contract
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorStats {
    pub events_processed: u64,
    pub active_metrics: usize,
    pub process_cache_size: usize,
    pub event_history_size: usize,
}

struct SeriesEntry {
    buffer: TimeSeriesBuffer,
    /// Monotonic append count; unlike buffer length it never caps,
    /// which is what retraining deltas are measured against
    total_appended: u64,
}

struct ProcessorInner {
    series_capacity: usize,
    metrics: DashMap<String, SeriesEntry, RandomState>,
    history: Mutex<VecDeque<EventRecord>>,
    history_capacity: usize,
    cache: Mutex<ProcessCache>,
    resolver: Box<dyn ProcessResolver>,
    events_processed: AtomicU64,
}

/// Cheap to clone; clones share state. The subscriber loop runs on one
/// task, read contracts copy out under short critical sections.
#[derive(Clone)]
pub struct StreamProcessor {
    inner: Arc<ProcessorInner>,
}

impl StreamProcessor {
    pub fn new(config: &Config) -> Self {
        Self::with_resolver(config, Box::new(SysinfoResolver::new()))
    }

    pub fn with_resolver(config: &Config, resolver: Box<dyn ProcessResolver>) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                series_capacity: config.ml.history_window_size,
                metrics: DashMap::with_hasher(RandomState::new()),
                history: Mutex::new(VecDeque::with_capacity(
                    config.processor.event_history_size.min(1024),
                )),
                history_capacity: config.processor.event_history_size,
                cache: Mutex::new(ProcessCache::new(
                    config.processor.cache_capacity,
                    config.processor.cache_ttl,
                )),
                resolver,
                events_processed: AtomicU64::new(0),
            }),
        }
    }

    /// Subscriber loop: consume every event type until shutdown.
    pub async fn run(&self, bus: EventBus, mut shutdown: watch::Receiver<bool>) {
        let subscription = match bus.subscribe(SUBSCRIBER_ID, &[]) {
            Ok(s) => s,
            Err(e) => {
                log::error!("stream processor failed to subscribe: {}", e);
                return;
            }
        };
        log::info!("stream processor started");

        loop {
            tokio::select! {
                record = subscription.recv() => {
                    match record {
                        Some(record) => self.ingest(record),
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        // Drain what already arrived before standing down
        while let Some(record) = subscription.try_recv() {
            self.ingest(record);
        }
        log::info!("stream processor stopped");
    }

    /// Process one record: enrich, extract samples, append, remember.
    pub fn ingest(&self, mut record: EventRecord) {
        self.enrich(&mut record);

        let extracted = extract_metrics(&record);
        if !extracted.is_empty() {
            let metadata = pruned_metadata(&record.payload);
            for (key, value) in extracted {
                let mut entry =
                    self.inner
                        .metrics
                        .entry(key)
                        .or_insert_with(|| SeriesEntry {
                            buffer: TimeSeriesBuffer::new(self.inner.series_capacity),
                            total_appended: 0,
                        });
                entry.buffer.append(Sample {
                    timestamp: record.timestamp,
                    value,
                    metadata: metadata.clone(),
                });
                entry.total_appended += 1;
            }
        }

        let mut history = self.inner.history.lock();
        if history.len() >= self.inner.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
        drop(history);

        self.inner.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Best-effort process context. Never raises; a failed lookup leaves
    /// `resolved=false` in the attached info.
    fn enrich(&self, record: &mut EventRecord) {
        let Some(pid) = record.pid else { return };

        let info = self
            .inner
            .cache
            .lock()
            .lookup(pid, now_secs(), self.inner.resolver.as_ref());

        if record.comm.is_none() && info.resolved {
            record.comm = Some(info.comm.clone());
        }
        let mut map = HashMap::new();
        map.insert("comm".to_string(), Value::Str(info.comm));
        map.insert("cmdline".to_string(), Value::Str(info.cmdline));
        map.insert("user".to_string(), Value::Str(info.user));
        map.insert("resolved".to_string(), Value::Bool(info.resolved));
        record.payload.insert("process_info".to_string(), Value::Map(map));
    }

    // -------------------------------------------------------------------------
    // Read contracts
    // -------------------------------------------------------------------------

    /// Samples of `key` within the last `window_seconds`. Unknown keys
    /// return empty; the window clamps at zero.
    pub fn query_metric(&self, key: &str, window_seconds: f64) -> Vec<(TimestampSecs, f64)> {
        self.query_metric_at(key, window_seconds, now_secs())
    }

    /// Deterministic variant of `query_metric` with an explicit `now`.
    pub fn query_metric_at(
        &self,
        key: &str,
        window_seconds: f64,
        now: TimestampSecs,
    ) -> Vec<(TimestampSecs, f64)> {
        let window = window_seconds.max(0.0);
        self.inner
            .metrics
            .get(key)
            .map(|entry| entry.buffer.window(now, window))
            .unwrap_or_default()
    }

    /// Windowed values only, oldest first
    pub fn window_values(&self, key: &str, window_seconds: f64, now: TimestampSecs) -> Vec<f64> {
        self.inner
            .metrics
            .get(key)
            .map(|entry| entry.buffer.window_values(now, window_seconds.max(0.0)))
            .unwrap_or_default()
    }

    /// Windowed samples with metadata, for the history read contract
    pub fn history_window(&self, key: &str, window_seconds: f64) -> Vec<Sample> {
        let now = now_secs();
        self.inner
            .metrics
            .get(key)
            .map(|entry| entry.buffer.window_samples(now, window_seconds.max(0.0)))
            .unwrap_or_default()
    }

    /// Statistics across the entire buffer of `key`
    pub fn metric_stats(&self, key: &str) -> Option<SeriesStats> {
        self.inner.metrics.get(key).map(|entry| entry.buffer.stats())
    }

    pub fn latest_value(&self, key: &str) -> Option<f64> {
        self.inner
            .metrics
            .get(key)
            .and_then(|entry| entry.buffer.latest().map(|s| s.value))
    }

    pub fn list_metric_keys(&self) -> Vec<String> {
        self.inner
            .metrics
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Samples currently buffered for `key`
    pub fn series_len(&self, key: &str) -> usize {
        self.inner
            .metrics
            .get(key)
            .map(|entry| entry.buffer.len())
            .unwrap_or(0)
    }

    /// Samples ever appended to `key`; retraining deltas measure this
    pub fn series_appended(&self, key: &str) -> u64 {
        self.inner
            .metrics
            .get(key)
            .map(|entry| entry.total_appended)
            .unwrap_or(0)
    }

    /// Newest-first slice of the global event history
    pub fn recent_events(&self, filter: Option<EventType>, limit: usize) -> Vec<EventRecord> {
        let history = self.inner.history.lock();
        history
            .iter()
            .rev()
            .filter(|e| filter.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            events_processed: self.inner.events_processed.load(Ordering::Relaxed),
            active_metrics: self.inner.metrics.len(),
            process_cache_size: self.inner.cache.lock().len(),
            event_history_size: self.inner.history.lock().len(),
        }
    }

    /// Times the process table was consulted (test observability)
    pub fn resolver_calls(&self) -> u64 {
        self.inner.cache.lock().resolver_calls()
    }
}

/// Scalar payload fields only; nested maps and arrays are dropped at
/// append time to bound per-sample metadata.
fn pruned_metadata(payload: &HashMap<String, Value>) -> Option<HashMap<String, Value>> {
    let pruned: HashMap<String, Value> = payload
        .iter()
        .filter(|(_, v)| v.is_scalar())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (!pruned.is_empty()).then_some(pruned)
}
