/*!
 * Query Read Layer
 * Typed in-process snapshots for external read surfaces
 *
 * Transport is the caller's problem; everything returned here is
 * serde-serializable and copied out of the live structures.
 */

use crate::bus::{BusMetrics, EventBus};
use crate::core::types::TimestampSecs;
use crate::events::{EventRecord, EventType, Value};
use crate::processor::{ProcessorStats, SeriesStats, StreamProcessor};
use serde::Serialize;
use std::collections::HashMap;

/// Per-key statistics for every tracked metric
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeSnapshot {
    pub metrics: HashMap<String, SeriesStats>,
}

/// One point of a metric's history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    pub timestamp: TimestampSecs,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

/// Bus and processor counters in one response
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub bus: BusMetrics,
    pub processor: ProcessorStats,
}

/// Read-side facade over the processor and the bus.
#[derive(Clone)]
pub struct QueryService {
    processor: StreamProcessor,
    bus: EventBus,
}

impl QueryService {
    pub fn new(processor: StreamProcessor, bus: EventBus) -> Self {
        Self { processor, bus }
    }

    /// Statistics for every tracked key
    pub fn realtime(&self) -> RealtimeSnapshot {
        let metrics = self
            .processor
            .list_metric_keys()
            .into_iter()
            .filter_map(|key| {
                let stats = self.processor.metric_stats(&key)?;
                Some((key, stats))
            })
            .collect();
        RealtimeSnapshot { metrics }
    }

    /// Windowed history for one key, oldest first
    pub fn history(&self, metric_key: &str, window_seconds: f64) -> Vec<HistoryPoint> {
        self.processor
            .history_window(metric_key, window_seconds)
            .into_iter()
            .map(|sample| HistoryPoint {
                timestamp: sample.timestamp,
                value: sample.value,
                metadata: sample.metadata,
            })
            .collect()
    }

    /// Recent anomaly records, newest first
    pub fn anomalies(&self, limit: usize) -> Vec<EventRecord> {
        self.processor.recent_events(Some(EventType::Anomaly), limit)
    }

    /// Bus metrics plus processor counters
    pub fn stats(&self) -> PlatformStats {
        PlatformStats {
            bus: self.bus.metrics(),
            processor: self.processor.stats(),
        }
    }
}
