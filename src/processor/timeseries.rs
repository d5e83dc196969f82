/*!
 * Time-Series Buffer
 * Fixed-capacity sample ring per metric key
 *
 * Appends are expected in roughly increasing timestamp order, but a late
 * sample is accepted as-is; the buffer is allowed to be slightly out of
 * order. Queries filter by timestamp and treat contents as a set.
 */

use crate::core::types::TimestampSecs;
use crate::events::Value;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// One sample point
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: TimestampSecs,
    pub value: f64,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Statistical summary over the whole buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub latest: Option<f64>,
}

/// Circular buffer of samples, oldest evicted on overflow.
#[derive(Debug)]
pub struct TimeSeriesBuffer {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl TimeSeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1).min(1024)),
        }
    }

    pub fn append(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples with `now - window_seconds <= timestamp <= now`
    pub fn window(&self, now: TimestampSecs, window_seconds: f64) -> Vec<(TimestampSecs, f64)> {
        let cutoff = now - window_seconds;
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff && s.timestamp <= now)
            .map(|s| (s.timestamp, s.value))
            .collect()
    }

    /// Values only, same filtering as `window`
    pub fn window_values(&self, now: TimestampSecs, window_seconds: f64) -> Vec<f64> {
        let cutoff = now - window_seconds;
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff && s.timestamp <= now)
            .map(|s| s.value)
            .collect()
    }

    /// Windowed samples with metadata, for the history read contract
    pub fn window_samples(&self, now: TimestampSecs, window_seconds: f64) -> Vec<Sample> {
        let cutoff = now - window_seconds;
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff && s.timestamp <= now)
            .cloned()
            .collect()
    }

    /// Single-pass statistics over the whole buffer. No running sums are
    /// kept, which keeps rounding predictable and eviction trivial.
    pub fn stats(&self) -> SeriesStats {
        if self.samples.is_empty() {
            return SeriesStats::default();
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for s in &self.samples {
            min = min.min(s.value);
            max = max.max(s.value);
            sum += s.value;
            sum_sq += s.value * s.value;
        }

        let count = self.samples.len();
        let mean = sum / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            (sum_sq / count as f64 - mean * mean).max(0.0).sqrt()
        };

        SeriesStats {
            count,
            min,
            max,
            mean,
            std_dev,
            latest: self.samples.back().map(|s| s.value),
        }
    }
}
