/*!
 * Trend Prediction
 * Least-squares forecaster flagging unusual trajectories
 *
 * Fits a line to each metric's recent window and projects a few steps
 * ahead. When the projection departs far from the window mean, a TREND
 * record is published for downstream consumers.
 */

use super::models::mean_std;
use crate::bus::EventBus;
use crate::core::config::MlConfig;
use crate::core::errors::BusError;
use crate::core::limits::TREND_MIN_SAMPLES;
use crate::core::types::{now_secs, TimestampSecs};
use crate::events::{EventRecord, EventType, Value};
use crate::processor::StreamProcessor;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const SOURCE: &str = "ml::trend_predictor";

const SIGMA_FLOOR: f64 = 1e-9;

/// Ordinary least squares over sample indices. Returns (slope, intercept).
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }
    if var < f64::EPSILON {
        return (0.0, y_mean);
    }
    let slope = cov / var;
    (slope, y_mean - slope * x_mean)
}

pub struct TrendPipeline {
    processor: StreamProcessor,
    bus: EventBus,
    cfg: MlConfig,
    cooldowns: HashMap<String, Instant>,
}

impl TrendPipeline {
    pub fn new(processor: StreamProcessor, bus: EventBus, cfg: MlConfig) -> Self {
        Self {
            processor,
            bus,
            cfg,
            cooldowns: HashMap::new(),
        }
    }

    /// Forecast every eligible metric once, returning records to publish.
    pub fn tick_at(&mut self, mono_now: Instant, wall_now: TimestampSecs) -> Vec<EventRecord> {
        let mut records = Vec::new();
        for key in self.processor.list_metric_keys() {
            let window = self
                .processor
                .window_values(&key, self.cfg.window_seconds, wall_now);
            if window.len() < TREND_MIN_SAMPLES {
                continue;
            }
            if let Some(record) = self.evaluate(&key, &window, mono_now, wall_now) {
                records.push(record);
            }
        }
        records
    }

    fn evaluate(
        &mut self,
        key: &str,
        window: &[f64],
        mono_now: Instant,
        wall_now: TimestampSecs,
    ) -> Option<EventRecord> {
        if let Some(&fired_at) = self.cooldowns.get(key) {
            if mono_now.saturating_duration_since(fired_at)
                < Duration::from_secs_f64(self.cfg.cooldown)
            {
                return None;
            }
        }

        let (mean, std) = mean_std(window);
        if std < SIGMA_FLOOR {
            return None;
        }

        let (slope, intercept) = linear_fit(window);
        let n = window.len();
        let forecast: Vec<f64> = (1..=self.cfg.forecast_steps)
            .map(|step| intercept + slope * (n - 1 + step) as f64)
            .collect();
        let projected = *forecast.last()?;

        let deviation = (projected - mean).abs();
        let bound = self.cfg.trend_sigma * std;
        if deviation <= bound {
            return None;
        }

        self.cooldowns.insert(key.to_string(), mono_now);
        Some(
            EventRecord::new(EventType::Trend, SOURCE)
                .with_timestamp(wall_now)
                .with_field("metric_key", key)
                .with_field("slope", slope)
                .with_field(
                    "forecast",
                    forecast.into_iter().map(Value::Float).collect::<Vec<_>>(),
                )
                .with_field("latest", *window.last().expect("non-empty window"))
                .with_field("window_size", n)
                .with_field(
                    "confidence",
                    (deviation / (2.0 * bound)).min(1.0),
                ),
        )
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("trend pipeline started (interval={}s)", self.cfg.trend_interval);
        let mut interval =
            tokio::time::interval(Duration::from_secs_f64(self.cfg.trend_interval));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            let records = self.tick_at(Instant::now(), now_secs());
            for record in records {
                match self.bus.publish(record) {
                    Ok(()) => {}
                    Err(BusError::Closed) => return,
                    Err(e) => log::warn!("trend record rejected: {}", e),
                }
            }
            tokio::task::yield_now().await;
        }
        log::info!("trend pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::processor::{ProcessResolver, ResolvedProcess};

    struct NoResolver;
    impl ProcessResolver for NoResolver {
        fn resolve(&self, _pid: u32) -> Option<ResolvedProcess> {
            None
        }
    }

    #[test]
    fn test_linear_fit_recovers_line() {
        let values: Vec<f64> = (0..20).map(|i| 3.0 + 2.0 * i as f64).collect();
        let (slope, intercept) = linear_fit(&values);
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_fit_flat() {
        let (slope, intercept) = linear_fit(&[5.0; 10]);
        assert_eq!(slope, 0.0);
        assert!((intercept - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_steep_ramp_fires_once() {
        let config = Config::default();
        let processor = StreamProcessor::with_resolver(&config, Box::new(NoResolver));
        let bus = EventBus::new(64);
        let mut pipeline = TrendPipeline::new(processor.clone(), bus, config.ml.clone());

        let now = now_secs();
        // A steady ramp: the projection runs well past the window mean
        for i in 0..16 {
            processor.ingest(
                EventRecord::new(EventType::CpuMetric, "test")
                    .with_timestamp(now - 16.0 + i as f64)
                    .with_field("percent_total", 10.0 + 5.0 * i as f64),
            );
        }

        let t0 = Instant::now();
        let records = pipeline.tick_at(t0, now);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.event_type, EventType::Trend);
        assert_eq!(record.text("metric_key"), Some("cpu.total"));
        assert!(record.number("slope").unwrap() > 0.0);
        let Some(Value::Array(forecast)) = record.payload.get("forecast") else {
            panic!("forecast missing");
        };
        assert_eq!(forecast.len(), 3);

        // Cooldown suppresses the immediate repeat
        let records = pipeline.tick_at(t0 + Duration::from_secs(1), now);
        assert!(records.is_empty());
    }

    #[test]
    fn test_flat_series_is_quiet() {
        let config = Config::default();
        let processor = StreamProcessor::with_resolver(&config, Box::new(NoResolver));
        let bus = EventBus::new(64);
        let mut pipeline = TrendPipeline::new(processor.clone(), bus, config.ml.clone());

        let now = now_secs();
        for i in 0..30 {
            processor.ingest(
                EventRecord::new(EventType::CpuMetric, "test")
                    .with_timestamp(now - 30.0 + i as f64)
                    .with_field("percent_total", 10.0),
            );
        }
        assert!(pipeline.tick_at(Instant::now(), now).is_empty());
    }
}
