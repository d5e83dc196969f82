/*!
 * Anomaly Detection Pipeline
 * Periodic multi-model scoring with cooldowns and confidence fusion
 *
 * Every tick, each tracked metric with enough samples is scored by the
 * ensemble. Per-(metric, method) cooldowns suppress chatter during
 * sustained anomalies; the ensemble verdict carries its own cooldown.
 */

use super::models::{
    mean_std, AnomalyModel, Capability, IsolationModel, OneClassModel, ReconstructionModel,
    ZScoreModel,
};
use crate::bus::EventBus;
use crate::core::config::MlConfig;
use crate::core::errors::BusError;
use crate::core::limits::MODEL_FAILURE_DISABLE_LIMIT;
use crate::core::types::{now_secs, TimestampSecs};
use crate::events::{EventRecord, EventType, Value};
use crate::processor::StreamProcessor;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const SOURCE: &str = "ml::anomaly_detector";

/// Ensemble verdicts use this method name in emitted records
const ENSEMBLE_METHOD: &str = "ensemble";

/// Tracking state of a metric key. Keys never seen are untracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Samples exist but fewer than `min_samples`
    Tracking,
    /// Eligible for evaluation
    Armed,
    /// At least one method cooldown is active
    Cooldown,
}

struct ModelSlot {
    model: Box<dyn AnomalyModel>,
    consecutive_failures: u32,
    disabled: bool,
}

struct MetricState {
    state: TrackState,
    slots: Vec<ModelSlot>,
    /// method name -> moment it last fired
    cooldowns: HashMap<&'static str, Instant>,
}

impl MetricState {
    fn new(cfg: &MlConfig) -> Self {
        let mut slots: Vec<ModelSlot> = Vec::with_capacity(4);
        let mut push = |model: Box<dyn AnomalyModel>| {
            slots.push(ModelSlot {
                model,
                consecutive_failures: 0,
                disabled: false,
            })
        };
        // Z-score is mandatory, the rest are optional collaborators
        push(Box::new(ZScoreModel::new(cfg.z_threshold)));
        push(Box::new(IsolationModel::new(
            cfg.train_window,
            cfg.retrain_delta as u64,
        )));
        push(Box::new(OneClassModel::new(
            cfg.train_window,
            cfg.retrain_delta as u64,
        )));
        if cfg.enable_reconstruction {
            push(Box::new(ReconstructionModel::new(
                cfg.train_window,
                cfg.retrain_delta as u64,
            )));
        }
        Self {
            state: TrackState::Tracking,
            slots,
            cooldowns: HashMap::new(),
        }
    }

    fn in_cooldown(&self, method: &str, now: Instant, cooldown: f64) -> bool {
        self.cooldowns.get(method).is_some_and(|&fired_at| {
            now.saturating_duration_since(fired_at) < Duration::from_secs_f64(cooldown)
        })
    }

    fn any_cooldown_active(&self, now: Instant, cooldown: f64) -> bool {
        self.cooldowns.keys().any(|m| self.in_cooldown(m, now, cooldown))
    }
}

/// One model's contribution in a tick
struct ModelOutcome {
    method: &'static str,
    fired: bool,
    score: f64,
}

pub struct DetectionPipeline {
    processor: StreamProcessor,
    bus: EventBus,
    cfg: MlConfig,
    metrics: HashMap<String, MetricState>,
}

impl DetectionPipeline {
    pub fn new(processor: StreamProcessor, bus: EventBus, cfg: MlConfig) -> Self {
        Self {
            processor,
            bus,
            cfg,
            metrics: HashMap::new(),
        }
    }

    /// Tracking state for a key; `None` means untracked.
    pub fn track_state(&self, key: &str) -> Option<TrackState> {
        self.metrics.get(key).map(|m| m.state)
    }

    /// Evaluate every eligible metric once. Returns the anomaly records
    /// to publish; the async loop emits them and yields between keys.
    pub fn tick_at(&mut self, mono_now: Instant, wall_now: TimestampSecs) -> Vec<EventRecord> {
        let mut out = Vec::new();
        for key in self.processor.list_metric_keys() {
            out.extend(self.evaluate_key(&key, mono_now, wall_now));
        }
        out
    }

    /// Evaluate one metric key.
    pub fn evaluate_key(
        &mut self,
        key: &str,
        mono_now: Instant,
        wall_now: TimestampSecs,
    ) -> Vec<EventRecord> {
        let buffered = self.processor.series_len(key);
        if buffered == 0 {
            return Vec::new();
        }

        let cfg_min = self.cfg.min_samples;
        let state = self
            .metrics
            .entry(key.to_string())
            .or_insert_with(|| MetricState::new(&self.cfg));

        if buffered < cfg_min {
            state.state = TrackState::Tracking;
            return Vec::new();
        }

        let window = self
            .processor
            .window_values(key, self.cfg.window_seconds, wall_now);
        let Some(&latest) = window.last() else {
            return Vec::new();
        };
        let total_appended = self.processor.series_appended(key);

        // Context shared by every emitted record
        let (mean, std_dev) = mean_std(&window);
        let z = ZScoreModel::z_score(&window, latest);

        let cfg = self.cfg.clone();
        let state = self.metrics.get_mut(key).expect("state inserted above");
        let outcomes = run_models(state, &window, total_appended, key);

        let mut records = Vec::new();

        // Per-model emissions, cooldown gated
        for outcome in outcomes.iter().filter(|o| o.fired) {
            if state.in_cooldown(outcome.method, mono_now, cfg.cooldown) {
                continue;
            }
            state.cooldowns.insert(outcome.method, mono_now);
            records.push(anomaly_record(
                key,
                outcome.method,
                outcome.score,
                latest,
                window.len(),
                mean,
                std_dev,
                z,
                wall_now,
                None,
            ));
        }

        // Ensemble fusion over every model that ran this tick
        if !outcomes.is_empty() {
            let voters = outcomes.iter().filter(|o| o.fired).count();
            let fused =
                outcomes.iter().map(|o| o.score).sum::<f64>() / outcomes.len() as f64;
            let fires = voters >= cfg.min_voters || fused > cfg.ensemble_threshold;

            if fires && !state.in_cooldown(ENSEMBLE_METHOD, mono_now, cfg.cooldown) {
                state.cooldowns.insert(ENSEMBLE_METHOD, mono_now);
                records.push(anomaly_record(
                    key,
                    ENSEMBLE_METHOD,
                    fused,
                    latest,
                    window.len(),
                    mean,
                    std_dev,
                    z,
                    wall_now,
                    Some(outcomes.as_slice()),
                ));
            }
        }

        state.state = if state.any_cooldown_active(mono_now, cfg.cooldown) {
            TrackState::Cooldown
        } else {
            TrackState::Armed
        };

        records
    }

    /// Tick loop. A tick interrupted by shutdown is abandoned whole; no
    /// partial emission.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "anomaly pipeline started (interval={}s, min_samples={})",
            self.cfg.detection_interval,
            self.cfg.min_samples
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs_f64(self.cfg.detection_interval));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of tokio intervals completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }

            let mono_now = Instant::now();
            let wall_now = now_secs();
            let mut records = Vec::new();
            for key in self.processor.list_metric_keys() {
                records.extend(self.evaluate_key(&key, mono_now, wall_now));
                // Hold the loop for one metric at most
                tokio::task::yield_now().await;
            }

            if *shutdown.borrow() {
                break; // abandon the tick, emit nothing
            }
            for record in records {
                match self.bus.publish(record) {
                    Ok(()) => {}
                    Err(BusError::Closed) => {
                        log::info!("bus closed, anomaly pipeline exiting");
                        return;
                    }
                    Err(e) => log::warn!("anomaly record rejected: {}", e),
                }
            }
        }
        log::info!("anomaly pipeline stopped");
    }
}

/// Fit and score every usable model; failures disable for the tick and
/// eventually permanently.
fn run_models(
    state: &mut MetricState,
    window: &[f64],
    total_appended: u64,
    key: &str,
) -> Vec<ModelOutcome> {
    let mut outcomes = Vec::with_capacity(state.slots.len());

    for slot in &mut state.slots {
        if slot.disabled {
            continue;
        }
        if slot.model.capability() == Capability::Absent {
            // Absent forever, skip without logging each tick
            slot.disabled = true;
            continue;
        }

        if slot.model.wants_fit(total_appended) {
            if let Err(e) = slot.model.fit(window, total_appended) {
                slot.consecutive_failures += 1;
                log::warn!("model {} fit failed on {}: {}", slot.model.method(), key, e);
                if slot.consecutive_failures >= MODEL_FAILURE_DISABLE_LIMIT {
                    log::warn!("model {} disabled for {}", slot.model.method(), key);
                    slot.disabled = true;
                }
                continue;
            }
        }
        if !slot.model.ready() {
            continue;
        }

        match slot.model.score(window) {
            Ok(verdict) => {
                slot.consecutive_failures = 0;
                outcomes.push(ModelOutcome {
                    method: slot.model.method(),
                    fired: verdict.fired,
                    score: verdict.score,
                });
            }
            Err(e) => {
                slot.consecutive_failures += 1;
                log::warn!(
                    "model {} predict failed on {}: {}",
                    slot.model.method(),
                    key,
                    e
                );
                if slot.consecutive_failures >= MODEL_FAILURE_DISABLE_LIMIT {
                    log::warn!("model {} disabled for {}", slot.model.method(), key);
                    slot.disabled = true;
                }
            }
        }
    }
    outcomes
}

#[allow(clippy::too_many_arguments)]
fn anomaly_record(
    key: &str,
    method: &str,
    confidence: f64,
    value: f64,
    window_size: usize,
    mean: f64,
    std_dev: f64,
    z_score: f64,
    wall_now: TimestampSecs,
    contributing: Option<&[ModelOutcome]>,
) -> EventRecord {
    let mut record = EventRecord::new(EventType::Anomaly, SOURCE)
        .with_timestamp(wall_now)
        .with_field("metric_key", key)
        .with_field("value", value)
        .with_field("window_size", window_size)
        .with_field("mean", mean)
        .with_field("std_dev", std_dev)
        .with_field("z_score", z_score)
        .with_field("method", method)
        .with_field("confidence", confidence.clamp(0.0, 1.0));

    if let Some(outcomes) = contributing {
        let methods: Vec<Value> = outcomes
            .iter()
            .map(|o| {
                let mut entry = HashMap::new();
                entry.insert("method".to_string(), Value::Str(o.method.to_string()));
                entry.insert("score".to_string(), Value::Float(o.score));
                Value::Map(entry)
            })
            .collect();
        record = record.with_field("contributing_methods", methods);
    }
    record
}
