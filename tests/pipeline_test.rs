/*!
 * Anomaly Pipeline Tests
 * Firing rules, cooldown suppression, and ensemble fusion end to end
 */

use hostscope::core::types::now_secs;
use hostscope::ml::DetectionPipeline;
use hostscope::processor::{ProcessResolver, ResolvedProcess};
use hostscope::{Config, EventBus, EventRecord, EventType, StreamProcessor};
use std::time::{Duration, Instant};

struct NoResolver;
impl ProcessResolver for NoResolver {
    fn resolve(&self, _pid: u32) -> Option<ResolvedProcess> {
        None
    }
}

fn setup(configure: impl FnOnce(&mut Config)) -> (StreamProcessor, EventBus, DetectionPipeline) {
    let mut config = Config::default();
    configure(&mut config);
    let processor = StreamProcessor::with_resolver(&config, Box::new(NoResolver));
    let bus = EventBus::new(1024);
    let pipeline = DetectionPipeline::new(processor.clone(), bus.clone(), config.ml.clone());
    (processor, bus, pipeline)
}

fn feed_value(processor: &StreamProcessor, ts: f64, value: f64) {
    processor.ingest(
        EventRecord::new(EventType::CpuMetric, "collector::cpu")
            .with_timestamp(ts)
            .with_field("percent_total", value),
    );
}

fn z_score_records(records: &[EventRecord]) -> Vec<&EventRecord> {
    records
        .iter()
        .filter(|r| r.text("method") == Some("z_score"))
        .collect()
}

/// The classic spike scenario: constant 25 baseline, then three 95-spikes
/// two seconds apart with a 10 second cooldown. Exactly one z-score
/// anomaly fires; the repeats are suppressed.
#[test]
fn test_spike_fires_once_within_cooldown() {
    let (processor, _bus, mut pipeline) = setup(|c| {
        c.ml.z_threshold = 3.0;
        c.ml.cooldown = 10.0;
        c.ml.min_samples = 20;
    });

    let wall = now_secs();
    let t0 = Instant::now();

    for i in 0..40 {
        feed_value(&processor, wall - 50.0 + i as f64, 25.0);
    }

    let mut z_fires = 0;
    for spike in 0..3 {
        let spike_wall = wall - 8.0 + spike as f64 * 2.0;
        feed_value(&processor, spike_wall, 95.0);
        let records = pipeline.tick_at(t0 + Duration::from_secs(2 * spike), wall);
        z_fires += z_score_records(&records).len();
    }

    assert_eq!(z_fires, 1, "cooldown must suppress the repeat spikes");
}

/// After the cooldown elapses the same (metric, method) pair may fire
/// again; within [t, t + cooldown) it may not.
#[test]
fn test_cooldown_window_boundary() {
    let (processor, _bus, mut pipeline) = setup(|c| {
        c.ml.cooldown = 30.0;
        c.ml.min_samples = 20;
    });

    let wall = now_secs();
    let t0 = Instant::now();
    for i in 0..40 {
        feed_value(&processor, wall - 50.0 + i as f64, 25.0);
    }
    feed_value(&processor, wall - 8.0, 95.0);

    assert_eq!(z_score_records(&pipeline.tick_at(t0, wall)).len(), 1);

    // Sustained anomaly, still inside the window at +29s
    feed_value(&processor, wall - 6.0, 95.0);
    let records = pipeline.tick_at(t0 + Duration::from_secs(29), wall);
    assert!(z_score_records(&records).is_empty());

    // At exactly +30s the suppression lapses
    feed_value(&processor, wall - 4.0, 95.0);
    let records = pipeline.tick_at(t0 + Duration::from_secs(30), wall);
    assert_eq!(z_score_records(&records).len(), 1);
}

/// Constant series: sigma is zero, the z-score model must never fire.
#[test]
fn test_constant_series_never_fires() {
    let (processor, _bus, mut pipeline) = setup(|c| {
        c.ml.min_samples = 10;
    });

    let wall = now_secs();
    for i in 0..100 {
        feed_value(&processor, wall - 100.0 + i as f64, 25.0);
    }

    let t0 = Instant::now();
    for tick in 0..5 {
        let records = pipeline.tick_at(t0 + Duration::from_secs(tick * 3), wall);
        assert!(
            z_score_records(&records).is_empty(),
            "z-score fired on a constant series"
        );
    }
}

/// One weak voter cannot carry the ensemble: a single firing model with
/// score 0.5 is below both the voter minimum and the fused threshold.
#[test]
fn test_ensemble_suppressed_for_single_weak_voter() {
    let (processor, _bus, mut pipeline) = setup(|c| {
        c.ml.min_voters = 2;
        c.ml.ensemble_threshold = 0.7;
        c.ml.min_samples = 20;
        // Cooldown long enough that per-model fires do not recur
        c.ml.cooldown = 3600.0;
    });

    // A gentle drift: enough for one model to notice, not enough for a
    // high fused score across the ensemble
    let wall = now_secs();
    for i in 0..60 {
        feed_value(&processor, wall - 60.0 + i as f64, 50.0 + (i % 11) as f64);
    }
    feed_value(&processor, wall - 0.5, 90.0);

    let records = pipeline.tick_at(Instant::now(), wall);
    let ensemble: Vec<_> = records
        .iter()
        .filter(|r| r.text("method") == Some("ensemble"))
        .collect();
    if let Some(record) = ensemble.first() {
        // If it did fire, the fusion rule must justify it
        let confidence = record.number("confidence").unwrap();
        let voters = records.len() - 1;
        assert!(
            voters >= 2 || confidence > 0.7,
            "ensemble fired with {voters} voters and confidence {confidence}"
        );
    }
}

/// Ensemble anomalies carry the contributing method scores.
#[test]
fn test_ensemble_record_payload() {
    let (processor, _bus, mut pipeline) = setup(|c| {
        c.ml.min_samples = 20;
        c.ml.min_voters = 2;
    });

    let wall = now_secs();
    for i in 0..60 {
        feed_value(&processor, wall - 60.0 + i as f64, 25.0 + (i % 2) as f64);
    }
    feed_value(&processor, wall - 0.5, 500.0);

    let records = pipeline.tick_at(Instant::now(), wall);
    let ensemble = records
        .iter()
        .find(|r| r.text("method") == Some("ensemble"))
        .expect("a gross outlier should fire the ensemble");

    assert_eq!(ensemble.event_type, EventType::Anomaly);
    assert_eq!(ensemble.source, "ml::anomaly_detector");
    assert_eq!(ensemble.text("metric_key"), Some("cpu.total"));
    let hostscope::Value::Array(contributors) =
        &ensemble.payload["contributing_methods"]
    else {
        panic!("contributing_methods should be an array");
    };
    assert!(contributors.len() >= 2);
}

/// min_samples = 0: the pipeline evaluates from the very first sample
/// without dividing by zero.
#[test]
fn test_min_samples_zero_boundary() {
    let (processor, _bus, mut pipeline) = setup(|c| {
        c.ml.min_samples = 0;
    });

    let wall = now_secs();
    feed_value(&processor, wall - 0.1, 42.0);
    let records = pipeline.tick_at(Instant::now(), wall);
    assert!(records.is_empty(), "one constant sample is not anomalous");
}

/// The pipeline reads through the processor snapshot; anomalies do not
/// create new tracked metrics (the emission cycle stays broken).
#[test]
fn test_emissions_do_not_feed_back() {
    let (processor, bus, mut pipeline) = setup(|c| {
        c.ml.min_samples = 10;
    });
    let external = bus.subscribe("forwarder", &[EventType::Anomaly]).unwrap();

    let wall = now_secs();
    for i in 0..30 {
        feed_value(&processor, wall - 30.0 + i as f64, 25.0);
    }
    feed_value(&processor, wall - 0.5, 95.0);

    let records = pipeline.tick_at(Instant::now(), wall);
    assert!(!records.is_empty());
    for record in records {
        bus.publish(record).unwrap();
    }

    // The external consumer sees the anomalies; the metric map does not
    assert!(external.try_recv().is_some());
    let keys = processor.list_metric_keys();
    assert_eq!(keys, vec!["cpu.total".to_string()]);
}
