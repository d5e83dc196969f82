/*!
 * Integration Tests
 * Full fabric: producers through the bus, processor loop, detection,
 * and the read layer, on one cooperative runtime
 */

use hostscope::ml::DetectionPipeline;
use hostscope::processor::{ProcessResolver, ResolvedProcess};
use hostscope::{
    Config, EventBus, EventRecord, EventType, QueryService, ReplaySource, StreamProcessor,
    SyscallReader, SyscallRecord,
};
use std::time::{Duration, Instant};
use tokio::sync::watch;

struct StaticResolver;
impl ProcessResolver for StaticResolver {
    fn resolve(&self, pid: u32) -> Option<ResolvedProcess> {
        Some(ResolvedProcess {
            comm: format!("worker{pid}"),
            cmdline: format!("/opt/worker{pid} --serve"),
            user: "app".to_string(),
        })
    }
}

fn syscall_record(pid: u32, nr: u32, latency_ns: u64) -> SyscallRecord {
    let mut comm = [0u8; 16];
    comm[..6].copy_from_slice(b"worker");
    SyscallRecord {
        pid,
        tid: pid,
        syscall_nr: nr,
        ts_enter_ns: 1_000_000,
        ts_exit_ns: 1_000_000 + latency_ns,
        latency_ns,
        ret: 0,
        comm,
    }
}

/// Kernel bytes in, enriched windowed metrics out: reader decodes and
/// publishes, the processor loop consumes, the read layer serves.
#[tokio::test]
async fn test_kernel_to_query_flow() {
    let config = Config::default();
    let bus = EventBus::new(config.bus.buffer_size);
    let processor = StreamProcessor::with_resolver(&config, Box::new(StaticResolver));
    let query = QueryService::new(processor.clone(), bus.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    let processor_task = tokio::spawn({
        let processor = processor.clone();
        let bus = bus.clone();
        let rx = stop_rx.clone();
        async move { processor.run(bus, rx).await }
    });

    let mut source = ReplaySource::new();
    for i in 0..50 {
        source.push_record(&syscall_record(4000, 1, 10_000 + i * 100));
    }
    let reader = SyscallReader::new(bus.clone(), Box::new(source), 0);
    let metrics_handle = reader.metrics_handle();
    let reader_task = tokio::spawn(reader.run(stop_rx.clone()));

    // Give the cooperative tasks a few turns to move the records
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if processor.stats().events_processed >= 50 {
            break;
        }
    }

    assert_eq!(metrics_handle.snapshot().records_published, 50);
    assert_eq!(processor.stats().events_processed, 50);

    // Syscall latency became a tracked metric
    let stats = processor
        .metric_stats("syscall.write.latency_us")
        .expect("latency series exists");
    assert_eq!(stats.count, 50);
    assert!((stats.min - 10.0).abs() < 1e-9);

    // Enrichment attached the resolved process context
    let events = processor.recent_events(Some(EventType::Syscall), 1);
    assert_eq!(events[0].comm.as_deref(), Some("worker"));

    // The read layer sees the same world
    let snapshot = query.realtime();
    assert!(snapshot.metrics.contains_key("syscall.write.latency_us"));
    let platform = query.stats();
    assert_eq!(platform.bus.total_published, 50);
    assert_eq!(platform.bus.total_dropped, 0);

    let _ = stop_tx.send(true);
    bus.close();
    let _ = processor_task.await;
    let _ = reader_task.await;
}

/// Metric events through the bus feed the detector; anomalies come back
/// out on the fabric for an external subscriber, and the emission cycle
/// stays broken.
#[tokio::test]
async fn test_detection_round_trip() {
    let mut config = Config::default();
    config.ml.min_samples = 20;
    config.ml.cooldown = 60.0;

    let bus = EventBus::new(config.bus.buffer_size);
    let processor = StreamProcessor::with_resolver(&config, Box::new(StaticResolver));
    let forwarder = bus.subscribe("forwarder", &[EventType::Anomaly]).unwrap();

    let (stop_tx, stop_rx) = watch::channel(false);
    let processor_task = tokio::spawn({
        let processor = processor.clone();
        let bus = bus.clone();
        let rx = stop_rx.clone();
        async move { processor.run(bus, rx).await }
    });

    let wall = hostscope::core::types::now_secs();
    for i in 0..40 {
        bus.publish(
            EventRecord::new(EventType::CpuMetric, "collector::cpu")
                .with_timestamp(wall - 45.0 + i as f64)
                .with_field("percent_total", 25.0),
        )
        .unwrap();
    }
    bus.publish(
        EventRecord::new(EventType::CpuMetric, "collector::cpu")
            .with_timestamp(wall - 1.0)
            .with_field("percent_total", 96.0),
    )
    .unwrap();

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if processor.stats().events_processed >= 41 {
            break;
        }
    }

    let mut pipeline = DetectionPipeline::new(processor.clone(), bus.clone(), config.ml.clone());
    let records = pipeline.tick_at(Instant::now(), wall);
    assert!(!records.is_empty(), "the spike should be detected");
    for record in records {
        bus.publish(record).unwrap();
    }

    // The anomaly reaches the external subscriber through the fabric
    let anomaly = forwarder.recv().await.expect("anomaly delivered");
    assert_eq!(anomaly.event_type, EventType::Anomaly);
    assert_eq!(anomaly.source, "ml::anomaly_detector");
    assert_eq!(anomaly.text("metric_key"), Some("cpu.total"));

    // And lands in history for the anomaly read contract
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !processor
            .recent_events(Some(EventType::Anomaly), 10)
            .is_empty()
        {
            break;
        }
    }
    let query = QueryService::new(processor.clone(), bus.clone());
    assert!(!query.anomalies(10).is_empty());

    // The pipeline never subscribes to its own output: tracked metrics
    // stay exactly the ones the collectors produced
    assert_eq!(
        processor.list_metric_keys(),
        vec!["cpu.total".to_string()]
    );

    let _ = stop_tx.send(true);
    bus.close();
    let _ = processor_task.await;
}

/// Unsubscribing mid-stream discards the queue without disturbing the
/// rest of the fabric.
#[tokio::test]
async fn test_unsubscribe_mid_publish() {
    let bus = EventBus::new(100);
    let keeper = bus.subscribe("keeper", &[]).unwrap();
    let _quitter = bus.subscribe("quitter", &[]).unwrap();

    for i in 0..10 {
        bus.publish(EventRecord::new(EventType::CpuMetric, "t").with_field("seq", i as i64))
            .unwrap();
    }
    bus.unsubscribe("quitter");
    for i in 10..20 {
        bus.publish(EventRecord::new(EventType::CpuMetric, "t").with_field("seq", i as i64))
            .unwrap();
    }

    let mut count = 0;
    while keeper.try_recv().is_some() {
        count += 1;
    }
    assert_eq!(count, 20);
    assert_eq!(bus.metrics().subscriber_count, 1);
}
