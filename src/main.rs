/*!
 * hostscope daemon
 * Wires the fabric: bus, kernel reader, collectors, stream processor,
 * and the detection pipelines, then runs until interrupted.
 */

use hostscope::collectors::{
    CpuCollector, DiskCollector, MemoryCollector, NetworkCollector, ProcessCollector,
};
use hostscope::core::limits::SHUTDOWN_GRACE_PERIOD;
use hostscope::ml::{DetectionPipeline, TrendPipeline};
use hostscope::{Config, EventBus, QueryService, StreamProcessor, SyscallReader};
use log::{error, info};
use std::error::Error;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("loading config from {}", path);
            Config::load(&path)?
        }
        None => {
            let config = Config::default();
            config.validate()?;
            config
        }
    };

    info!("hostscope starting");
    let bus = EventBus::new(config.bus.buffer_size);
    let processor = StreamProcessor::new(&config);
    let query = QueryService::new(processor.clone(), bus.clone());

    // Producers and consumers stop in separate phases during shutdown
    let (producer_stop, producer_rx) = watch::channel(false);
    let (consumer_stop, consumer_rx) = watch::channel(false);

    let mut producers: Vec<JoinHandle<()>> = Vec::new();
    let mut consumers: Vec<JoinHandle<()>> = Vec::new();

    // Consumer side first so nothing published is unobserved
    consumers.push(tokio::spawn({
        let processor = processor.clone();
        let bus = bus.clone();
        let rx = consumer_rx.clone();
        async move { processor.run(bus, rx).await }
    }));

    // Kernel ingestion. Attach failure is fatal only when enabled.
    if config.ebpf.enable_syscall_trace {
        let source = hostscope::ebpf::attach_probe(&config.ebpf).map_err(|e| {
            error!("syscall tracing enabled but probe attach failed: {}", e);
            e
        })?;
        let reader = SyscallReader::new(bus.clone(), source, config.ebpf.min_latency_ns);
        producers.push(tokio::spawn(reader.run(producer_rx.clone())));
        info!("syscall reader attached");
    } else {
        info!("syscall tracing disabled");
    }

    // User-space pollers
    producers.push(tokio::spawn(
        CpuCollector::new(bus.clone(), config.collectors.cpu_interval).run(producer_rx.clone()),
    ));
    producers.push(tokio::spawn(
        MemoryCollector::new(bus.clone(), config.collectors.memory_interval)
            .run(producer_rx.clone()),
    ));
    producers.push(tokio::spawn(
        DiskCollector::new(bus.clone(), config.collectors.disk_interval).run(producer_rx.clone()),
    ));
    producers.push(tokio::spawn(
        NetworkCollector::new(bus.clone(), config.collectors.network_interval)
            .run(producer_rx.clone()),
    ));
    producers.push(tokio::spawn(
        ProcessCollector::new(bus.clone(), config.collectors.process_interval)
            .run(producer_rx.clone()),
    ));

    // Detection pipelines read from the processor and publish back
    consumers.push(tokio::spawn(
        DetectionPipeline::new(processor.clone(), bus.clone(), config.ml.clone())
            .run(consumer_rx.clone()),
    ));
    if config.ml.enable_trend {
        consumers.push(tokio::spawn(
            TrendPipeline::new(processor.clone(), bus.clone(), config.ml.clone())
                .run(consumer_rx.clone()),
        ));
    }

    // Periodic operational stats
    consumers.push(tokio::spawn({
        let query = query.clone();
        let mut rx = consumer_rx.clone();
        async move {
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = tokio::time::sleep(STATS_LOG_INTERVAL) => {}
                }
                let stats = query.stats();
                info!(
                    "published={} dropped={} subscribers={} events_processed={} metrics={} anomalies_held={}",
                    stats.bus.total_published,
                    stats.bus.total_dropped,
                    stats.bus.subscriber_count,
                    stats.processor.events_processed,
                    stats.processor.active_metrics,
                    query.anomalies(100).len(),
                );
            }
        }
    }));

    info!("hostscope running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // Top-down: stop producers, let queues drain, stop consumers, close.
    let _ = producer_stop.send(true);
    for handle in producers {
        let _ = handle.await;
    }

    let drain_deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE_PERIOD;
    loop {
        let depth: usize = bus.metrics().per_subscriber_queue_depth.values().sum();
        if depth == 0 || tokio::time::Instant::now() >= drain_deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let _ = consumer_stop.send(true);
    bus.close();
    for handle in consumers {
        let _ = handle.await;
    }

    let stats = query.stats();
    info!(
        "hostscope stopped (published={} dropped={} processed={})",
        stats.bus.total_published, stats.bus.total_dropped, stats.processor.events_processed
    );
    Ok(())
}
