/*!
 * CPU Collector
 * Per-core and aggregate utilization, plus base frequency
 */

use super::publish_or_stop;
use crate::bus::EventBus;
use crate::events::{EventRecord, EventType, Value};
use std::time::Duration;
use sysinfo::System;
use tokio::sync::watch;

pub struct CpuCollector {
    bus: EventBus,
    interval: Duration,
    sys: System,
}

impl CpuCollector {
    pub fn new(bus: EventBus, interval_secs: f64) -> Self {
        Self {
            bus,
            interval: Duration::from_secs_f64(interval_secs),
            sys: System::new(),
        }
    }

    fn sample(&mut self) -> EventRecord {
        self.sys.refresh_cpu();

        let per_core: Vec<Value> = self
            .sys
            .cpus()
            .iter()
            .map(|cpu| Value::Float(cpu.cpu_usage() as f64))
            .collect();
        let total = self.sys.global_cpu_info().cpu_usage() as f64;
        let freq_mhz = self.sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);

        let mut record = EventRecord::new(EventType::CpuMetric, "collector::cpu")
            .with_field("percent_total", total)
            .with_field("percent_per_core", per_core);
        if freq_mhz > 0 {
            record = record.with_field("freq_mhz", freq_mhz);
        }
        record
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("cpu collector started (interval={:?})", self.interval);
        // Warm-up refresh; usage needs two samples spaced apart
        self.sys.refresh_cpu();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            let record = self.sample();
            if !publish_or_stop(&self.bus, record, "cpu collector") {
                return;
            }
        }
        log::info!("cpu collector stopped");
    }
}
