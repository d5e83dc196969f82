/*!
 * Process Collector
 * Top processes by CPU, one metric record each
 */

use super::publish_or_stop;
use crate::bus::EventBus;
use crate::core::limits::TOP_PROCESSES;
use crate::events::{EventRecord, EventType};
use std::time::Duration;
use sysinfo::System;
use tokio::sync::watch;

pub struct ProcessCollector {
    bus: EventBus,
    interval: Duration,
    sys: System,
}

impl ProcessCollector {
    pub fn new(bus: EventBus, interval_secs: f64) -> Self {
        Self {
            bus,
            interval: Duration::from_secs_f64(interval_secs),
            sys: System::new(),
        }
    }

    fn sample(&mut self) -> Vec<EventRecord> {
        self.sys.refresh_processes();

        let mut processes: Vec<_> = self.sys.processes().iter().collect();
        processes.sort_by(|(_, a), (_, b)| {
            b.cpu_usage()
                .partial_cmp(&a.cpu_usage())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        processes
            .into_iter()
            .take(TOP_PROCESSES)
            .map(|(pid, process)| {
                EventRecord::new(EventType::ProcessMetric, "collector::process")
                    .with_pid(pid.as_u32())
                    .with_comm(process.name())
                    .with_field("cpu_percent", process.cpu_usage() as f64)
                    .with_field("rss", process.memory())
            })
            .collect()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("process collector started (interval={:?})", self.interval);
        // Warm-up; per-process CPU usage needs a prior refresh
        self.sys.refresh_processes();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            for record in self.sample() {
                if !publish_or_stop(&self.bus, record, "process collector") {
                    return;
                }
            }
        }
        log::info!("process collector stopped");
    }
}
